// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::dice::Status;
use crate::{chain, crl, crypto, dice, verify, wire};

#[derive(thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),
    #[error("invalid signature: {0}")]
    SignatureInvalid(String),
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    #[error("fetch failure: {0}")]
    FetchFailure(String),
    #[error("incomplete chain: {0}")]
    ChainIncomplete(String),
    #[error("revocation: {0}")]
    Revocation(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("session error: {0}")]
    Session(String),
    #[error("evidence error: {0}")]
    Evidence(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Protocol(e)
            | Error::UnsupportedVersion(e)
            | Error::SignatureInvalid(e)
            | Error::MalformedSignature(e)
            | Error::FetchFailure(e)
            | Error::ChainIncomplete(e)
            | Error::Revocation(e)
            | Error::Transport(e)
            | Error::Config(e)
            | Error::Session(e)
            | Error::Evidence(e)
            | Error::Internal(e) => {
                write!(f, "{}", e)
            }
        }
    }
}

impl Error {
    /// Status reported for an operation that ended with this error.  Evidence
    /// that was obtained but not trusted is a FAIL, everything else an ERROR.
    pub fn status(&self) -> Status {
        match self {
            Error::SignatureInvalid(_) | Error::Revocation(_) | Error::Evidence(_) => Status::Fail,
            _ => Status::Error,
        }
    }
}

impl From<wire::Error> for Error {
    fn from(e: wire::Error) -> Self {
        match e {
            wire::Error::Psg(_) => Error::MalformedSignature(e.to_string()),
            _ => Error::Protocol(e.to_string()),
        }
    }
}

impl From<crypto::Error> for Error {
    fn from(e: crypto::Error) -> Self {
        match e {
            crypto::Error::MalformedSignature(_) => Error::MalformedSignature(e.to_string()),
            crypto::Error::InvalidKey(_) => Error::Protocol(e.to_string()),
            _ => Error::Internal(e.to_string()),
        }
    }
}

impl From<verify::Error> for Error {
    fn from(e: verify::Error) -> Self {
        match e {
            verify::Error::SignatureInvalid(_) => Error::SignatureInvalid(e.to_string()),
            verify::Error::MalformedSignature(_) => Error::MalformedSignature(e.to_string()),
            verify::Error::Mismatch(_) | verify::Error::Key(_) => Error::Protocol(e.to_string()),
        }
    }
}

impl From<chain::Error> for Error {
    fn from(e: chain::Error) -> Self {
        match e {
            chain::Error::FetchFailure(_) => Error::FetchFailure(e.to_string()),
            chain::Error::Signature(_) => Error::SignatureInvalid(e.to_string()),
            _ => Error::ChainIncomplete(e.to_string()),
        }
    }
}

impl From<crl::Error> for Error {
    fn from(e: crl::Error) -> Self {
        match e {
            crl::Error::FetchFailure(_) => Error::FetchFailure(e.to_string()),
            crl::Error::Crl(_) => Error::Revocation(e.to_string()),
        }
    }
}

impl From<dice::Error> for Error {
    fn from(e: dice::Error) -> Self {
        match e {
            dice::Error::Measurement(_) => Error::Protocol(e.to_string()),
            dice::Error::Reference(_) => Error::Config(e.to_string()),
            _ => Error::Evidence(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_errors_map_to_kinds() {
        assert!(matches!(
            Error::from(wire::Error::Protocol("x".into())),
            Error::Protocol(_)
        ));
        assert!(matches!(
            Error::from(verify::Error::SignatureInvalid("x".into())),
            Error::SignatureInvalid(_)
        ));
        assert!(matches!(
            Error::from(verify::Error::MalformedSignature("x".into())),
            Error::MalformedSignature(_)
        ));
        assert!(matches!(
            Error::from(chain::Error::Cycle("x".into())),
            Error::ChainIncomplete(_)
        ));
        assert!(matches!(
            Error::from(chain::Error::FetchFailure("x".into())),
            Error::FetchFailure(_)
        ));
        assert!(matches!(
            Error::from(dice::Error::Measurement("x".into())),
            Error::Protocol(_)
        ));
        assert!(matches!(
            Error::from(dice::Error::Conflict("x".into())),
            Error::Evidence(_)
        ));
    }

    #[test]
    fn untrusted_evidence_fails_other_errors_are_errors() {
        assert_eq!(Error::Revocation("x".into()).status(), Status::Fail);
        assert_eq!(Error::SignatureInvalid("x".into()).status(), Status::Fail);
        assert_eq!(Error::Evidence("x".into()).status(), Status::Fail);
        assert_eq!(Error::Transport("x".into()).status(), Status::Error);
        assert_eq!(Error::MalformedSignature("x".into()).status(), Status::Error);
        assert_eq!(Error::Session("x".into()).status(), Status::Error);
    }
}
