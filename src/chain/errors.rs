// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Fetch failure: {0}")]
    FetchFailure(String),
    #[error("Chain incomplete: {0}")]
    ChainIncomplete(String),
    #[error("Issuer cycle: {0}")]
    Cycle(String),
    #[error("Chain too deep: {0}")]
    TooDeep(String),
    #[error("Certificate error: {0}")]
    Certificate(String),
    #[error("Chain signature error: {0}")]
    Signature(String),
    #[error("Untrusted root: {0}")]
    UntrustedRoot(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::FetchFailure(e)
            | Error::ChainIncomplete(e)
            | Error::Cycle(e)
            | Error::TooDeep(e)
            | Error::Certificate(e)
            | Error::Signature(e)
            | Error::UntrustedRoot(e) => {
                write!(f, "{}", e)
            }
        }
    }
}
