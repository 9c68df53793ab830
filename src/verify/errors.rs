// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),
    #[error("Evidence mismatch: {0}")]
    Mismatch(String),
    #[error("Key error: {0}")]
    Key(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::SignatureInvalid(e)
            | Error::MalformedSignature(e)
            | Error::Mismatch(e)
            | Error::Key(e) => {
                write!(f, "{}", e)
            }
        }
    }
}
