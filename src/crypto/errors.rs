// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("MAC error: {0}")]
    Mac(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::KeyGeneration(e)
            | Error::InvalidKey(e)
            | Error::MalformedSignature(e)
            | Error::Signing(e)
            | Error::Mac(e) => {
                write!(f, "{}", e)
            }
        }
    }
}
