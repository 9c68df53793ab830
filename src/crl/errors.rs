// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("CRL fetch failure: {0}")]
    FetchFailure(String),
    #[error("CRL error: {0}")]
    Crl(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::FetchFailure(e) | Error::Crl(e) => {
                write!(f, "{}", e)
            }
        }
    }
}
