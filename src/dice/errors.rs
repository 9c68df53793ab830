// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("TcbInfo error: {0}")]
    TcbInfo(String),
    #[error("conflicting TcbInfo: {0}")]
    Conflict(String),
    #[error("UEID error: {0}")]
    Ueid(String),
    #[error("measurement record error: {0}")]
    Measurement(String),
    #[error("reference measurement error: {0}")]
    Reference(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::TcbInfo(e)
            | Error::Conflict(e)
            | Error::Ueid(e)
            | Error::Measurement(e)
            | Error::Reference(e) => {
                write!(f, "{}", e)
            }
        }
    }
}
