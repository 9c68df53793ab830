// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Command failed: {0}")]
    CommandFailed(String),
    #[error("Layout error: {0}")]
    Layout(String),
    #[error("Endianness error: {0}")]
    Endianness(String),
    #[error("PSG structure error: {0}")]
    Psg(String),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Protocol(e)
            | Error::UnknownCommand(e)
            | Error::CommandFailed(e)
            | Error::Layout(e)
            | Error::Endianness(e)
            | Error::Psg(e) => {
                write!(f, "{}", e)
            }
        }
    }
}
