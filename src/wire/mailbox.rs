// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::header::{CommandHeader, HEADER_LEN};

const STATUS_OKAY: u32 = 0;
const STATUS_UNKNOWN_COMMAND: u32 = 3;

/// Mailbox commands understood by the device firmware
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandCode {
    GetChipId,
    SigmaTeardown,
    GetAttestationCertificate,
    CreateAttestationSubKey,
    GetMeasurement,
    Mctp,
}

impl CommandCode {
    pub fn code(self) -> u32 {
        match self {
            CommandCode::GetChipId => 0x12,
            CommandCode::SigmaTeardown => 0xD5,
            CommandCode::GetAttestationCertificate => 0x181,
            CommandCode::CreateAttestationSubKey => 0x182,
            CommandCode::GetMeasurement => 0x183,
            CommandCode::Mctp => 0x194,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        [
            CommandCode::GetChipId,
            CommandCode::SigmaTeardown,
            CommandCode::GetAttestationCertificate,
            CommandCode::CreateAttestationSubKey,
            CommandCode::GetMeasurement,
            CommandCode::Mctp,
        ]
        .into_iter()
        .find(|c| c.code() == code)
    }
}

impl std::fmt::Display for CommandCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CommandCode::GetChipId => "GET_CHIPID",
            CommandCode::SigmaTeardown => "SIGMA_TEARDOWN",
            CommandCode::GetAttestationCertificate => "GET_ATTESTATION_CERTIFICATE",
            CommandCode::CreateAttestationSubKey => "CREATE_ATTESTATION_SUBKEY",
            CommandCode::GetMeasurement => "GET_MEASUREMENT",
            CommandCode::Mctp => "MCTP",
        };
        write!(f, "{name}")
    }
}

/// Frame `message` as a mailbox request for `command`: the firmware-order
/// header word followed by the message, zero-padded to a word boundary.
pub fn create(message: &[u8], command: CommandCode) -> Result<Vec<u8>, Error> {
    let header = CommandHeader::for_payload(command.code(), message)?;

    let padded_len = header.length as usize * 4;
    let mut out = Vec::with_capacity(HEADER_LEN + padded_len);
    out.extend_from_slice(&header.to_fw_bytes());
    out.extend_from_slice(message);
    out.resize(HEADER_LEN + padded_len, 0);

    tracing::debug!("{command} request: {header}");

    Ok(out)
}

/// Strip and check the header of a mailbox response to `command`, returning
/// the `length * 4` bytes of payload it announces.
pub fn retrieve(response: &[u8], command: CommandCode) -> Result<Vec<u8>, Error> {
    if response.len() < HEADER_LEN {
        return Err(Error::Protocol(format!(
            "{command} response too short: {} bytes",
            response.len()
        )));
    }

    let header = CommandHeader::parse_from_fw(&response[..HEADER_LEN])?;

    tracing::debug!("{command} response: {header}");

    match header.code {
        STATUS_OKAY => {}
        STATUS_UNKNOWN_COMMAND => {
            return Err(Error::UnknownCommand(format!(
                "firmware does not support {command}"
            )))
        }
        status => {
            return Err(Error::CommandFailed(format!(
                "{command} returned status {status:#x}"
            )))
        }
    }

    let expected = header.length as usize * 4;
    let payload = &response[HEADER_LEN..];

    if payload.len() < expected {
        return Err(Error::Protocol(format!(
            "{command} response announces {expected} bytes, got {}",
            payload.len()
        )));
    }

    Ok(payload[..expected].to_vec())
}
