// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;

/// Size in bytes of a mailbox command header
pub const HEADER_LEN: usize = 4;

const CODE_OFFSET: u32 = 0;
const CODE_BITS: u32 = 11;
const LENGTH_OFFSET: u32 = 12;
const LENGTH_BITS: u32 = 12;
const ID_OFFSET: u32 = 24;
const ID_BITS: u32 = 4;
const CLIENT_OFFSET: u32 = 28;
const CLIENT_BITS: u32 = 4;

/// Client identifier used for every command issued by the verifier service
pub const SERVICE_CLIENT: u32 = 1;

/// A mailbox command (or response) header, packed into a single 32-bit word.
///
/// On requests `code` is the command identifier; on responses the firmware
/// reuses the same bits to report a status, `0` meaning success.  `length`
/// counts the 4-byte words that follow the header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandHeader {
    pub code: u32,
    pub length: u32,
    pub id: u32,
    pub client: u32,
}

fn check_field(name: &str, value: u32, bits: u32) -> Result<(), Error> {
    if value >> bits != 0 {
        return Err(Error::Protocol(format!(
            "header field {name} value {value:#x} does not fit in {bits} bits"
        )));
    }
    Ok(())
}

fn extract(word: u32, offset: u32, bits: u32) -> u32 {
    (word >> offset) & ((1 << bits) - 1)
}

impl CommandHeader {
    pub fn new(code: u32, length: u32, id: u32, client: u32) -> Result<Self, Error> {
        check_field("code", code, CODE_BITS)?;
        check_field("length", length, LENGTH_BITS)?;
        check_field("id", id, ID_BITS)?;
        check_field("client", client, CLIENT_BITS)?;

        Ok(Self {
            code,
            length,
            id,
            client,
        })
    }

    /// Build the header of an outgoing command carrying `payload`.  The
    /// argument length is expressed in words, rounded up.
    pub fn for_payload(code: u32, payload: &[u8]) -> Result<Self, Error> {
        let words = u32::try_from(payload.len().div_ceil(4))
            .map_err(|_| Error::Protocol(format!("payload too large: {}", payload.len())))?;

        Self::new(code, words, 0, SERVICE_CLIENT)
    }

    pub fn pack(&self) -> u32 {
        (self.code << CODE_OFFSET)
            | (self.length << LENGTH_OFFSET)
            | (self.id << ID_OFFSET)
            | (self.client << CLIENT_OFFSET)
    }

    pub fn unpack(word: u32) -> Self {
        Self {
            code: extract(word, CODE_OFFSET, CODE_BITS),
            length: extract(word, LENGTH_OFFSET, LENGTH_BITS),
            id: extract(word, ID_OFFSET, ID_BITS),
            client: extract(word, CLIENT_OFFSET, CLIENT_BITS),
        }
    }

    /// Header bytes in network (big-endian) order
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        self.pack().to_be_bytes()
    }

    /// Header bytes as expected by the firmware (little-endian word)
    pub fn to_fw_bytes(&self) -> [u8; HEADER_LEN] {
        self.pack().to_le_bytes()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Self::unpack(u32::from_be_bytes(header_word(bytes)?)))
    }

    pub fn parse_from_fw(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Self::unpack(u32::from_le_bytes(header_word(bytes)?)))
    }
}

fn header_word(bytes: &[u8]) -> Result<[u8; HEADER_LEN], Error> {
    bytes.try_into().map_err(|_| {
        Error::Protocol(format!(
            "command header length is {}, but should be {HEADER_LEN}",
            bytes.len()
        ))
    })
}

impl std::fmt::Display for CommandHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CommandHeader( code={:#x} length={} id={} client={} )",
            self.code, self.length, self.id, self.client
        )
    }
}
