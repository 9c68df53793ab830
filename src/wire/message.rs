// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::endianness::{Actor, Field, StructureType};
use super::errors::Error;
use super::layout::Writer;
use super::mailbox::CommandCode;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DH_PUBLIC_KEY_LEN: usize = 96;
pub const CONTEXT_LEN: usize = 28;
pub const RESERVED2_LEN: usize = 12;

/// Session id that tears down every open SIGMA session
pub const ALL_SESSIONS: u32 = 0xFFFF_FFFF;

/// Which device certificate GET_ATTESTATION_CERTIFICATE returns
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateType {
    Firmware,
    UdsIidPufAlias,
    DeviceIdEnrollment,
    UdsEfuseAlias,
}

impl CertificateType {
    pub fn value(self) -> u32 {
        match self {
            CertificateType::Firmware => 0x01,
            CertificateType::UdsIidPufAlias => 0x02,
            CertificateType::DeviceIdEnrollment => 0x04,
            CertificateType::UdsEfuseAlias => 0x08,
        }
    }
}

/// PUF used to derive the attestation key.  Sent on the wire as its ordinal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PufType {
    #[serde(rename = "IID")]
    Iid,
    #[serde(rename = "INTEL")]
    Intel,
    #[serde(rename = "EFUSE")]
    Efuse,
    #[serde(rename = "IIDUSER")]
    IidUser,
    #[serde(rename = "INTEL_USER")]
    IntelUser,
}

impl PufType {
    pub fn ordinal(self) -> u32 {
        match self {
            PufType::Iid => 0,
            PufType::Intel => 1,
            PufType::Efuse => 2,
            PufType::IidUser => 3,
            PufType::IntelUser => 4,
        }
    }
}

impl FromStr for PufType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IID" => Ok(PufType::Iid),
            "INTEL" => Ok(PufType::Intel),
            "EFUSE" => Ok(PufType::Efuse),
            "IIDUSER" => Ok(PufType::IidUser),
            "INTEL_USER" => Ok(PufType::IntelUser),
            other => Err(Error::Layout(format!("unknown PUF type {other}"))),
        }
    }
}

/// Parse a verifier context given as hex: 1 to 56 characters, zero-padded on
/// the right to 28 bytes
pub fn parse_context(hex_context: &str) -> Result<[u8; CONTEXT_LEN], Error> {
    if hex_context.is_empty() || hex_context.len() > 2 * CONTEXT_LEN {
        return Err(Error::Layout(format!(
            "context must be 1 to {} hex characters, got {}",
            2 * CONTEXT_LEN,
            hex_context.len()
        )));
    }

    // an odd number of digits is completed with a trailing zero nibble
    let mut digits = hex_context.to_string();
    if digits.len() % 2 != 0 {
        digits.push('0');
    }

    let bytes = hex::decode(&digits).map_err(|e| Error::Layout(format!("context: {e}")))?;

    let mut out = [0u8; CONTEXT_LEN];
    out[..bytes.len()].copy_from_slice(&bytes);

    Ok(out)
}

pub fn get_chip_id() -> Vec<u8> {
    vec![]
}

pub fn get_attestation_certificate(cert_type: CertificateType) -> Vec<u8> {
    cert_type.value().to_le_bytes().to_vec()
}

/// Request body shared by GET_MEASUREMENT and CREATE_ATTESTATION_SUBKEY
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigmaRequest {
    pub verifier_dh_pub_key: Vec<u8>,
    pub puf_type: PufType,
    pub context: [u8; CONTEXT_LEN],
    pub counter: u32,
    pub user_key_chain: Vec<u8>,
}

impl SigmaRequest {
    pub fn new(verifier_dh_pub_key: &[u8], puf_type: PufType, context: [u8; CONTEXT_LEN]) -> Self {
        Self {
            verifier_dh_pub_key: verifier_dh_pub_key.to_vec(),
            puf_type,
            context,
            counter: 0,
            user_key_chain: vec![],
        }
    }

    fn encode(&self, command: CommandCode, actor: Actor) -> Result<Vec<u8>, Error> {
        let (structure, second) = match command {
            CommandCode::GetMeasurement => (StructureType::GetMeasurementRequest, Field::Flags),
            CommandCode::CreateAttestationSubKey => {
                (StructureType::SubKeyRequest, Field::Reserved1)
            }
            other => {
                return Err(Error::Layout(format!(
                    "{other} does not take a SIGMA request body"
                )))
            }
        };

        let mut w = Writer::new(structure, actor);

        w.zeros(Field::ReservedHeader, 4)?
            .put_u32(Field::Magic, command.code())?
            .zeros(second, 4)?
            .put_fixed(
                Field::VerifierDhPubKey,
                &self.verifier_dh_pub_key,
                DH_PUBLIC_KEY_LEN,
            )?
            .put_u32(Field::AttestationCertificateType, self.puf_type.ordinal())?
            .zeros(Field::Reserved2, RESERVED2_LEN)?
            .put(Field::VerifierInputContext, &self.context)?
            .put_u32(Field::VerifierCounter, self.counter)?
            .put(Field::UserKeyChain, &self.user_key_chain)?;

        Ok(w.finish())
    }

    pub fn get_measurement(&self, actor: Actor) -> Result<Vec<u8>, Error> {
        self.encode(CommandCode::GetMeasurement, actor)
    }

    pub fn create_attestation_subkey(&self, actor: Actor) -> Result<Vec<u8>, Error> {
        self.encode(CommandCode::CreateAttestationSubKey, actor)
    }
}

pub fn sigma_teardown(session_id: u32, actor: Actor) -> Result<Vec<u8>, Error> {
    let mut w = Writer::new(StructureType::SigmaTeardown, actor);

    w.zeros(Field::ReservedHeader, 4)?
        .put_u32(Field::Magic, CommandCode::SigmaTeardown.code())?
        .put_u32(Field::SdmSessionId, session_id)?;

    Ok(w.finish())
}
