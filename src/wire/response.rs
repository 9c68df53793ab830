// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::endianness::{Actor, Field, StructureType};
use super::errors::Error;
use super::layout::{spec, FieldSpec, Reader, Record, Writer};
use super::mailbox::CommandCode;
use super::message::{CONTEXT_LEN, DH_PUBLIC_KEY_LEN, RESERVED2_LEN};
use super::psg::{PsgPublicKey, PsgSignature};

pub const DEVICE_ID_LEN: usize = 8;
pub const FW_BUILD_ID_LEN: usize = 28;
pub const CMF_DESCRIPTOR_HASH_LEN: usize = 48;
pub const MAC_LEN: usize = 48;
const S10_EFUSE_LEN: usize = 256;

/// Device family advertised in the fuse-map byte; it selects the size of the
/// public efuse block that follows
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceFamily {
    S10,
}

impl DeviceFamily {
    pub fn from_fuse_map(b: u8) -> Result<Self, Error> {
        match b {
            0x01 => Ok(DeviceFamily::S10),
            x => Err(Error::Protocol(format!("unknown device family fuse map {x:#04x}"))),
        }
    }

    pub fn fuse_map(self) -> u8 {
        match self {
            DeviceFamily::S10 => 0x01,
        }
    }

    pub fn efuse_len(self) -> usize {
        match self {
            DeviceFamily::S10 => S10_EFUSE_LEN,
        }
    }
}

/// GET_CHIPID returns the 8-byte device identifier
pub fn parse_chip_id(payload: &[u8]) -> Result<[u8; DEVICE_ID_LEN], Error> {
    payload.try_into().map_err(|_| {
        Error::Protocol(format!(
            "chip id is {} bytes, expected {DEVICE_ID_LEN}",
            payload.len()
        ))
    })
}

/// Length of the DER element at the start of `buf`, header included
pub fn der_length(buf: &[u8]) -> Result<usize, Error> {
    let err = |m: &str| Error::Protocol(format!("certificate: {m}"));

    if buf.len() < 2 {
        return Err(err("truncated DER header"));
    }
    if buf[0] != 0x30 {
        return Err(err("not a DER SEQUENCE"));
    }

    let (header, body) = match buf[1] {
        n if n < 0x80 => (2, n as usize),
        0x80 => return Err(err("indefinite length")),
        n => {
            let octets = (n & 0x7F) as usize;
            if octets > 4 || buf.len() < 2 + octets {
                return Err(err("bad long-form length"));
            }
            let len = buf[2..2 + octets]
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | *b as usize);
            (2 + octets, len)
        }
    };

    let total = header + body;
    if total > buf.len() {
        return Err(err("DER element longer than payload"));
    }

    Ok(total)
}

/// GET_ATTESTATION_CERTIFICATE returns a DER certificate padded to a word
/// boundary
pub fn parse_certificate(payload: &[u8]) -> Result<Vec<u8>, Error> {
    let len = der_length(payload)?;

    Ok(payload[..len].to_vec())
}

fn check_magic(record: &Record, command: CommandCode) -> Result<(), Error> {
    let magic = record.u32(Field::Magic)?;

    if magic != command.code() {
        return Err(Error::Protocol(format!(
            "{command} response magic is {magic:#x}"
        )));
    }
    Ok(())
}

const MEASUREMENT_HEAD: &[FieldSpec] = &[
    spec(Field::ReservedHeader, 4),
    spec(Field::Magic, 4),
    spec(Field::SdmSessionId, 4),
    spec(Field::DeviceUniqueId, DEVICE_ID_LEN),
    spec(Field::RomVersionNum, 4),
    spec(Field::SdmFwBuildId, FW_BUILD_ID_LEN),
    spec(Field::SdmFwSecurityVersionNum, 4),
    spec(Field::DeviceFamilyFuseMap, 1),
    spec(Field::Reserved, 3),
];

const MEASUREMENT_KEYS: &[FieldSpec] = &[
    spec(Field::DeviceDhPubKey, DH_PUBLIC_KEY_LEN),
    spec(Field::VerifierDhPubKey, DH_PUBLIC_KEY_LEN),
    spec(Field::CmfDescriptorHash, CMF_DESCRIPTOR_HASH_LEN),
    spec(Field::Reserved2, RESERVED2_LEN),
    spec(Field::NumberOfMeasurementBlocks, 1),
    spec(Field::Reserved3, 1),
    spec(Field::MeasurementRecordLen, 2),
];

/// Decoded GET_MEASUREMENT response.  Multi-byte integers are held in
/// service order; the signed and MACed byte ranges are re-emitted from the
/// fields on demand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeasurementResponse {
    pub reserved_header: [u8; 4],
    pub sdm_session_id: u32,
    pub device_unique_id: [u8; DEVICE_ID_LEN],
    pub rom_version_num: u32,
    pub sdm_fw_build_id: Vec<u8>,
    pub sdm_fw_security_version_num: u32,
    pub family: DeviceFamily,
    pub reserved: [u8; 3],
    pub public_efuse_values: Vec<u8>,
    pub device_dh_pub_key: Vec<u8>,
    pub verifier_dh_pub_key: Vec<u8>,
    pub cmf_descriptor_hash: Vec<u8>,
    pub reserved2: Vec<u8>,
    pub number_of_measurement_blocks: u8,
    pub reserved3: u8,
    pub measurement_record: Vec<u8>,
    pub signature: PsgSignature,
    pub mac: Vec<u8>,
}

impl MeasurementResponse {
    pub fn decode(payload: &[u8], actor: Actor) -> Result<Self, Error> {
        let mut r = Reader::new(payload, StructureType::GetMeasurementResponse, actor);

        let head = r.decode(MEASUREMENT_HEAD)?;
        check_magic(&head, CommandCode::GetMeasurement)?;

        let family = DeviceFamily::from_fuse_map(head.u8(Field::DeviceFamilyFuseMap)?)?;
        let public_efuse_values = r.read(Field::PublicEfuseValues, family.efuse_len())?;

        let keys = r.decode(MEASUREMENT_KEYS)?;
        let record_len = keys.u16(Field::MeasurementRecordLen)? as usize;
        let measurement_record = r.read(Field::MeasurementRecord, record_len)?;

        let (signature, used) = PsgSignature::decode(r.rest(), actor)?;
        r.advance(used)?;

        let mac = r.read(Field::Mac, MAC_LEN)?;
        r.finish()?;

        Ok(Self {
            reserved_header: head.array(Field::ReservedHeader)?,
            sdm_session_id: head.u32(Field::SdmSessionId)?,
            device_unique_id: head.array(Field::DeviceUniqueId)?,
            rom_version_num: head.u32(Field::RomVersionNum)?,
            sdm_fw_build_id: head.get(Field::SdmFwBuildId)?.to_vec(),
            sdm_fw_security_version_num: head.u32(Field::SdmFwSecurityVersionNum)?,
            family,
            reserved: head.array(Field::Reserved)?,
            public_efuse_values,
            device_dh_pub_key: keys.get(Field::DeviceDhPubKey)?.to_vec(),
            verifier_dh_pub_key: keys.get(Field::VerifierDhPubKey)?.to_vec(),
            cmf_descriptor_hash: keys.get(Field::CmfDescriptorHash)?.to_vec(),
            reserved2: keys.get(Field::Reserved2)?.to_vec(),
            number_of_measurement_blocks: keys.u8(Field::NumberOfMeasurementBlocks)?,
            reserved3: keys.u8(Field::Reserved3)?,
            measurement_record,
            signature,
            mac,
        })
    }

    fn write_signed(&self, w: &mut Writer) -> Result<(), Error> {
        let record_len = u16::try_from(self.measurement_record.len()).map_err(|_| {
            Error::Layout(format!(
                "measurement record too long: {}",
                self.measurement_record.len()
            ))
        })?;

        w.put_u32(Field::Magic, CommandCode::GetMeasurement.code())?
            .put_u32(Field::SdmSessionId, self.sdm_session_id)?
            .put(Field::DeviceUniqueId, &self.device_unique_id)?
            .put_u32(Field::RomVersionNum, self.rom_version_num)?
            .put_fixed(Field::SdmFwBuildId, &self.sdm_fw_build_id, FW_BUILD_ID_LEN)?
            .put_u32(Field::SdmFwSecurityVersionNum, self.sdm_fw_security_version_num)?
            .put_u8(Field::DeviceFamilyFuseMap, self.family.fuse_map())?
            .put(Field::Reserved, &self.reserved)?
            .put_fixed(
                Field::PublicEfuseValues,
                &self.public_efuse_values,
                self.family.efuse_len(),
            )?
            .put_fixed(Field::DeviceDhPubKey, &self.device_dh_pub_key, DH_PUBLIC_KEY_LEN)?
            .put_fixed(
                Field::VerifierDhPubKey,
                &self.verifier_dh_pub_key,
                DH_PUBLIC_KEY_LEN,
            )?
            .put_fixed(
                Field::CmfDescriptorHash,
                &self.cmf_descriptor_hash,
                CMF_DESCRIPTOR_HASH_LEN,
            )?
            .put_fixed(Field::Reserved2, &self.reserved2, RESERVED2_LEN)?
            .put_u8(Field::NumberOfMeasurementBlocks, self.number_of_measurement_blocks)?
            .put_u8(Field::Reserved3, self.reserved3)?
            .put_u16(Field::MeasurementRecordLen, record_len)?
            .put(Field::MeasurementRecord, &self.measurement_record)?;

        Ok(())
    }

    /// Bytes covered by the PSG signature: magic through the measurement
    /// record, in `actor` order
    pub fn signed_data(&self, actor: Actor) -> Result<Vec<u8>, Error> {
        let mut w = Writer::new(StructureType::GetMeasurementResponse, actor);
        self.write_signed(&mut w)?;
        Ok(w.finish())
    }

    /// Bytes covered by the MAC: the signed data followed by the signature
    pub fn mac_data(&self, actor: Actor) -> Result<Vec<u8>, Error> {
        let mut v = self.signed_data(actor)?;
        v.extend(self.signature.encode(actor)?);
        Ok(v)
    }

    pub fn encode(&self, actor: Actor) -> Result<Vec<u8>, Error> {
        let mut w = Writer::new(StructureType::GetMeasurementResponse, actor);

        w.put(Field::ReservedHeader, &self.reserved_header)?;
        self.write_signed(&mut w)?;
        w.append(&self.signature.encode(actor)?);
        w.put_fixed(Field::Mac, &self.mac, MAC_LEN)?;

        Ok(w.finish())
    }
}

const SUBKEY_BODY: &[FieldSpec] = &[
    spec(Field::ReservedHeader, 4),
    spec(Field::Magic, 4),
    spec(Field::SdmSessionId, 4),
    spec(Field::DeviceUniqueId, DEVICE_ID_LEN),
    spec(Field::RomVersionNum, 4),
    spec(Field::SdmFwBuildId, FW_BUILD_ID_LEN),
    spec(Field::SdmFwSecurityVersionNum, 4),
    spec(Field::Reserved, 4),
    spec(Field::PublicEfuseValues, S10_EFUSE_LEN),
    spec(Field::DeviceDhPubKey, DH_PUBLIC_KEY_LEN),
    spec(Field::VerifierDhPubKey, DH_PUBLIC_KEY_LEN),
    spec(Field::VerifierInputContext, CONTEXT_LEN),
    spec(Field::VerifierCounter, 4),
];

/// Decoded CREATE_ATTESTATION_SUBKEY response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubKeyResponse {
    pub reserved_header: [u8; 4],
    pub sdm_session_id: u32,
    pub device_unique_id: [u8; DEVICE_ID_LEN],
    pub rom_version_num: u32,
    pub sdm_fw_build_id: Vec<u8>,
    pub sdm_fw_security_version_num: u32,
    pub reserved: [u8; 4],
    pub public_efuse_values: Vec<u8>,
    pub device_dh_pub_key: Vec<u8>,
    pub verifier_dh_pub_key: Vec<u8>,
    pub verifier_input_context: [u8; CONTEXT_LEN],
    pub verifier_counter: u32,
    pub attestation_public_key: PsgPublicKey,
    pub signature: PsgSignature,
    pub mac: Vec<u8>,
}

impl SubKeyResponse {
    pub fn decode(payload: &[u8], actor: Actor) -> Result<Self, Error> {
        let mut r = Reader::new(payload, StructureType::SubKeyResponse, actor);

        let body = r.decode(SUBKEY_BODY)?;
        check_magic(&body, CommandCode::CreateAttestationSubKey)?;

        let (attestation_public_key, used) = PsgPublicKey::decode(r.rest(), actor)?;
        r.advance(used)?;

        let (signature, used) = PsgSignature::decode(r.rest(), actor)?;
        r.advance(used)?;

        let mac = r.read(Field::Mac, MAC_LEN)?;
        r.finish()?;

        Ok(Self {
            reserved_header: body.array(Field::ReservedHeader)?,
            sdm_session_id: body.u32(Field::SdmSessionId)?,
            device_unique_id: body.array(Field::DeviceUniqueId)?,
            rom_version_num: body.u32(Field::RomVersionNum)?,
            sdm_fw_build_id: body.get(Field::SdmFwBuildId)?.to_vec(),
            sdm_fw_security_version_num: body.u32(Field::SdmFwSecurityVersionNum)?,
            reserved: body.array(Field::Reserved)?,
            public_efuse_values: body.get(Field::PublicEfuseValues)?.to_vec(),
            device_dh_pub_key: body.get(Field::DeviceDhPubKey)?.to_vec(),
            verifier_dh_pub_key: body.get(Field::VerifierDhPubKey)?.to_vec(),
            verifier_input_context: body.array(Field::VerifierInputContext)?,
            verifier_counter: body.u32(Field::VerifierCounter)?,
            attestation_public_key,
            signature,
            mac,
        })
    }

    fn write_signed(&self, w: &mut Writer) -> Result<(), Error> {
        w.put_u32(Field::Magic, CommandCode::CreateAttestationSubKey.code())?
            .put_u32(Field::SdmSessionId, self.sdm_session_id)?
            .put(Field::DeviceUniqueId, &self.device_unique_id)?
            .put_u32(Field::RomVersionNum, self.rom_version_num)?
            .put_fixed(Field::SdmFwBuildId, &self.sdm_fw_build_id, FW_BUILD_ID_LEN)?
            .put_u32(Field::SdmFwSecurityVersionNum, self.sdm_fw_security_version_num)?
            .put(Field::Reserved, &self.reserved)?
            .put_fixed(Field::PublicEfuseValues, &self.public_efuse_values, S10_EFUSE_LEN)?
            .put_fixed(Field::DeviceDhPubKey, &self.device_dh_pub_key, DH_PUBLIC_KEY_LEN)?
            .put_fixed(
                Field::VerifierDhPubKey,
                &self.verifier_dh_pub_key,
                DH_PUBLIC_KEY_LEN,
            )?
            .put(Field::VerifierInputContext, &self.verifier_input_context)?
            .put_u32(Field::VerifierCounter, self.verifier_counter)?;

        Ok(())
    }

    /// Bytes covered by the PSG signature: magic through the counter,
    /// followed by the attestation public key record
    pub fn signed_data(&self, actor: Actor) -> Result<Vec<u8>, Error> {
        let mut w = Writer::new(StructureType::SubKeyResponse, actor);
        self.write_signed(&mut w)?;
        w.append(&self.attestation_public_key.encode(actor)?);
        Ok(w.finish())
    }

    pub fn mac_data(&self, actor: Actor) -> Result<Vec<u8>, Error> {
        let mut v = self.signed_data(actor)?;
        v.extend(self.signature.encode(actor)?);
        Ok(v)
    }

    pub fn encode(&self, actor: Actor) -> Result<Vec<u8>, Error> {
        let mut w = Writer::new(StructureType::SubKeyResponse, actor);

        w.put(Field::ReservedHeader, &self.reserved_header)?;
        self.write_signed(&mut w)?;
        w.append(&self.attestation_public_key.encode(actor)?);
        w.append(&self.signature.encode(actor)?);
        w.put_fixed(Field::Mac, &self.mac, MAC_LEN)?;

        Ok(w.finish())
    }
}
