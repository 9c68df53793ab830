// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! A mailbox device answering with the fixtures under testdata/: the alias
//! certificate, responses signed with its key, and measurement blocks that
//! agree with the alias certificate's TcbInfo.

use super::config::TransportConfig;
use super::errors::Error;
use super::transport::{Connect, Transport};
use crate::crypto::{self, Curve, EcdhKeyPair, SessionKeys};
use crate::dice::{encode_record, DeviceMeasurement, SectionType};
use crate::wire::{
    Actor, CommandCode, CommandHeader, DeviceFamily, MeasurementResponse, PsgPublicKey,
    PsgSignature, SubKeyResponse, CONTEXT_LEN, HEADER_LEN,
};
use hex_literal::hex;
use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};

pub(crate) const CHIP_ID: [u8; 8] = hex!("695D48644C08D307");

pub(crate) const IO_DIGEST: [u8; 48] = hex!("066331A2C0CD05F2F48D5BDD4EA60C5CFFAE61C286B1ADDE040E1F821EC8199FF76AA3750C8DE1382CDB14B067A8E0E3");
pub(crate) const CORE_DIGEST: [u8; 48] = hex!("FEC20013FCD2D2187176FED7DB8537B93695C845B76F98658FCC8350EE5341FC196D8CBCE4DDA1098B075AE67F148D73");

const ALIAS_CERT: &[u8] = include_bytes!("../../testdata/alias.der");
const ALIAS_KEY: &[u8] = include_bytes!("../../testdata/alias-key.der");

const STATUS_UNKNOWN_COMMAND: u32 = 3;
const SESSION_ID: u32 = 0x0000_0007;

pub(crate) fn genuine_measurements() -> Vec<DeviceMeasurement> {
    vec![
        DeviceMeasurement {
            section: SectionType::Io,
            index: 0,
            value: IO_DIGEST.to_vec(),
        },
        DeviceMeasurement {
            section: SectionType::Core,
            index: 0,
            value: CORE_DIGEST.to_vec(),
        },
    ]
}

pub(crate) struct SimulatedDevice {
    pub chip_id: [u8; 8],
    pub measurements: Vec<DeviceMeasurement>,
    pub corrupt_signature: bool,
    pub unsupported: Vec<CommandCode>,
    pub received: Vec<CommandCode>,
    key: EcKey<Private>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        let key = PKey::private_key_from_pkcs8(ALIAS_KEY)
            .and_then(|k| k.ec_key())
            .unwrap();

        Self {
            chip_id: CHIP_ID,
            measurements: genuine_measurements(),
            corrupt_signature: false,
            unsupported: vec![],
            received: vec![],
            key,
        }
    }

    fn sign(&self, data: &[u8]) -> Result<PsgSignature, Error> {
        let der = crypto::sign(&self.key, data)?;
        let mut sig = PsgSignature::from_der(&der, Curve::Secp384r1)?;
        if self.corrupt_signature {
            sig.s[0] ^= 1;
        }
        Ok(sig)
    }

    fn session_keys(device_dh: &EcdhKeyPair, verifier_dh: &[u8]) -> Result<SessionKeys, Error> {
        let peer = EcdhKeyPair::from_public_bytes(verifier_dh)?;
        Ok(SessionKeys::derive(&device_dh.shared_secret(&peer)?)?)
    }

    fn measurement(&self, body: &[u8]) -> Result<Vec<u8>, Error> {
        let verifier_dh = &body[12..108];
        let device_dh = EcdhKeyPair::generate()?;
        let record = encode_record(&self.measurements)?;

        let mut r = MeasurementResponse {
            reserved_header: [0; 4],
            sdm_session_id: SESSION_ID,
            device_unique_id: self.chip_id,
            rom_version_num: 0,
            sdm_fw_build_id: vec![0; 28],
            sdm_fw_security_version_num: 1,
            family: DeviceFamily::S10,
            reserved: [0; 3],
            public_efuse_values: vec![0; 256],
            device_dh_pub_key: device_dh.public_key().to_vec(),
            verifier_dh_pub_key: verifier_dh.to_vec(),
            cmf_descriptor_hash: vec![0; 48],
            reserved2: vec![0; 12],
            number_of_measurement_blocks: self.measurements.len() as u8,
            reserved3: 0,
            measurement_record: record,
            signature: PsgSignature {
                curve: Curve::Secp384r1,
                r: vec![0; 48],
                s: vec![0; 48],
            },
            mac: vec![0; 48],
        };

        r.signature = self.sign(&r.signed_data(Actor::Firmware)?)?;
        let keys = Self::session_keys(&device_dh, verifier_dh)?;
        r.mac = crypto::hmac_sha384(&keys.pmk, &r.mac_data(Actor::Firmware)?)?;

        Ok(r.encode(Actor::Firmware)?)
    }

    fn subkey(&self, body: &[u8]) -> Result<Vec<u8>, Error> {
        let verifier_dh = &body[12..108];
        let device_dh = EcdhKeyPair::generate()?;

        let mut context = [0u8; CONTEXT_LEN];
        context.copy_from_slice(&body[124..152]);
        let counter = u32::from_le_bytes([body[152], body[153], body[154], body[155]]);

        let group = EcGroup::from_curve_name(Nid::SECP384R1).unwrap();
        let subkey = EcKey::generate(&group).unwrap();
        let (x, y) = crypto::public_key_to_xy(&subkey)?;

        let mut r = SubKeyResponse {
            reserved_header: [0; 4],
            sdm_session_id: SESSION_ID,
            device_unique_id: self.chip_id,
            rom_version_num: 0,
            sdm_fw_build_id: vec![0; 28],
            sdm_fw_security_version_num: 1,
            reserved: [0; 4],
            public_efuse_values: vec![0; 256],
            device_dh_pub_key: device_dh.public_key().to_vec(),
            verifier_dh_pub_key: verifier_dh.to_vec(),
            verifier_input_context: context,
            verifier_counter: counter,
            attestation_public_key: PsgPublicKey {
                curve: Curve::Secp384r1,
                permissions: 0,
                cancellation: 0,
                x,
                y,
            },
            signature: PsgSignature {
                curve: Curve::Secp384r1,
                r: vec![0; 48],
                s: vec![0; 48],
            },
            mac: vec![0; 48],
        };

        r.signature = self.sign(&r.signed_data(Actor::Firmware)?)?;
        let keys = Self::session_keys(&device_dh, verifier_dh)?;
        r.mac = crypto::hmac_sha384(&keys.pmk, &r.mac_data(Actor::Firmware)?)?;

        Ok(r.encode(Actor::Firmware)?)
    }
}

fn respond(status: u32, mut payload: Vec<u8>) -> Result<Vec<u8>, Error> {
    payload.resize(payload.len().div_ceil(4) * 4, 0);

    let header = CommandHeader::new(status, (payload.len() / 4) as u32, 0, 1)?;
    let mut out = header.to_fw_bytes().to_vec();
    out.extend(payload);

    Ok(out)
}

impl Transport for SimulatedDevice {
    fn send(&mut self, command: &[u8]) -> Result<Vec<u8>, Error> {
        let header = CommandHeader::parse_from_fw(&command[..HEADER_LEN])?;
        let body = &command[HEADER_LEN..];

        let code = CommandCode::from_code(header.code)
            .ok_or_else(|| Error::Transport(format!("unexpected command {:#x}", header.code)))?;
        self.received.push(code);

        if self.unsupported.contains(&code) {
            return respond(STATUS_UNKNOWN_COMMAND, vec![]);
        }

        let payload = match code {
            CommandCode::GetChipId => self.chip_id.to_vec(),
            CommandCode::GetAttestationCertificate => ALIAS_CERT.to_vec(),
            CommandCode::GetMeasurement => self.measurement(body)?,
            CommandCode::CreateAttestationSubKey => self.subkey(body)?,
            CommandCode::SigmaTeardown | CommandCode::Mctp => vec![],
        };

        respond(0, payload)
    }
}

/// Hands out a fresh simulated device per connection, or refuses to
/// connect when offline
pub(crate) struct SimulatedConnector {
    pub measurements: Vec<DeviceMeasurement>,
    pub offline: bool,
}

impl SimulatedConnector {
    pub fn new() -> Self {
        Self {
            measurements: genuine_measurements(),
            offline: false,
        }
    }
}

impl Connect for SimulatedConnector {
    type Transport = SimulatedDevice;

    fn connect(&self, config: &TransportConfig) -> Result<SimulatedDevice, Error> {
        if self.offline {
            return Err(Error::Transport(format!(
                "{}:{}: connection refused",
                config.host, config.port
            )));
        }

        let mut device = SimulatedDevice::new();
        device.measurements = self.measurements.clone();
        Ok(device)
    }
}
