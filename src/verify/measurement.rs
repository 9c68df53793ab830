// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::engine::{key_from_certificate, key_from_psg, verify};
use super::errors::Error;
use crate::crypto::{self, hidden_asset, EcdhKeyPair, KdfLabel};
use crate::wire::{Actor, MeasurementResponse, PsgPublicKey, SubKeyResponse, DEVICE_ID_LEN};
use openssl::ec::EcKey;
use openssl::pkey::Public;
use openssl::x509::X509Ref;

/// Authenticates SIGMA responses against the device attestation key, the
/// verifier's ephemeral ECDH key and the chip id reported by GET_CHIPID.
pub struct MeasurementVerifier<'a> {
    attestation_key: EcKey<Public>,
    verifier_dh: &'a EcdhKeyPair,
    device_id: [u8; DEVICE_ID_LEN],
    mac_enabled: bool,
}

impl<'a> MeasurementVerifier<'a> {
    pub fn new(
        attestation_cert: &X509Ref,
        verifier_dh: &'a EcdhKeyPair,
        device_id: [u8; DEVICE_ID_LEN],
    ) -> Result<Self, Error> {
        Ok(Self {
            attestation_key: key_from_certificate(attestation_cert)?,
            verifier_dh,
            device_id,
            mac_enabled: true,
        })
    }

    pub fn verify_mac(mut self, enabled: bool) -> Self {
        self.mac_enabled = enabled;
        self
    }

    fn check_verifier_key(&self, echoed: &[u8]) -> Result<(), Error> {
        if echoed != self.verifier_dh.public_key() {
            return Err(Error::Mismatch(format!(
                "verifier DH key in response {} does not match ours",
                hidden_asset(&hex::encode_upper(echoed))
            )));
        }
        Ok(())
    }

    fn check_device_id(&self, reported: &[u8; DEVICE_ID_LEN]) -> Result<(), Error> {
        if *reported != self.device_id {
            return Err(Error::Mismatch(format!(
                "device id {} differs from chip id {}",
                hex::encode_upper(reported),
                hex::encode_upper(self.device_id)
            )));
        }
        Ok(())
    }

    fn check_mac(&self, device_dh: &[u8], mac_data: &[u8], mac: &[u8]) -> Result<(), Error> {
        let peer =
            EcdhKeyPair::from_public_bytes(device_dh).map_err(|e| Error::Key(e.to_string()))?;
        let secret = self
            .verifier_dh
            .shared_secret(&peer)
            .map_err(|e| Error::Key(e.to_string()))?;
        let pmk = crypto::derive(&secret, KdfLabel::ProtocolMac)
            .map_err(|e| Error::Key(e.to_string()))?;

        let ok = crypto::mac_matches(&pmk, mac_data, mac).map_err(|e| Error::Key(e.to_string()))?;
        if !ok {
            return Err(Error::SignatureInvalid("response MAC does not verify".to_string()));
        }
        Ok(())
    }

    /// Check a GET_MEASUREMENT response: the PSG signature, the echoed
    /// verifier key, the device id and (if enabled) the MAC
    pub fn verify(&self, response: &MeasurementResponse) -> Result<(), Error> {
        let signed = response
            .signed_data(Actor::Firmware)
            .map_err(|e| Error::MalformedSignature(e.to_string()))?;

        verify(&self.attestation_key, &signed, &response.signature)
            .into_result("GET_MEASUREMENT")?;

        self.check_verifier_key(&response.verifier_dh_pub_key)?;
        self.check_device_id(&response.device_unique_id)?;

        if self.mac_enabled {
            let mac_data = response
                .mac_data(Actor::Firmware)
                .map_err(|e| Error::MalformedSignature(e.to_string()))?;
            self.check_mac(&response.device_dh_pub_key, &mac_data, &response.mac)?;
        }

        tracing::debug!(
            "GET_MEASUREMENT response verified for device {}",
            hex::encode_upper(self.device_id)
        );

        Ok(())
    }

    /// Check a CREATE_ATTESTATION_SUBKEY response and return the attestation
    /// sub-key it carries
    pub fn verify_subkey(&self, response: &SubKeyResponse) -> Result<PsgPublicKey, Error> {
        let signed = response
            .signed_data(Actor::Firmware)
            .map_err(|e| Error::MalformedSignature(e.to_string()))?;

        verify(&self.attestation_key, &signed, &response.signature)
            .into_result("CREATE_ATTESTATION_SUBKEY")?;

        self.check_verifier_key(&response.verifier_dh_pub_key)?;

        // the sub-key itself must be usable
        key_from_psg(&response.attestation_public_key)?;

        Ok(response.attestation_public_key.clone())
    }
}
