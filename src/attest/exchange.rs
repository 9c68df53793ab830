// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::config::Config;
use super::errors::Error;
use super::session::AttestationSession;
use super::transport::{Connect, Transport};
use crate::chain::DistributionPoint;
use crate::dice::{load_reference, Status};
use crate::wire::{self, get_chip_id, parse_context, CommandCode, PufType};

/// Outcome of a device attestation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestationReport {
    pub status: Status,
    /// Chip id in upper hex, when the device answered GET_CHIPID
    pub device_id: Option<String>,
}

impl AttestationReport {
    fn error() -> Self {
        Self {
            status: Status::Error,
            device_id: None,
        }
    }
}

/// Integer-status entry points used by the command line.  Each call opens
/// its own connection and runs its own session; failures are logged and
/// turned into a `Status`.
pub struct VerifierExchange<C, D> {
    config: Config,
    connector: C,
    dp: D,
}

impl<C: Connect, D: DistributionPoint> VerifierExchange<C, D> {
    pub fn new(config: Config, connector: C, dp: D) -> Self {
        Self {
            config,
            connector,
            dp,
        }
    }

    fn session(&self) -> Result<AttestationSession<C::Transport, &D>, Error> {
        let transport = self.connector.connect(&self.config.transport)?;

        Ok(AttestationSession::new(transport, &self.dp, self.config.clone()))
    }

    /// Attest the device against reference measurements given as JSON
    pub fn get_attestation(&self, reference_json: &str) -> AttestationReport {
        let reference = match load_reference(reference_json) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("reference measurements: {e}");
                return AttestationReport::error();
            }
        };

        let mut session = match self.session() {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("{e}");
                return AttestationReport::error();
            }
        };

        let status = session.run(&reference).unwrap_or_else(|e| {
            tracing::error!("attestation failed: {e}");
            e.status()
        });

        tracing::info!("attestation {status}");

        AttestationReport {
            status,
            device_id: session.device_id().map(hex::encode_upper),
        }
    }

    /// Create an attestation sub-key bound to `context` (1 to 56 hex
    /// characters) and derived from the named PUF
    pub fn create_device_attestation_subkey(&self, context: &str, puf_type: &str) -> Status {
        let r = self.create_subkey(context, puf_type);

        match r {
            Ok(()) => Status::Ok,
            Err(e) => {
                tracing::error!("attestation sub-key creation failed: {e}");
                e.status()
            }
        }
    }

    fn create_subkey(&self, context: &str, puf_type: &str) -> Result<(), Error> {
        let context = parse_context(context).map_err(|e| Error::Config(e.to_string()))?;
        let puf_type = puf_type
            .parse::<PufType>()
            .map_err(|e| Error::Config(e.to_string()))?;

        let mut session = self.session()?;
        session.establish_session()?;
        session.create_attestation_subkey(context, puf_type)?;

        Ok(())
    }

    /// OK when the device answers GET_CHIPID with a non-empty payload
    pub fn health_check(&self) -> Status {
        match self.chip_id() {
            Ok(id) if !id.is_empty() => {
                tracing::info!("device {} is alive", hex::encode_upper(&id));
                Status::Ok
            }
            Ok(_) => {
                tracing::error!("empty GET_CHIPID response");
                Status::Error
            }
            Err(e) => {
                tracing::error!("health check failed: {e}");
                Status::Error
            }
        }
    }

    fn chip_id(&self) -> Result<Vec<u8>, Error> {
        let mut transport = self.connector.connect(&self.config.transport)?;

        let request = wire::create(&get_chip_id(), CommandCode::GetChipId)?;
        let response = transport.send(&request)?;

        Ok(wire::retrieve(&response, CommandCode::GetChipId)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attest::simulator::{SimulatedConnector, IO_DIGEST};
    use crate::chain::fixtures::{published_chain, BASE};
    use crate::chain::MemoDistributionPoint;

    const ROOT_CRL: &[u8] = include_bytes!("../../testdata/root.crl");
    const FAMILY_CRL: &[u8] = include_bytes!("../../testdata/family.crl");
    const DEVICEID_CRL: &[u8] = include_bytes!("../../testdata/deviceid.crl");
    const FAMILY_REVOKED: &[u8] = include_bytes!("../../testdata/family-revoked.crl");

    fn exchange(
        connector: SimulatedConnector,
    ) -> VerifierExchange<SimulatedConnector, MemoDistributionPoint> {
        let dp = published_chain();
        for (name, der) in [
            ("root.crl", ROOT_CRL),
            ("family.crl", FAMILY_CRL),
            ("deviceid.crl", DEVICEID_CRL),
        ] {
            dp.insert(&format!("{BASE}{name}"), der).unwrap();
        }

        let config = Config::from_json(
            r#"{
                "transport": { "host": "simulator", "port": 1 },
                "distribution-point": { "mirror": "." }
            }"#,
        )
        .unwrap();

        VerifierExchange::new(config, connector, dp)
    }

    fn reference(digest: &[u8]) -> String {
        format!(
            r#"[{{
                "vendor": "intel.com",
                "layer": 2,
                "type": "2.16.840.1.113741.1.15.4.2",
                "fwid": {{ "hash-alg": "2.16.840.1.101.3.4.2.2", "digest": "{}" }}
            }}]"#,
            hex::encode_upper(digest)
        )
    }

    #[test]
    fn get_attestation() {
        let x = exchange(SimulatedConnector::new());

        let report = x.get_attestation(&reference(&IO_DIGEST));

        assert_eq!(report.status, Status::Ok);
        assert_eq!(report.device_id.as_deref(), Some("695D48644C08D307"));

        assert_eq!(x.get_attestation(&reference(&[0; 48])).status, Status::Fail);
        assert_eq!(x.get_attestation("[]").status, Status::Ok);
    }

    #[test]
    fn get_attestation_errors() {
        let x = exchange(SimulatedConnector::new());
        assert_eq!(x.get_attestation("not json"), AttestationReport::error());

        let mut offline = SimulatedConnector::new();
        offline.offline = true;
        let x = exchange(offline);
        assert_eq!(x.get_attestation("[]").status, Status::Error);
    }

    #[test]
    fn revoked_family_fails() {
        let x = exchange(SimulatedConnector::new());
        x.dp.insert(&format!("{BASE}family.crl"), FAMILY_REVOKED).unwrap();

        let report = x.get_attestation("[]");

        assert_eq!(report.status, Status::Fail);
        assert!(report.device_id.is_some());
    }

    #[test]
    fn create_subkey() {
        let x = exchange(SimulatedConnector::new());

        assert_eq!(x.create_device_attestation_subkey("C0FFEE", "EFUSE"), Status::Ok);
        assert_eq!(x.create_device_attestation_subkey("abc", "iid"), Status::Ok);
        assert_eq!(
            x.create_device_attestation_subkey(&"F".repeat(56), "INTEL_USER"),
            Status::Ok
        );
    }

    #[test]
    fn create_subkey_bad_arguments() {
        let x = exchange(SimulatedConnector::new());

        assert_eq!(x.create_device_attestation_subkey("", "EFUSE"), Status::Error);
        assert_eq!(
            x.create_device_attestation_subkey(&"F".repeat(57), "EFUSE"),
            Status::Error
        );
        assert_eq!(x.create_device_attestation_subkey("XYZ", "EFUSE"), Status::Error);
        assert_eq!(x.create_device_attestation_subkey("00", "NOPE"), Status::Error);
    }

    #[test]
    fn health_check() {
        assert_eq!(exchange(SimulatedConnector::new()).health_check(), Status::Ok);

        let mut offline = SimulatedConnector::new();
        offline.offline = true;
        assert_eq!(exchange(offline).health_check(), Status::Error);
    }
}
