// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use crate::chain::DEFAULT_MAX_DEPTH;
use crate::wire::{CertificateType, PufType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_chain_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_verify_mac() -> bool {
    true
}

fn default_certificate_type() -> CertificateType {
    CertificateType::UdsEfuseAlias
}

fn default_puf_type() -> PufType {
    PufType::Efuse
}

/// Where the device mailbox is reachable
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Local mirror of the certificate and CRL distribution point
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DistributionPointConfig {
    pub mirror: PathBuf,
}

/// Verifier configuration, read from a JSON file
#[serde_with::serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub transport: TransportConfig,

    pub distribution_point: DistributionPointConfig,

    #[serde(default)]
    pub require_crl_for_leaf: bool,

    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,

    /// Check the MAC of GET_MEASUREMENT responses
    #[serde(default = "default_verify_mac")]
    pub verify_mac: bool,

    /// SHA-384 of the DER of the only acceptable root certificate
    #[serde_as(as = "Option<serde_with::hex::Hex>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_root_hash: Option<Vec<u8>>,

    #[serde(default = "default_certificate_type")]
    pub attestation_certificate_type: CertificateType,

    #[serde(default = "default_puf_type")]
    pub puf_type: PufType,
}

impl Config {
    pub fn from_json(j: &str) -> Result<Self, Error> {
        let c: Self = serde_json::from_str(j).map_err(|e| Error::Config(e.to_string()))?;

        if c.max_chain_depth == 0 {
            return Err(Error::Config("max-chain-depth must be positive".to_string()));
        }

        if let Some(h) = &c.trusted_root_hash {
            if h.len() != 48 {
                return Err(Error::Config(format!(
                    "trusted-root-hash must be a SHA-384 digest, got {} bytes",
                    h.len()
                )));
            }
        }

        Ok(c)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let j = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;

        Self::from_json(&j)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::from_json(
            r#"{
                "transport": { "host": "localhost", "port": 50001 },
                "distribution-point": { "mirror": "/var/lib/pki" }
            }"#,
        )
        .unwrap();

        assert_eq!(c.transport.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(!c.require_crl_for_leaf);
        assert_eq!(c.max_chain_depth, 8);
        assert!(c.verify_mac);
        assert_eq!(c.trusted_root_hash, None);
        assert_eq!(c.attestation_certificate_type, CertificateType::UdsEfuseAlias);
        assert_eq!(c.puf_type, PufType::Efuse);
    }

    #[test]
    fn full() {
        let c = Config::from_json(
            r#"{
                "transport": { "host": "10.0.0.7", "port": 50001, "timeout-ms": 250 },
                "distribution-point": { "mirror": "pki" },
                "require-crl-for-leaf": true,
                "max-chain-depth": 5,
                "verify-mac": false,
                "trusted-root-hash": "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f202122232425262728292a2b2c2d2e2f",
                "attestation-certificate-type": "UDS_IID_PUF_ALIAS",
                "puf-type": "IID"
            }"#,
        )
        .unwrap();

        assert_eq!(c.transport.timeout_ms, 250);
        assert!(c.require_crl_for_leaf);
        assert_eq!(c.max_chain_depth, 5);
        assert!(!c.verify_mac);
        assert_eq!(c.trusted_root_hash.as_ref().map(Vec::len), Some(48));
        assert_eq!(c.attestation_certificate_type, CertificateType::UdsIidPufAlias);
        assert_eq!(c.puf_type, PufType::Iid);
    }

    #[test]
    fn invalid() {
        for j in [
            r#"{ "transport": { "host": "h" } }"#,
            r#"{ "transport": { "host": "h", "port": 1 }, "distribution-point": { "mirror": "." }, "max-chain-depth": 0 }"#,
            r#"{ "transport": { "host": "h", "port": 1 }, "distribution-point": { "mirror": "." }, "trusted-root-hash": "00" }"#,
        ] {
            assert!(matches!(Config::from_json(j), Err(Error::Config(_))));
        }
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/attverifier.json"),
            Err(Error::Config(_))
        ));
    }
}
