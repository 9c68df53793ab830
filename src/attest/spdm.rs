// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use crate::chain::CertificateChain;
use crate::wire::der_length;
use openssl::hash::{hash, MessageDigest};
use openssl::memcmp;
use openssl::x509::X509;
use std::ops::RangeInclusive;

/// SPDM 1.0 to 1.2
pub const SUPPORTED_VERSIONS: RangeInclusive<u8> = 0x10..=0x12;

const CHAIN_HEADER_LEN: usize = 4;
const ROOT_HASH_LEN: usize = 48;

/// Request all measurement blocks
pub const ALL_MEASUREMENTS: u8 = 0xFF;

/// Operations of an SPDM requester engine
pub trait SpdmCapability {
    fn get_version(&mut self) -> Result<u8, Error>;

    /// One digest per populated slot selected by `slot_mask`
    fn get_digest(&mut self, slot_mask: u8) -> Result<Vec<Vec<u8>>, Error>;

    /// The certificate chain of `slot`, in SPDM encoding
    fn get_certificate(&mut self, slot: u8) -> Result<Vec<u8>, Error>;

    fn get_measurement(&mut self, slot: u8, attributes: u8) -> Result<Vec<u8>, Error>;

    fn set_certificate(&mut self, slot: u8, chain: &[u8]) -> Result<(), Error>;
}

/// What a device reported over SPDM for one slot
#[derive(Debug)]
pub struct SpdmEvidence {
    pub version: u8,
    pub digests: Vec<Vec<u8>>,
    pub chain: CertificateChain,
    pub measurements: Vec<u8>,
}

/// Split an SPDM certificate chain (length, reserved, root hash, then the
/// DER certificates from the root down) into a leaf-first chain
pub fn split_certificate_chain(bytes: &[u8]) -> Result<CertificateChain, Error> {
    if bytes.len() < CHAIN_HEADER_LEN + ROOT_HASH_LEN {
        return Err(Error::Protocol(format!(
            "SPDM certificate chain too short: {} bytes",
            bytes.len()
        )));
    }

    let declared = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
    if declared != bytes.len() {
        return Err(Error::Protocol(format!(
            "SPDM certificate chain declares {declared} bytes, got {}",
            bytes.len()
        )));
    }

    let mut rest = &bytes[CHAIN_HEADER_LEN + ROOT_HASH_LEN..];
    let mut certs = vec![];

    while !rest.is_empty() {
        let len = der_length(rest)?;
        let cert = X509::from_der(&rest[..len])
            .map_err(|e| Error::Protocol(format!("SPDM certificate: {e:?}")))?;
        certs.push(cert);
        rest = &rest[len..];
    }

    if certs.is_empty() {
        return Err(Error::ChainIncomplete("empty SPDM certificate chain".to_string()));
    }

    certs.reverse();

    Ok(CertificateChain::from_certificates(certs))
}

/// Negotiate the version, then fetch the digests, certificate chain and
/// measurements of `slot`
pub fn collect_spdm_evidence(
    spdm: &mut impl SpdmCapability,
    slot: u8,
) -> Result<SpdmEvidence, Error> {
    if slot > 7 {
        return Err(Error::Protocol(format!("SPDM slot {slot} out of range")));
    }

    let version = spdm.get_version()?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(Error::UnsupportedVersion(format!(
            "SPDM version {}.{}",
            version >> 4,
            version & 0x0F
        )));
    }

    tracing::info!("SPDM version {}.{}", version >> 4, version & 0x0F);

    let digests = spdm.get_digest(1 << slot)?;
    let raw_chain = spdm.get_certificate(slot)?;

    if let Some(expected) = digests.first() {
        let actual = hash(MessageDigest::sha384(), &raw_chain)
            .map_err(|e| Error::Internal(format!("{e:?}")))?;

        if expected.len() != actual.len() || !memcmp::eq(expected, &actual) {
            return Err(Error::Protocol(format!(
                "slot {slot} certificate chain does not match its digest"
            )));
        }
    }

    let chain = split_certificate_chain(&raw_chain)?;
    let measurements = spdm.get_measurement(slot, ALL_MEASUREMENTS)?;

    Ok(SpdmEvidence {
        version,
        digests,
        chain,
        measurements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::fixtures::{ALIAS, DEVICEID, FAMILY, FIRMWARE, ROOT};

    struct FakeSpdm {
        version: u8,
        chain: Vec<u8>,
        tampered: bool,
    }

    impl FakeSpdm {
        fn new(version: u8) -> Self {
            let mut body = hash(MessageDigest::sha384(), ROOT).unwrap().to_vec();
            for der in [ROOT, FAMILY, DEVICEID, FIRMWARE, ALIAS] {
                body.extend_from_slice(der);
            }

            let total = (CHAIN_HEADER_LEN + body.len()) as u16;
            let mut chain = total.to_le_bytes().to_vec();
            chain.extend_from_slice(&[0, 0]);
            chain.extend(body);

            Self {
                version,
                chain,
                tampered: false,
            }
        }
    }

    impl SpdmCapability for FakeSpdm {
        fn get_version(&mut self) -> Result<u8, Error> {
            Ok(self.version)
        }

        fn get_digest(&mut self, _slot_mask: u8) -> Result<Vec<Vec<u8>>, Error> {
            Ok(vec![hash(MessageDigest::sha384(), &self.chain).unwrap().to_vec()])
        }

        fn get_certificate(&mut self, _slot: u8) -> Result<Vec<u8>, Error> {
            let mut c = self.chain.clone();
            if self.tampered {
                let last = c.len() - 1;
                c[last] ^= 1;
            }
            Ok(c)
        }

        fn get_measurement(&mut self, _slot: u8, _attributes: u8) -> Result<Vec<u8>, Error> {
            Ok(vec![0x01, 0x02])
        }

        fn set_certificate(&mut self, _slot: u8, _chain: &[u8]) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn collects_leaf_first_chain() {
        let mut spdm = FakeSpdm::new(0x12);

        let ev = collect_spdm_evidence(&mut spdm, 0).unwrap();

        assert_eq!(ev.version, 0x12);
        assert_eq!(ev.chain.len(), 5);
        assert_eq!(ev.chain.leaf().unwrap().to_der().unwrap(), ALIAS);
        assert_eq!(ev.measurements, vec![0x01, 0x02]);
        ev.chain.verify_signatures().unwrap();
    }

    #[test]
    fn unsupported_version() {
        let mut spdm = FakeSpdm::new(0x13);

        assert!(matches!(
            collect_spdm_evidence(&mut spdm, 0),
            Err(Error::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn chain_not_matching_digest() {
        let mut spdm = FakeSpdm::new(0x11);
        spdm.tampered = true;

        assert!(matches!(
            collect_spdm_evidence(&mut spdm, 0),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn slot_out_of_range() {
        let mut spdm = FakeSpdm::new(0x10);

        assert!(collect_spdm_evidence(&mut spdm, 8).is_err());
    }

    #[test]
    fn malformed_chain() {
        assert!(split_certificate_chain(&[0u8; 10]).is_err());

        let mut bytes = vec![0u8; CHAIN_HEADER_LEN + ROOT_HASH_LEN];
        let total = bytes.len() as u16;
        bytes[..2].copy_from_slice(&total.to_le_bytes());
        assert!(matches!(
            split_certificate_chain(&bytes),
            Err(Error::ChainIncomplete(_))
        ));

        bytes.extend_from_slice(&[0x30, 0x05, 0x00]);
        let total = bytes.len() as u16;
        bytes[..2].copy_from_slice(&total.to_le_bytes());
        assert!(matches!(
            split_certificate_chain(&bytes),
            Err(Error::Protocol(_))
        ));
    }
}
