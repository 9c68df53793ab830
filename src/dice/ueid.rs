// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use x509_parser::prelude::{FromDer, X509Certificate};

pub const UEID_OID: &str = "2.23.133.5.4.4";

#[derive(asn1::Asn1Read)]
struct Asn1Ueid<'a> {
    ueid: &'a [u8],
}

/// Universal Entity ID of a device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ueid(pub Vec<u8>);

impl Ueid {
    pub fn parse(der: &[u8]) -> Result<Self, Error> {
        let u = asn1::parse_single::<Asn1Ueid>(der).map_err(|e| Error::Ueid(format!("{e:?}")))?;

        Ok(Self(u.ueid.to_vec()))
    }

    /// UEID extension of a DER certificate, if it has one
    pub fn from_certificate(der: &[u8]) -> Result<Option<Self>, Error> {
        let (_, cert) =
            X509Certificate::from_der(der).map_err(|e| Error::Ueid(format!("certificate: {e}")))?;

        cert.extensions()
            .iter()
            .find(|ext| ext.oid.to_id_string() == UEID_OID)
            .map(|ext| Self::parse(ext.value))
            .transpose()
    }

    /// The UEID ends with the chip id as reported by GET_CHIPID, byte
    /// reversed
    pub fn matches_chip_id(&self, chip_id: &[u8]) -> bool {
        self.0.len() >= chip_id.len()
            && self.0[self.0.len() - chip_id.len()..]
                .iter()
                .eq(chip_id.iter().rev())
    }
}

impl std::fmt::Display for Ueid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode_upper(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const DEVICEID: &[u8] = include_bytes!("../../testdata/deviceid.der");
    const FIRMWARE: &[u8] = include_bytes!("../../testdata/firmware.der");

    #[test]
    fn deviceid_certificate_ueid() {
        let ueid = Ueid::from_certificate(DEVICEID)
            .unwrap()
            .expect("UEID extension");

        assert_eq!(ueid.to_string(), "023400000000000007D3084C64485D69");
        assert!(ueid.matches_chip_id(&hex!("695D48644C08D307")));
        assert!(!ueid.matches_chip_id(&hex!("07D3084C64485D69")));
    }

    #[test]
    fn no_ueid() {
        assert_eq!(Ueid::from_certificate(FIRMWARE).unwrap(), None);
    }

    #[test]
    fn malformed() {
        assert!(matches!(Ueid::parse(&hex!("0401 00")), Err(Error::Ueid(_))));
    }
}
