// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::tcbinfo::{Fwid, TcbInfo};
use std::fmt;

pub const MEASUREMENT_VENDOR: &str = "intel.com";
pub const MEASUREMENT_TYPE_PREFIX: &str = "2.16.840.1.113741.1.15.4";
pub const MEASUREMENT_LAYER: u64 = 2;

const SHA256_OID: &str = "2.16.840.1.101.3.4.2.1";
const SHA384_OID: &str = "2.16.840.1.101.3.4.2.2";
const SHA512_OID: &str = "2.16.840.1.101.3.4.2.3";

const BLOCK_HEADER_LEN: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SectionType {
    Reserved = 0,
    DeviceState = 1,
    Io = 2,
    Core = 3,
    Hpio = 4,
    Hps = 5,
    Pr = 6,
    Layer0FwRomExt = 10,
    Layer1FwCmf = 11,
    Layer2BaseDesign = 12,
}

impl TryFrom<u8> for SectionType {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self, Error> {
        Ok(match v {
            0 => SectionType::Reserved,
            1 => SectionType::DeviceState,
            2 => SectionType::Io,
            3 => SectionType::Core,
            4 => SectionType::Hpio,
            5 => SectionType::Hps,
            6 => SectionType::Pr,
            10 => SectionType::Layer0FwRomExt,
            11 => SectionType::Layer1FwCmf,
            12 => SectionType::Layer2BaseDesign,
            _ => return Err(Error::Measurement(format!("unknown section type {v}"))),
        })
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SectionType::Reserved => "RESERVED",
            SectionType::DeviceState => "DEVICE_STATE",
            SectionType::Io => "IO",
            SectionType::Core => "CORE",
            SectionType::Hpio => "HPIO",
            SectionType::Hps => "HPS",
            SectionType::Pr => "PR",
            SectionType::Layer0FwRomExt => "LAYER_0_FW_ROM_EXT",
            SectionType::Layer1FwCmf => "LAYER_1_FW_CMF",
            SectionType::Layer2BaseDesign => "LAYER_2_BASE_DESIGN",
        };
        write!(f, "{s}")
    }
}

/// One block of a GET_MEASUREMENT record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceMeasurement {
    pub section: SectionType,
    pub index: u8,
    pub value: Vec<u8>,
}

fn hash_alg_for(digest: &[u8]) -> Option<&'static str> {
    match digest.len() {
        32 => Some(SHA256_OID),
        48 => Some(SHA384_OID),
        64 => Some(SHA512_OID),
        _ => None,
    }
}

impl DeviceMeasurement {
    /// Express the block as a layer 2 TcbInfo so that it can be aggregated
    /// with the certificate chain's entries
    pub fn to_tcb_info(&self) -> Result<TcbInfo, Error> {
        let mut t = TcbInfo {
            vendor: Some(MEASUREMENT_VENDOR.to_string()),
            layer: Some(MEASUREMENT_LAYER),
            tcb_type: Some(format!("{MEASUREMENT_TYPE_PREFIX}.{}", self.section as u8)),
            ..Default::default()
        };

        if self.section == SectionType::Pr {
            t.index = Some(self.index.into());
        }

        if self.section == SectionType::DeviceState {
            t.vendor_info = Some(self.value.clone());
        } else {
            let hash_alg = hash_alg_for(&self.value).ok_or_else(|| {
                Error::Measurement(format!(
                    "{} digest has unsupported length {}",
                    self.section,
                    self.value.len()
                ))
            })?;

            t.fwid = Some(Fwid {
                hash_alg: hash_alg.to_string(),
                digest: self.value.clone(),
            });
        }

        Ok(t)
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        let len = u16::try_from(self.value.len())
            .map_err(|_| Error::Measurement(format!("{} value too long", self.section)))?;

        out.push(self.section as u8);
        out.push(self.index);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&self.value);
        Ok(())
    }
}

/// Split a measurement record into its blocks.  `blocks` is the count
/// announced by the response.
pub fn parse_record(record: &[u8], blocks: u8) -> Result<Vec<DeviceMeasurement>, Error> {
    let mut out = Vec::with_capacity(blocks.into());
    let mut rest = record;

    while !rest.is_empty() {
        if rest.len() < BLOCK_HEADER_LEN {
            return Err(Error::Measurement(format!(
                "truncated block header at offset {}",
                record.len() - rest.len()
            )));
        }

        let section = SectionType::try_from(rest[0])?;
        let index = rest[1];
        let len = u16::from_le_bytes([rest[2], rest[3]]) as usize;

        let value = rest
            .get(BLOCK_HEADER_LEN..BLOCK_HEADER_LEN + len)
            .ok_or_else(|| Error::Measurement(format!("{section} block truncated")))?;

        out.push(DeviceMeasurement {
            section,
            index,
            value: value.to_vec(),
        });
        rest = &rest[BLOCK_HEADER_LEN + len..];
    }

    if out.len() != usize::from(blocks) {
        return Err(Error::Measurement(format!(
            "{} blocks in record, {} announced",
            out.len(),
            blocks
        )));
    }

    Ok(out)
}

/// Inverse of [`parse_record`]
pub fn encode_record(blocks: &[DeviceMeasurement]) -> Result<Vec<u8>, Error> {
    let mut out = vec![];
    for b in blocks {
        b.encode(&mut out)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn two_blocks() {
        let record = hex!(
            "01 00 0400 DEADBEEF"
            "06 03 2000 0000000000000000000000000000000000000000000000000000000000000000"
        );

        let blocks = parse_record(&record, 2).unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].section, SectionType::DeviceState);
        assert_eq!(blocks[0].value, hex!("DEADBEEF"));
        assert_eq!(blocks[1].section, SectionType::Pr);
        assert_eq!(blocks[1].index, 3);

        assert_eq!(encode_record(&blocks).unwrap(), record);
    }

    #[test]
    fn count_mismatch() {
        let record = hex!("01 00 0100 AA");

        assert!(matches!(parse_record(&record, 2), Err(Error::Measurement(_))));
        assert!(parse_record(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn unknown_section_and_truncation() {
        assert!(parse_record(&hex!("07 00 0000"), 1).is_err());
        assert!(parse_record(&hex!("02 00 0400 AABB"), 1).is_err());
        assert!(parse_record(&hex!("02 00"), 1).is_err());
    }

    #[test]
    fn device_state_is_vendor_info() {
        let m = DeviceMeasurement {
            section: SectionType::DeviceState,
            index: 0,
            value: hex!("00000001").to_vec(),
        };

        let t = m.to_tcb_info().unwrap();

        assert_eq!(t.vendor_info, Some(hex!("00000001").to_vec()));
        assert!(t.fwid.is_none());
        assert_eq!(
            t.key().to_string(),
            "TcbInfoKey( vendor=intel.com layer=2 index=0 type=2.16.840.1.113741.1.15.4.1 )"
        );
    }

    #[test]
    fn pr_keeps_index_and_digest_selects_hash() {
        let m = DeviceMeasurement {
            section: SectionType::Pr,
            index: 5,
            value: vec![0x11; 64],
        };

        let t = m.to_tcb_info().unwrap();

        assert_eq!(t.index, Some(5));
        assert_eq!(t.fwid.unwrap().hash_alg, SHA512_OID);

        let bad = DeviceMeasurement {
            section: SectionType::Core,
            index: 0,
            value: vec![0x11; 20],
        };
        assert!(matches!(bad.to_tcb_info(), Err(Error::Measurement(_))));
    }
}
