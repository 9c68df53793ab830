// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::tcbinfo::{tcb_infos_from_certificate, TcbInfo, TcbInfoKey, TcbInfoValue};
use std::collections::BTreeMap;

/// Merges the TcbInfo entries found across a certificate chain (and the
/// device measurements) into one entry per component.
#[derive(Debug, Default)]
pub struct TcbInfoAggregator {
    map: BTreeMap<TcbInfoKey, TcbInfoValue>,
}

impl TcbInfoAggregator {
    pub fn new() -> Self {
        Default::default()
    }

    /// Add one entry.  Re-adding an identical entry is a no-op; the same key
    /// with a different value is a conflict and leaves the map untouched.
    pub fn add_one(&mut self, tcb: &TcbInfo) -> Result<(), Error> {
        let key = tcb.key();
        let value = tcb.value();

        match self.map.get(&key) {
            Some(existing) if *existing == value => Ok(()),
            Some(existing) => Err(Error::Conflict(format!(
                "{key}: {existing:?} vs {value:?}"
            ))),
            None => {
                self.map.insert(key, value);
                Ok(())
            }
        }
    }

    /// Add a batch of entries, all or nothing
    pub fn add(&mut self, tcbs: &[TcbInfo]) -> Result<(), Error> {
        let mut staged = Self {
            map: self.map.clone(),
        };

        for t in tcbs {
            staged.add_one(t)?;
        }

        self.map = staged.map;
        Ok(())
    }

    /// Add the TcbInfo and MultiTcbInfo extensions of a DER certificate
    pub fn add_certificate(&mut self, der: &[u8]) -> Result<(), Error> {
        let tcbs = tcb_infos_from_certificate(der)?;

        tracing::debug!("{} TcbInfo entries in certificate", tcbs.len());

        self.add(&tcbs)
    }

    pub fn map(&self) -> &BTreeMap<TcbInfoKey, TcbInfoValue> {
        &self.map
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::Fwid;

    const DEVICEID: &[u8] = include_bytes!("../../testdata/deviceid.der");
    const FIRMWARE: &[u8] = include_bytes!("../../testdata/firmware.der");
    const ALIAS: &[u8] = include_bytes!("../../testdata/alias.der");

    #[test]
    fn chain_aggregates_to_four_entries() {
        let mut agg = TcbInfoAggregator::new();

        for der in [ALIAS, FIRMWARE, DEVICEID] {
            agg.add_certificate(der).expect("adding certificate TcbInfo");
        }

        assert_eq!(agg.len(), 4);
    }

    #[test]
    fn conflicting_value_leaves_map_unchanged() {
        let mut agg = TcbInfoAggregator::new();
        agg.add_certificate(FIRMWARE).unwrap();

        let mut rogue = tcb_infos_from_certificate(FIRMWARE).unwrap().remove(0);
        rogue.fwid = Some(Fwid {
            hash_alg: "2.16.840.1.101.3.4.2.2".to_string(),
            digest: vec![0xAB; 48],
        });
        let extra = TcbInfo {
            vendor: Some("example.com".to_string()),
            ..Default::default()
        };

        let before = agg.map().clone();
        let r = agg.add(&[extra, rogue]);

        assert!(matches!(r, Err(Error::Conflict(_))));
        assert_eq!(agg.map(), &before);
    }

    #[test]
    fn identical_entry_is_noop() {
        let mut agg = TcbInfoAggregator::new();
        let t = tcb_infos_from_certificate(DEVICEID).unwrap();

        agg.add(&t).unwrap();
        agg.add(&t).unwrap();

        assert_eq!(agg.len(), 1);
    }
}
