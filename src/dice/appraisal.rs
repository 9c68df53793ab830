// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::aggregator::TcbInfoAggregator;
use super::errors::Error;
use super::tcbinfo::TcbInfo;
use std::fmt;

/// Outcome of a verifier operation, as reported to the caller and used as
/// the process exit code
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    Fail,
    Error,
}

impl Status {
    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Fail => 1,
            Status::Error => -1,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ok => "OK",
            Status::Fail => "FAIL",
            Status::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// Parse a reference measurement file: a JSON array of TcbInfo objects
pub fn load_reference(j: &str) -> Result<Vec<TcbInfo>, Error> {
    serde_json::from_str(j).map_err(|e| Error::Reference(e.to_string()))
}

/// Every reference entry must be present in the evidence with a matching
/// value
pub fn appraise(evidence: &TcbInfoAggregator, reference: &[TcbInfo]) -> Status {
    if reference.is_empty() {
        tracing::warn!("no reference measurements, evidence accepted as is");
        return Status::Ok;
    }

    for r in reference {
        let key = r.key();

        let Some(actual) = evidence.map().get(&key) else {
            tracing::error!("{key} not found in evidence");
            return Status::Fail;
        };

        if !r.value().matches(actual) {
            tracing::error!("{key} does not match reference value");
            return Status::Fail;
        }

        tracing::debug!("{key} matches");
    }

    Status::Ok
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRMWARE: &[u8] = include_bytes!("../../testdata/firmware.der");

    fn evidence() -> TcbInfoAggregator {
        let mut agg = TcbInfoAggregator::new();
        agg.add_certificate(FIRMWARE).unwrap();
        agg
    }

    #[test]
    fn empty_reference_passes() {
        assert_eq!(appraise(&evidence(), &[]), Status::Ok);
    }

    #[test]
    fn matching_reference() {
        let reference = load_reference(
            r#"[{
                "vendor": "intel.com",
                "model": "Agilex",
                "layer": 1,
                "svn": 1,
                "fwid": {
                    "hash-alg": "2.16.840.1.101.3.4.2.2",
                    "digest": "9430BBFC85A933E15A87E04D12A86D4231A88DC7FE58F388ED0CB3235EF3E7D5BB1CC91C72C4BA7A045971AE07B91F61"
                }
            }]"#,
        )
        .unwrap();

        assert_eq!(appraise(&evidence(), &reference), Status::Ok);
    }

    #[test]
    fn mismatching_or_missing_reference() {
        let wrong_svn = load_reference(
            r#"[{ "vendor": "intel.com", "model": "Agilex", "layer": 1, "svn": 7 }]"#,
        )
        .unwrap();
        assert_eq!(appraise(&evidence(), &wrong_svn), Status::Fail);

        let missing = load_reference(r#"[{ "vendor": "intel.com", "layer": 9 }]"#).unwrap();
        assert_eq!(appraise(&evidence(), &missing), Status::Fail);
    }

    #[test]
    fn bad_reference_file() {
        assert!(matches!(
            load_reference(r#"{ "vendor": "intel.com" }"#),
            Err(Error::Reference(_))
        ));
    }

    #[test]
    fn status_codes() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::Fail.code(), 1);
        assert_eq!(Status::Error.code(), -1);
        assert_eq!(Status::Error.to_string(), "ERROR");
    }
}
