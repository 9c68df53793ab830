// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use x509_parser::extensions::X509Extension;
use x509_parser::prelude::{FromDer, X509Certificate};

pub const TCB_INFO_OID: &str = "2.23.133.5.4.1";
pub const MULTI_TCB_INFO_OID: &str = "2.23.133.5.4.5";

#[derive(asn1::Asn1Read)]
struct Asn1Fwid<'a> {
    hash_alg: asn1::ObjectIdentifier,
    digest: &'a [u8],
}

#[derive(asn1::Asn1Read)]
struct Asn1TcbInfo<'a> {
    #[implicit(0)]
    vendor: Option<asn1::Utf8String<'a>>,
    #[implicit(1)]
    model: Option<asn1::Utf8String<'a>>,
    #[implicit(2)]
    version: Option<asn1::Utf8String<'a>>,
    #[implicit(3)]
    svn: Option<u64>,
    #[implicit(4)]
    layer: Option<u64>,
    #[implicit(5)]
    index: Option<u64>,
    #[implicit(6)]
    fwids: Option<asn1::SequenceOf<'a, Asn1Fwid<'a>>>,
    #[implicit(7)]
    flags: Option<asn1::BitString<'a>>,
    #[implicit(8)]
    vendor_info: Option<&'a [u8]>,
    #[implicit(9)]
    tcb_type: Option<&'a [u8]>,
}

/// Firmware identifier: a digest and the OID of the algorithm that produced
/// it
#[serde_with::serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Fwid {
    pub hash_alg: String,
    #[serde_as(as = "serde_with::hex::Hex<serde_with::formats::Uppercase>")]
    pub digest: Vec<u8>,
}

/// DICE TcbInfo, as carried in certificates, CRL entries and reference
/// measurement files
#[serde_with::serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TcbInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svn: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fwid: Option<Fwid>,
    #[serde_as(as = "Option<serde_with::hex::Hex<serde_with::formats::Uppercase>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<Vec<u8>>,
    #[serde_as(as = "Option<serde_with::hex::Hex<serde_with::formats::Uppercase>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_info: Option<Vec<u8>>,
    /// Only meaningful in reference values: bits of `vendor_info` that take
    /// part in comparisons
    #[serde_as(as = "Option<serde_with::hex::Hex<serde_with::formats::Uppercase>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_info_mask: Option<Vec<u8>>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub tcb_type: Option<String>,
}

fn render_type(bytes: &[u8]) -> String {
    match asn1::parse_single::<asn1::ObjectIdentifier>(bytes) {
        Ok(oid) => oid.to_string(),
        Err(_) => hex::encode_upper(bytes),
    }
}

impl TcbInfo {
    fn from_asn1(t: Asn1TcbInfo<'_>) -> Result<Self, Error> {
        let fwid = match t.fwids {
            None => None,
            Some(mut fwids) => {
                let first = fwids
                    .next()
                    .ok_or_else(|| Error::TcbInfo("empty FWID list".to_string()))?;

                if fwids.next().is_some() {
                    return Err(Error::TcbInfo("more than one FWID".to_string()));
                }

                if first.digest.is_empty() {
                    return Err(Error::TcbInfo("FWID without digest".to_string()));
                }

                Some(Fwid {
                    hash_alg: first.hash_alg.to_string(),
                    digest: first.digest.to_vec(),
                })
            }
        };

        Ok(Self {
            vendor: t.vendor.map(|s| s.as_str().to_string()),
            model: t.model.map(|s| s.as_str().to_string()),
            version: t.version.map(|s| s.as_str().to_string()),
            svn: t.svn,
            layer: t.layer,
            index: t.index,
            fwid,
            flags: t.flags.map(|b| b.as_bytes().to_vec()),
            vendor_info: t.vendor_info.map(<[u8]>::to_vec),
            vendor_info_mask: None,
            tcb_type: t.tcb_type.map(render_type),
        })
    }

    pub fn key(&self) -> TcbInfoKey {
        TcbInfoKey {
            vendor: self.vendor.clone(),
            model: self.model.clone(),
            layer: self.layer,
            index: self.index.unwrap_or(0),
            tcb_type: self.tcb_type.clone(),
        }
    }

    pub fn value(&self) -> TcbInfoValue {
        TcbInfoValue {
            version: self.version.clone(),
            svn: self.svn,
            fwid: self.fwid.clone(),
            vendor_info: self.vendor_info.as_ref().map(|v| MaskedVendorInfo {
                value: v.clone(),
                mask: self.vendor_info_mask.clone(),
            }),
            flags: self.flags.clone(),
        }
    }
}

/// Decode a DER TcbInfo (the value of a 2.23.133.5.4.1 extension)
pub fn parse_tcb_info(der: &[u8]) -> Result<TcbInfo, Error> {
    let t = asn1::parse_single::<Asn1TcbInfo>(der)
        .map_err(|e| Error::TcbInfo(format!("{e:?}")))?;

    TcbInfo::from_asn1(t)
}

/// Decode a DER MultiTcbInfo, i.e. a SEQUENCE OF TcbInfo
pub fn parse_multi_tcb_info(der: &[u8]) -> Result<Vec<TcbInfo>, Error> {
    let seq = asn1::parse_single::<asn1::SequenceOf<Asn1TcbInfo>>(der)
        .map_err(|e| Error::TcbInfo(format!("{e:?}")))?;

    seq.map(TcbInfo::from_asn1).collect()
}

/// Collect TcbInfo and MultiTcbInfo entries from an extension list
pub fn tcb_infos_from_extensions(exts: &[X509Extension]) -> Result<Vec<TcbInfo>, Error> {
    let mut out = vec![];

    for ext in exts {
        match ext.oid.to_id_string().as_str() {
            TCB_INFO_OID => out.push(parse_tcb_info(ext.value)?),
            MULTI_TCB_INFO_OID => out.extend(parse_multi_tcb_info(ext.value)?),
            _ => {}
        }
    }

    Ok(out)
}

pub fn tcb_infos_from_certificate(der: &[u8]) -> Result<Vec<TcbInfo>, Error> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|e| Error::TcbInfo(format!("certificate: {e}")))?;

    tcb_infos_from_extensions(cert.extensions())
}

/// Identity of a TCB component.  Entries with equal keys describe the same
/// component.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TcbInfoKey {
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub layer: Option<u64>,
    pub index: u64,
    pub tcb_type: Option<String>,
}

impl fmt::Display for TcbInfoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TcbInfoKey( ")?;
        if let Some(v) = &self.vendor {
            write!(f, "vendor={v} ")?;
        }
        if let Some(m) = &self.model {
            write!(f, "model={m} ")?;
        }
        if let Some(l) = self.layer {
            write!(f, "layer={l} ")?;
        }
        write!(f, "index={} ", self.index)?;
        if let Some(t) = &self.tcb_type {
            write!(f, "type={t} ")?;
        }
        write!(f, ")")
    }
}

/// Vendor-specific bytes compared under a mask
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaskedVendorInfo {
    pub value: Vec<u8>,
    /// All ones when absent
    pub mask: Option<Vec<u8>>,
}

impl MaskedVendorInfo {
    pub fn matches(&self, other: &[u8]) -> bool {
        if self.value.len() != other.len() {
            return false;
        }

        self.value.iter().zip(other).enumerate().all(|(i, (a, b))| {
            let m = self
                .mask
                .as_ref()
                .and_then(|m| m.get(i).copied())
                .unwrap_or(0xFF);
            (a & m) == (b & m)
        })
    }
}

/// Measured state of a TCB component
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TcbInfoValue {
    pub version: Option<String>,
    pub svn: Option<u64>,
    pub fwid: Option<Fwid>,
    pub vendor_info: Option<MaskedVendorInfo>,
    pub flags: Option<Vec<u8>>,
}

impl TcbInfoValue {
    /// Whether `actual` satisfies this value used as a pattern: every field
    /// present here must be present and equal there
    pub fn matches(&self, actual: &TcbInfoValue) -> bool {
        fn field<T: PartialEq>(expected: &Option<T>, actual: &Option<T>) -> bool {
            expected.is_none() || expected == actual
        }

        if !field(&self.version, &actual.version)
            || !field(&self.svn, &actual.svn)
            || !field(&self.fwid, &actual.fwid)
            || !field(&self.flags, &actual.flags)
        {
            return false;
        }

        match (&self.vendor_info, &actual.vendor_info) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(e), Some(a)) => e.matches(&a.value),
        }
    }
}
