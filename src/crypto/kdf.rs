// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use openssl::hash::MessageDigest;
use openssl::memcmp;
use openssl::pkey::PKey;
use openssl::sign::Signer;

const COUNTER: u32 = 1;
const LABEL_LEN: usize = 27;
const CONTEXT_LEN: usize = 16;
const CONTEXT: &str = "PSG-SIGMA";
const SEPARATOR: u8 = 0;
const RESERVED: u32 = 0;

pub const PMK_LEN: usize = 48;
pub const SEK_SMK_LEN: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KdfLabel {
    SessionEnc,
    SessionMac,
    ProtocolMac,
}

impl KdfLabel {
    fn as_str(self) -> &'static str {
        match self {
            KdfLabel::SessionEnc => "SESSION ENC",
            KdfLabel::SessionMac => "SESSION MAC",
            KdfLabel::ProtocolMac => "PROTOCOL MAC",
        }
    }

    fn output_len(self) -> usize {
        match self {
            KdfLabel::ProtocolMac => PMK_LEN,
            KdfLabel::SessionEnc | KdfLabel::SessionMac => SEK_SMK_LEN,
        }
    }
}

fn padded(s: &str, len: usize) -> Vec<u8> {
    let mut v = s.as_bytes().to_vec();
    v.resize(len, 0);
    v
}

fn kdf_input(label: KdfLabel) -> Vec<u8> {
    let mut v = Vec::with_capacity(4 + LABEL_LEN + 1 + CONTEXT_LEN + 4 + 4);

    v.extend_from_slice(&COUNTER.to_le_bytes());
    v.extend(padded(label.as_str(), LABEL_LEN));
    v.push(SEPARATOR);
    v.extend(padded(CONTEXT, CONTEXT_LEN));
    v.extend_from_slice(&RESERVED.to_le_bytes());
    v.extend_from_slice(&((label.output_len() * 8) as u32).to_le_bytes());

    v
}

pub fn hmac_sha384(key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    let pkey = PKey::hmac(key).map_err(|e| Error::Mac(format!("{e:?}")))?;
    let mut signer =
        Signer::new(MessageDigest::sha384(), &pkey).map_err(|e| Error::Mac(format!("{e:?}")))?;

    signer
        .update(data)
        .map_err(|e| Error::Mac(format!("{e:?}")))?;

    signer.sign_to_vec().map_err(|e| Error::Mac(format!("{e:?}")))
}

/// Derive the key for `label` from an ECDH shared secret
pub fn derive(secret: &[u8], label: KdfLabel) -> Result<Vec<u8>, Error> {
    let mut out = hmac_sha384(secret, &kdf_input(label))?;
    out.truncate(label.output_len());
    Ok(out)
}

/// The three SIGMA session keys
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKeys {
    pub pmk: Vec<u8>,
    pub sek: Vec<u8>,
    pub smk: Vec<u8>,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionKeys(<redacted>)")
    }
}

impl SessionKeys {
    pub fn derive(secret: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            pmk: derive(secret, KdfLabel::ProtocolMac)?,
            sek: derive(secret, KdfLabel::SessionEnc)?,
            smk: derive(secret, KdfLabel::SessionMac)?,
        })
    }
}

/// Constant-time check of an HMAC-SHA384 tag
pub fn mac_matches(key: &[u8], data: &[u8], tag: &[u8]) -> Result<bool, Error> {
    let expected = hmac_sha384(key, data)?;

    if expected.len() != tag.len() {
        return Ok(false);
    }

    Ok(memcmp::eq(&expected, tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_block_layout() {
        let v = kdf_input(KdfLabel::ProtocolMac);

        assert_eq!(v.len(), 56);
        assert_eq!(&v[..4], &[1, 0, 0, 0]);
        assert_eq!(&v[4..16], b"PROTOCOL MAC");
        assert!(v[16..31].iter().all(|b| *b == 0));
        assert_eq!(v[31], 0);
        assert_eq!(&v[32..41], b"PSG-SIGMA");
        assert_eq!(&v[48..52], &[0, 0, 0, 0]);
        assert_eq!(&v[52..], &384u32.to_le_bytes());
    }

    #[test]
    fn key_lengths() {
        let keys = SessionKeys::derive(&[7u8; 48]).unwrap();

        assert_eq!(keys.pmk.len(), PMK_LEN);
        assert_eq!(keys.sek.len(), SEK_SMK_LEN);
        assert_eq!(keys.smk.len(), SEK_SMK_LEN);
        assert_ne!(keys.sek, keys.smk);
    }

    #[test]
    fn mac_check() {
        let tag = hmac_sha384(b"key", b"data").unwrap();

        assert_eq!(tag.len(), 48);
        assert!(mac_matches(b"key", b"data", &tag).unwrap());
        assert!(!mac_matches(b"key", b"other", &tag).unwrap());
        assert!(!mac_matches(b"key", b"data", &tag[..47]).unwrap());
    }
}
