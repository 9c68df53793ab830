// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey, EcKeyRef, EcPoint};
use openssl::ecdsa::EcdsaSig;
use openssl::hash::{hash, MessageDigest};
use openssl::nid::Nid;
use openssl::pkey::{HasParams, HasPublic, Private, Public};

/// Curves accepted for device signatures.  The curve selects the digest:
/// secp256r1 signs SHA-256, secp384r1 signs SHA-384.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Curve {
    Secp256r1,
    Secp384r1,
}

impl Curve {
    pub fn nid(self) -> Nid {
        match self {
            Curve::Secp256r1 => Nid::X9_62_PRIME256V1,
            Curve::Secp384r1 => Nid::SECP384R1,
        }
    }

    pub fn digest(self) -> MessageDigest {
        match self {
            Curve::Secp256r1 => MessageDigest::sha256(),
            Curve::Secp384r1 => MessageDigest::sha384(),
        }
    }

    /// Size in bytes of a coordinate (and of each signature component)
    pub fn size(self) -> usize {
        match self {
            Curve::Secp256r1 => 32,
            Curve::Secp384r1 => 48,
        }
    }

    pub fn from_nid(nid: Nid) -> Result<Self, Error> {
        match nid {
            Nid::X9_62_PRIME256V1 => Ok(Curve::Secp256r1),
            Nid::SECP384R1 => Ok(Curve::Secp384r1),
            n => Err(Error::InvalidKey(format!(
                "unsupported curve {}",
                n.short_name().unwrap_or("unknown")
            ))),
        }
    }

    /// Curve of an existing EC key
    pub fn of<T: HasParams>(key: &EcKeyRef<T>) -> Result<Self, Error> {
        let nid = key
            .group()
            .curve_name()
            .ok_or_else(|| Error::InvalidKey("EC key on an unnamed curve".to_string()))?;

        Self::from_nid(nid)
    }

    fn group(self) -> Result<EcGroup, Error> {
        EcGroup::from_curve_name(self.nid()).map_err(|e| Error::InvalidKey(format!("{e:?}")))
    }
}

/// Build a public key from its raw affine coordinates
pub fn public_key_from_xy(curve: Curve, x: &[u8], y: &[u8]) -> Result<EcKey<Public>, Error> {
    let group = curve.group()?;
    let mut ctx = BigNumContext::new().map_err(|e| Error::InvalidKey(format!("{e:?}")))?;

    let mut point = EcPoint::new(&group).map_err(|e| Error::InvalidKey(format!("{e:?}")))?;
    let bx = BigNum::from_slice(x).map_err(|e| Error::InvalidKey(format!("{e:?}")))?;
    let by = BigNum::from_slice(y).map_err(|e| Error::InvalidKey(format!("{e:?}")))?;

    point
        .set_affine_coordinates_gfp(&group, &bx, &by, &mut ctx)
        .map_err(|e| Error::InvalidKey(format!("point not on curve: {e:?}")))?;

    let key = EcKey::from_public_key(&group, &point)
        .map_err(|e| Error::InvalidKey(format!("{e:?}")))?;
    key.check_key()
        .map_err(|e| Error::InvalidKey(format!("{e:?}")))?;

    Ok(key)
}

/// Export the raw affine coordinates of a public key, each padded to the
/// curve size
pub fn public_key_to_xy<T: HasPublic>(key: &EcKeyRef<T>) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let curve = Curve::of(key)?;
    let mut ctx = BigNumContext::new().map_err(|e| Error::InvalidKey(format!("{e:?}")))?;
    let mut x = BigNum::new().map_err(|e| Error::InvalidKey(format!("{e:?}")))?;
    let mut y = BigNum::new().map_err(|e| Error::InvalidKey(format!("{e:?}")))?;

    key.public_key()
        .affine_coordinates(key.group(), &mut x, &mut y, &mut ctx)
        .map_err(|e| Error::InvalidKey(format!("{e:?}")))?;

    let size = curve.size() as i32;
    Ok((
        x.to_vec_padded(size)
            .map_err(|e| Error::InvalidKey(format!("{e:?}")))?,
        y.to_vec_padded(size)
            .map_err(|e| Error::InvalidKey(format!("{e:?}")))?,
    ))
}

/// Sign `message` with the digest that matches the key's curve, returning a
/// DER-encoded ECDSA signature
pub fn sign(key: &EcKeyRef<Private>, message: &[u8]) -> Result<Vec<u8>, Error> {
    let curve = Curve::of(key)?;
    let digest = hash(curve.digest(), message).map_err(|e| Error::Signing(format!("{e:?}")))?;

    EcdsaSig::sign(&digest, key)
        .and_then(|s| s.to_der())
        .map_err(|e| Error::Signing(format!("{e:?}")))
}

fn parse_der(der: &[u8]) -> Result<EcdsaSig, Error> {
    let sig = EcdsaSig::from_der(der).map_err(|e| Error::MalformedSignature(format!("{e:?}")))?;

    // reject trailing garbage and non-canonical encodings
    let canonical = sig
        .to_der()
        .map_err(|e| Error::MalformedSignature(format!("{e:?}")))?;
    if canonical != der {
        return Err(Error::MalformedSignature(
            "signature is not a canonical DER SEQUENCE".to_string(),
        ));
    }

    Ok(sig)
}

/// Check a DER-encoded signature over `message`.  `Ok(false)` means the
/// signature is well formed but does not match; undecodable input is an
/// error.
pub fn verify<T: HasPublic>(key: &EcKeyRef<T>, message: &[u8], der: &[u8]) -> Result<bool, Error> {
    let sig = parse_der(der)?;
    let curve = Curve::of(key)?;
    let digest =
        hash(curve.digest(), message).map_err(|e| Error::InvalidKey(format!("{e:?}")))?;

    sig.verify(&digest, key)
        .map_err(|e| Error::InvalidKey(format!("{e:?}")))
}

/// Convert a DER signature to raw R‖S, each component padded to the curve
/// size
pub fn der_to_raw(der: &[u8], curve: Curve) -> Result<Vec<u8>, Error> {
    let sig = parse_der(der)?;
    let size = curve.size() as i32;

    let mut raw = sig
        .r()
        .to_vec_padded(size)
        .map_err(|e| Error::MalformedSignature(format!("R: {e:?}")))?;
    raw.extend(
        sig.s()
            .to_vec_padded(size)
            .map_err(|e| Error::MalformedSignature(format!("S: {e:?}")))?,
    );

    Ok(raw)
}

/// Convert raw R‖S (two equal halves) to a DER signature
pub fn raw_to_der(raw: &[u8]) -> Result<Vec<u8>, Error> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(Error::MalformedSignature(format!(
            "raw signature length {} is not two equal components",
            raw.len()
        )));
    }

    let (r, s) = raw.split_at(raw.len() / 2);

    let r = BigNum::from_slice(r).map_err(|e| Error::MalformedSignature(format!("{e:?}")))?;
    let s = BigNum::from_slice(s).map_err(|e| Error::MalformedSignature(format!("{e:?}")))?;

    EcdsaSig::from_private_components(r, s)
        .and_then(|sig| sig.to_der())
        .map_err(|e| Error::MalformedSignature(format!("{e:?}")))
}

/// The R and S integers of a DER signature in minimal two's-complement form
pub fn der_components(der: &[u8]) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let sig = parse_der(der)?;

    Ok((twos_complement(sig.r().to_vec()), twos_complement(sig.s().to_vec())))
}

fn twos_complement(mut v: Vec<u8>) -> Vec<u8> {
    match v.first() {
        None => vec![0],
        Some(b) if b & 0x80 != 0 => {
            v.insert(0, 0);
            v
        }
        Some(_) => v,
    }
}
