// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use openssl::bn::{BigNum, BigNumContext};
use openssl::derive::Deriver;
use openssl::ec::{EcGroup, EcKey, EcPoint, EcPointRef};
use openssl::error::ErrorStack;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private, Public};
use std::cmp::Ordering;

/// Size in bytes of one secp384r1 coordinate
pub const COORDINATE_LEN: usize = 48;
/// Size in bytes of an exported public key (X‖Y)
pub const PUBLIC_KEY_LEN: usize = 2 * COORDINATE_LEN;

const MAX_GENERATE_ATTEMPTS: usize = 16;

/// An ECDH key pair on secp384r1.  A pair built from a peer's public key
/// carries no private part.
#[derive(Clone, PartialEq, Eq)]
pub struct EcdhKeyPair {
    public: Vec<u8>,
    private: Option<Vec<u8>>,
}

impl std::fmt::Debug for EcdhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdhKeyPair")
            .field("public", &hidden_asset(&hex::encode_upper(&self.public)))
            .field("private", &self.private.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn group() -> Result<EcGroup, ErrorStack> {
    EcGroup::from_curve_name(Nid::SECP384R1)
}

fn export_point(group: &EcGroup, point: &EcPointRef) -> Result<Vec<u8>, ErrorStack> {
    let mut ctx = BigNumContext::new()?;
    let mut x = BigNum::new()?;
    let mut y = BigNum::new()?;
    point.affine_coordinates(group, &mut x, &mut y, &mut ctx)?;

    let mut out = x.to_vec_padded(COORDINATE_LEN as i32)?;
    out.extend(y.to_vec_padded(COORDINATE_LEN as i32)?);

    Ok(out)
}

fn import_point(group: &EcGroup, xy: &[u8]) -> Result<EcPoint, Error> {
    if xy.is_empty() {
        return Err(Error::InvalidKey("empty public key".to_string()));
    }

    if xy.len() != PUBLIC_KEY_LEN {
        return Err(Error::InvalidKey(format!(
            "public key length is {}, expected {PUBLIC_KEY_LEN}",
            xy.len()
        )));
    }

    let mut ctx = BigNumContext::new().map_err(|e| Error::InvalidKey(format!("{e:?}")))?;

    let mut uncompressed = Vec::with_capacity(1 + PUBLIC_KEY_LEN);
    uncompressed.push(0x04);
    uncompressed.extend_from_slice(xy);

    let point = EcPoint::from_bytes(group, &uncompressed, &mut ctx)
        .map_err(|e| Error::InvalidKey(format!("point not on curve: {e:?}")))?;

    let generator = point
        .eq(group, group.generator(), &mut ctx)
        .map_err(|e| Error::InvalidKey(format!("{e:?}")))?;

    if generator {
        return Err(Error::InvalidKey("public key is the generator".to_string()));
    }

    Ok(point)
}

fn scalar_in_range(scalar: &BigNum, group: &EcGroup) -> Result<bool, ErrorStack> {
    let mut ctx = BigNumContext::new()?;
    let mut order = BigNum::new()?;
    group.order(&mut order, &mut ctx)?;
    let one = BigNum::from_u32(1)?;

    Ok(scalar.ucmp(&one) == Ordering::Greater && scalar.ucmp(&order) == Ordering::Less)
}

impl EcdhKeyPair {
    /// Generate a fresh key pair, retrying until the private scalar lies
    /// strictly between 1 and the group order
    pub fn generate() -> Result<Self, Error> {
        let group = group().map_err(|e| Error::KeyGeneration(format!("{e:?}")))?;

        for _ in 0..MAX_GENERATE_ATTEMPTS {
            let key = EcKey::generate(&group).map_err(|e| Error::KeyGeneration(format!("{e:?}")))?;

            let scalar = key
                .private_key()
                .to_owned()
                .map_err(|e| Error::KeyGeneration(format!("{e:?}")))?;

            if !scalar_in_range(&scalar, &group)
                .map_err(|e| Error::KeyGeneration(format!("{e:?}")))?
            {
                continue;
            }

            let public = export_point(&group, key.public_key())
                .map_err(|e| Error::KeyGeneration(format!("{e:?}")))?;
            let private = scalar
                .to_vec_padded(COORDINATE_LEN as i32)
                .map_err(|e| Error::KeyGeneration(format!("{e:?}")))?;

            return Ok(Self {
                public,
                private: Some(private),
            });
        }

        Err(Error::KeyGeneration(format!(
            "no valid key after {MAX_GENERATE_ATTEMPTS} attempts"
        )))
    }

    /// Wrap a peer's X‖Y public key.  Empty input, points that are not on the
    /// curve and the generator itself are rejected.
    pub fn from_public_bytes(xy: &[u8]) -> Result<Self, Error> {
        let group = group().map_err(|e| Error::InvalidKey(format!("{e:?}")))?;
        import_point(&group, xy)?;

        Ok(Self {
            public: xy.to_vec(),
            private: None,
        })
    }

    /// Rebuild a key pair from its raw private scalar
    pub fn from_private_bytes(scalar: &[u8]) -> Result<Self, Error> {
        let group = group().map_err(|e| Error::InvalidKey(format!("{e:?}")))?;
        let key = private_key(&group, scalar)?;

        let public = export_point(&group, key.public_key())
            .map_err(|e| Error::InvalidKey(format!("{e:?}")))?;

        let mut private = vec![0u8; COORDINATE_LEN.saturating_sub(scalar.len())];
        private.extend_from_slice(scalar);

        Ok(Self {
            public,
            private: Some(private),
        })
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    pub fn private_key(&self) -> Option<&[u8]> {
        self.private.as_deref()
    }

    /// Compute the ECDH shared secret between our private key and `peer`
    pub fn shared_secret(&self, peer: &EcdhKeyPair) -> Result<Vec<u8>, Error> {
        let scalar = self
            .private
            .as_deref()
            .ok_or_else(|| Error::InvalidKey("no private key for key agreement".to_string()))?;

        let group = group().map_err(|e| Error::InvalidKey(format!("{e:?}")))?;

        let ours = PKey::from_ec_key(private_key(&group, scalar)?)
            .map_err(|e| Error::InvalidKey(format!("{e:?}")))?;
        let theirs = peer.to_pkey(&group)?;

        let mut deriver = Deriver::new(&ours).map_err(|e| Error::InvalidKey(format!("{e:?}")))?;
        deriver
            .set_peer(&theirs)
            .map_err(|e| Error::InvalidKey(format!("{e:?}")))?;

        deriver
            .derive_to_vec()
            .map_err(|e| Error::InvalidKey(format!("{e:?}")))
    }

    fn to_pkey(&self, group: &EcGroup) -> Result<PKey<Public>, Error> {
        let point = import_point(group, &self.public)?;
        let key = EcKey::from_public_key(group, &point)
            .map_err(|e| Error::InvalidKey(format!("{e:?}")))?;

        PKey::from_ec_key(key).map_err(|e| Error::InvalidKey(format!("{e:?}")))
    }
}

fn private_key(group: &EcGroup, scalar: &[u8]) -> Result<EcKey<Private>, Error> {
    let d = BigNum::from_slice(scalar).map_err(|e| Error::InvalidKey(format!("{e:?}")))?;

    if !scalar_in_range(&d, group).map_err(|e| Error::InvalidKey(format!("{e:?}")))? {
        return Err(Error::InvalidKey("private scalar out of range".to_string()));
    }

    let ctx = BigNumContext::new().map_err(|e| Error::InvalidKey(format!("{e:?}")))?;
    let mut point = EcPoint::new(group).map_err(|e| Error::InvalidKey(format!("{e:?}")))?;
    point
        .mul_generator(group, &d, &ctx)
        .map_err(|e| Error::InvalidKey(format!("{e:?}")))?;

    let key = EcKey::from_private_components(group, &d, &point)
        .map_err(|e| Error::InvalidKey(format!("{e:?}")))?;
    key.check_key()
        .map_err(|e| Error::InvalidKey(format!("{e:?}")))?;

    Ok(key)
}

/// Shorten a hex-encoded 96-byte key for logging: the first and last 24
/// characters are kept.
pub fn hidden_asset(hex: &str) -> String {
    const VISIBLE: usize = 24;

    if hex.len() != 2 * PUBLIC_KEY_LEN || !hex.is_ascii() {
        return "<could not print asset>".to_string();
    }

    format!("{}...{}", &hex[..VISIBLE], &hex[hex.len() - VISIBLE..])
}
