// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use crate::crypto::{self, Curve};
use crate::wire::{PsgPublicKey, PsgSignature};
use openssl::ec::{EcKey, EcKeyRef};
use openssl::pkey::Public;
use openssl::x509::X509Ref;

/// Outcome of a signature check.  A well-formed signature that does not
/// verify is `Invalid`; input that cannot be interpreted as a signature at
/// all is `Malformed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid,
    Malformed(String),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    /// Turn anything but `Valid` into the matching error
    pub fn into_result(self, what: &str) -> Result<(), Error> {
        match self {
            Verdict::Valid => Ok(()),
            Verdict::Invalid => Err(Error::SignatureInvalid(format!(
                "{what} signature does not verify"
            ))),
            Verdict::Malformed(reason) => {
                Err(Error::MalformedSignature(format!("{what}: {reason}")))
            }
        }
    }
}

/// EC public key carried by an X.509 certificate
pub fn key_from_certificate(cert: &X509Ref) -> Result<EcKey<Public>, Error> {
    cert.public_key()
        .and_then(|k| k.ec_key())
        .map_err(|e| Error::Key(format!("certificate does not carry an EC key: {e:?}")))
}

/// secp384r1 public key given as raw X‖Y
pub fn key_from_raw(xy: &[u8]) -> Result<EcKey<Public>, Error> {
    let size = Curve::Secp384r1.size();

    if xy.len() != 2 * size {
        return Err(Error::Key(format!(
            "raw public key is {} bytes, expected {}",
            xy.len(),
            2 * size
        )));
    }

    crypto::public_key_from_xy(Curve::Secp384r1, &xy[..size], &xy[size..])
        .map_err(|e| Error::Key(e.to_string()))
}

pub fn key_from_psg(key: &PsgPublicKey) -> Result<EcKey<Public>, Error> {
    key.to_ec_key().map_err(|e| Error::Key(e.to_string()))
}

/// Check a DER signature over `message`
pub fn verify_der(key: &EcKeyRef<Public>, message: &[u8], der: &[u8]) -> Verdict {
    match crypto::verify(key, message, der) {
        Ok(true) => Verdict::Valid,
        Ok(false) => Verdict::Invalid,
        Err(e) => Verdict::Malformed(e.to_string()),
    }
}

/// Check a PSG signature record over `message`.  The record's curve must be
/// the curve of the key.
pub fn verify(key: &EcKeyRef<Public>, message: &[u8], signature: &PsgSignature) -> Verdict {
    match Curve::of(key) {
        Ok(c) if c == signature.curve => {}
        Ok(c) => {
            return Verdict::Malformed(format!(
                "signature on {:?} cannot be checked with a {c:?} key",
                signature.curve
            ))
        }
        Err(e) => return Verdict::Malformed(e.to_string()),
    }

    match signature.to_der() {
        Ok(der) => verify_der(key, message, &der),
        Err(e) => Verdict::Malformed(e.to_string()),
    }
}
