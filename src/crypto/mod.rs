// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Cryptographic primitives used by the SIGMA exchange: ECDH on secp384r1,
//! ECDSA with curve-selected digests, DER/raw signature conversion and the
//! HMAC-SHA384 key derivation.

pub use self::ecdh::{hidden_asset, EcdhKeyPair, COORDINATE_LEN, PUBLIC_KEY_LEN};
pub use self::errors::Error;
pub use self::kdf::{derive, hmac_sha384, mac_matches, KdfLabel, SessionKeys, PMK_LEN};
pub use self::signature::{
    der_components, der_to_raw, public_key_from_xy, public_key_to_xy, raw_to_der, sign, verify,
    Curve,
};

mod ecdh;
mod errors;
mod kdf;
mod signature;
