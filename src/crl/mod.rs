// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Revocation checking of certificate chains.
//!
//! A certificate is revoked when its serial number appears in its issuer's
//! CRL, or when a CRL entry carries TcbInfo extensions that all match the
//! certificate's own TcbInfo.

pub use self::errors::Error;
pub use self::verifier::CrlVerifier;

mod errors;
mod verifier;
