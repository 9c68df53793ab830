// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Signature verification of device-supplied evidence.

pub use self::engine::{
    key_from_certificate, key_from_psg, key_from_raw, verify, verify_der, Verdict,
};
pub use self::errors::Error;
pub use self::measurement::MeasurementVerifier;

mod engine;
mod errors;
mod measurement;
