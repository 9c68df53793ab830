// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Device attestation verifier.
//!
//! This crate establishes an authenticated SIGMA session with a hardware
//! root of trust over its mailbox, collects the device's attestation
//! certificate and signed measurements, and decides whether the device is
//! genuine, unrevoked and running the expected firmware.
//!
//! The API allows:
//! * Framing mailbox commands and decoding their responses, with per-field
//!   byte order handling for the firmware layout ([`wire`])
//! * ECDH, ECDSA and the SIGMA key derivation ([`crypto`]), and verifying
//!   device signatures and MACs ([`verify`])
//! * Building an X.509 chain from a distribution point ([`chain`]) and
//!   checking it against the issuers' CRLs ([`crl`])
//! * Aggregating DICE TcbInfo evidence and appraising it against reference
//!   measurements ([`dice`])
//! * Driving all of the above as one attestation session ([`attest`])

pub mod attest;
pub mod chain;
pub mod crl;
pub mod crypto;
pub mod dice;
pub mod verify;
pub mod wire;
