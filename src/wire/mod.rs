// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Mailbox wire codec.
//!
//! Requests are framed with a single packed header word ([`CommandHeader`])
//! and carry message bodies whose multi-byte fields are converted between
//! the service layout and the firmware layout according to a fixed
//! per-structure table (see [`policy`]).  Responses are decoded by
//! walking field layouts with a [`Reader`], staged wherever a length depends
//! on an earlier field.
//!
//! # Example
//!
//! ```
//! use attverifier::wire::{create, retrieve, CommandCode};
//!
//! let request = create(&[], CommandCode::GetChipId).expect("framing GET_CHIPID");
//! assert_eq!(hex::encode_upper(&request), "12000010");
//!
//! let response = hex::decode("00200010695D48644C08D307").unwrap();
//! let payload = retrieve(&response, CommandCode::GetChipId).expect("parsing response");
//! assert_eq!(hex::encode_upper(payload), "695D48644C08D307");
//! ```

pub use self::endianness::{convert, policy, Actor, Field, StructureType, SwapPolicy};
pub use self::errors::Error;
pub use self::header::{CommandHeader, HEADER_LEN};
pub use self::layout::{FieldSpec, Reader, Record, Writer};
pub use self::mailbox::{create, retrieve, CommandCode};
pub use self::message::{
    get_attestation_certificate, get_chip_id, parse_context, sigma_teardown, CertificateType,
    PufType, SigmaRequest, ALL_SESSIONS, CONTEXT_LEN, DH_PUBLIC_KEY_LEN,
};
pub use self::psg::{PsgPublicKey, PsgSignature};
pub use self::response::{
    der_length, parse_certificate, parse_chip_id, DeviceFamily, MeasurementResponse,
    SubKeyResponse, DEVICE_ID_LEN, MAC_LEN,
};

mod endianness;
mod errors;
mod header;
mod layout;
mod mailbox;
mod message;
mod psg;
mod response;
