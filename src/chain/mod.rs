// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Certificate chain retrieval from a distribution point.
//!
//! Starting from a leaf certificate (or its URL), [`ChainBuilder`] follows the
//! caIssuers entry of each certificate's Authority Information Access
//! extension until it reaches a self-signed root.

pub use self::builder::{CertificateChain, ChainBuilder, ChainLink, DEFAULT_MAX_DEPTH};
pub use self::errors::Error;
pub use self::fetch::{DistributionPoint, MemoDistributionPoint, MirrorDistributionPoint};
pub use self::x509::{common_name, crl_url, is_self_signed, is_signed_by, issuer_url, serial_hex};

mod builder;
mod errors;
mod fetch;
mod x509;

#[cfg(test)]
pub(crate) use self::builder::tests as fixtures;
