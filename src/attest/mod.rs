// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Device attestation: the session state machine that drives the mailbox
//! commands, chain building, revocation and appraisal, the transports it
//! talks through, the SPDM evidence path and the integer-status facade used
//! by the command line.

pub use self::config::{Config, DistributionPointConfig, TransportConfig};
pub use self::errors::Error;
pub use self::exchange::{AttestationReport, VerifierExchange};
pub use self::session::AttestationSession;
pub use self::spdm::{
    collect_spdm_evidence, split_certificate_chain, SpdmCapability, SpdmEvidence,
    ALL_MEASUREMENTS, SUPPORTED_VERSIONS,
};
pub use self::state::SessionState;
pub use self::transport::{Connect, TcpConnector, TcpTransport, Transport, MAX_RESPONSE_LEN};
pub use crate::dice::Status;

mod config;
mod errors;
mod exchange;
mod session;
#[cfg(test)]
pub(crate) mod simulator;
mod spdm;
mod state;
mod transport;
