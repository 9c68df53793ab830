// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Progress of an attestation session.  Transitions only go forward;
/// `Accepted` and `Rejected` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Init,
    SessionEstablished,
    EvidenceCollected,
    ChainValidated,
    Accepted,
    Rejected,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Accepted | SessionState::Rejected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Init => "INIT",
            SessionState::SessionEstablished => "SESSION_ESTABLISHED",
            SessionState::EvidenceCollected => "EVIDENCE_COLLECTED",
            SessionState::ChainValidated => "CHAIN_VALIDATED",
            SessionState::Accepted => "ACCEPTED",
            SessionState::Rejected => "REJECTED",
        };
        write!(f, "{s}")
    }
}
