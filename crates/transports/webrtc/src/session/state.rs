//! Negotiation states and session roles

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the offer/answer exchange the server plays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Client sends the offer, server answers
    #[default]
    Answerer,
    /// Server sends the offer, client answers
    Offerer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Answerer => "answerer",
            Role::Offerer => "offerer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Negotiation state of a peer session.
///
/// ```text
/// Answerer: New -> HaveRemoteOffer -> HaveLocalAnswer
/// Offerer:  New -> HaveLocalOffer  -> HaveRemoteAnswer
/// any non-terminal -> Failed | Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    New,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalAnswer,
    HaveRemoteAnswer,
    Failed,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::New => "new",
            SessionState::HaveLocalOffer => "have-local-offer",
            SessionState::HaveRemoteOffer => "have-remote-offer",
            SessionState::HaveLocalAnswer => "have-local-answer",
            SessionState::HaveRemoteAnswer => "have-remote-answer",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        }
    }

    /// `Failed` and `Closed` are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Closed)
    }

    /// Whether the engine already holds the remote description, so ICE
    /// candidates can be applied instead of queued
    pub fn has_remote_description(&self) -> bool {
        matches!(
            self,
            SessionState::HaveRemoteOffer
                | SessionState::HaveLocalAnswer
                | SessionState::HaveRemoteAnswer
        )
    }

    /// Check whether moving to `next` is allowed
    pub fn can_transition(&self, next: SessionState) -> bool {
        use SessionState::*;

        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Failed)
                | (_, Closed)
                | (New, HaveRemoteOffer)
                | (New, HaveLocalOffer)
                | (HaveRemoteOffer, HaveLocalAnswer)
                | (HaveLocalOffer, HaveRemoteAnswer)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
