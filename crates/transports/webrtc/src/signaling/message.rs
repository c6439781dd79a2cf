//! Signaling wire messages
//!
//! ```text
//! {"type":"offer","sdp":"<SDP text>"}
//! {"type":"answer","sdp":"<SDP text>"}
//! {"type":"candidate","candidate":{<ICE candidate fields>}}
//! {"type":"bye"}
//! ```

use crate::engine::IceCandidate;
use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message on the signaling channel, in either direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingMessage {
    /// SDP offer
    Offer { sdp: String },

    /// SDP answer
    Answer { sdp: String },

    /// Trickled ICE candidate. Browsers send `null` or an empty candidate
    /// string to mark the end of their candidates.
    Candidate {
        #[serde(default)]
        candidate: Option<IceCandidate>,
    },

    /// Client is leaving
    Bye,
}

impl SignalingMessage {
    /// Parse one channel message.
    ///
    /// Distinguishes text that is not a JSON object, an object without a
    /// `type`, an unknown `type`, and a known `type` with a bad body.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;

        let message_type = match value.as_object().map(|obj| obj.get("type")) {
            None => {
                return Err(ProtocolError::MalformedJson(
                    "expected a JSON object".to_string(),
                ))
            }
            Some(Some(Value::String(message_type))) => message_type.as_str(),
            Some(_) => return Err(ProtocolError::MissingType),
        };

        let message_type = match message_type {
            "offer" => "offer",
            "answer" => "answer",
            "candidate" => "candidate",
            "bye" => "bye",
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        };

        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidBody {
            message_type,
            reason: e.to_string(),
        })
    }

    /// Wire name of this message's `type`
    pub fn message_type(&self) -> &'static str {
        match self {
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::Candidate { .. } => "candidate",
            SignalingMessage::Bye => "bye",
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn candidate(candidate: IceCandidate) -> Self {
        SignalingMessage::Candidate {
            candidate: Some(candidate),
        }
    }
}
