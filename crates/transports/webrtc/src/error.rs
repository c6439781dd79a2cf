//! Error types for the signaling core

/// Result type alias using the signaling Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing or validating a signaling message.
///
/// These never affect the session: the message is logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The channel carried something that is not a JSON object
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// JSON object without a string `type` field
    #[error("message has no `type` field")]
    MissingType,

    /// `type` names a message this server does not understand
    #[error("unknown message type `{0}`")]
    UnknownType(String),

    /// Known `type` with fields that do not match its shape
    #[error("invalid `{message_type}` message: {reason}")]
    InvalidBody {
        message_type: &'static str,
        reason: String,
    },

    /// Message cannot be sent to a session playing this role
    #[error("`{message_type}` is not accepted by a session in the {role} role")]
    RoleMismatch {
        message_type: &'static str,
        role: &'static str,
    },

    /// Message is not valid in the session's current state
    #[error("`{message_type}` is not valid in state {state}")]
    UnexpectedState {
        message_type: &'static str,
        state: &'static str,
    },
}

/// Errors that can occur in signaling and session operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unexpected signaling message
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The engine rejected an offer, answer or description
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// Negotiation did not complete in time
    #[error("Negotiation timeout: {0}")]
    NegotiationTimeout(String),

    /// ICE candidate could not be applied
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// Signaling channel closed or errored
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Media track or relay error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Recording sink error
    #[error("Recorder error: {0}")]
    RecorderError(String),

    /// Session registry error
    #[error("Session error: {0}")]
    SessionError(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse error classes used to decide what happens to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Message dropped, session unaffected
    Protocol,
    /// Session moves to `Failed`
    Negotiation,
    /// Session moves to `Closed`
    Transport,
    /// Fatal at startup
    Configuration,
    /// Track or sink problem, logged
    Media,
    /// Anything else
    Internal,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::SdpError(_) | Error::NegotiationTimeout(_) => ErrorKind::Negotiation,
            Error::TransportError(_) => ErrorKind::Transport,
            Error::InvalidConfig(_) => ErrorKind::Configuration,
            Error::MediaTrackError(_) | Error::RecorderError(_) | Error::IceCandidateError(_) => {
                ErrorKind::Media
            }
            Error::SessionError(_) | Error::WebRtcError(_) | Error::IoError(_) | Error::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    /// Check if this error ends the session in `Failed`
    pub fn is_negotiation_error(&self) -> bool {
        self.kind() == ErrorKind::Negotiation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfig("test".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: test");

        let err = Error::from(ProtocolError::UnknownType("hello".to_string()));
        assert_eq!(err.to_string(), "Protocol error: unknown message type `hello`");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            Error::from(ProtocolError::MissingType).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(Error::SdpError("bad".into()).kind(), ErrorKind::Negotiation);
        assert_eq!(
            Error::NegotiationTimeout("30s".into()).kind(),
            ErrorKind::Negotiation
        );
        assert_eq!(Error::TransportError("eof".into()).kind(), ErrorKind::Transport);
        assert_eq!(Error::RecorderError("disk".into()).kind(), ErrorKind::Media);
    }

    #[test]
    fn test_error_is_config_error() {
        assert!(Error::InvalidConfig("test".to_string()).is_config_error());
        assert!(!Error::SdpError("test".to_string()).is_config_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::IoError(_)));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
