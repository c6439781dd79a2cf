//! Engine seam
//!
//! The session state machine never talks to a WebRTC library directly. It
//! drives an [`EngineConnection`] and consumes the [`EngineEvent`]s that the
//! engine pushes into an mpsc channel handed over at construction. The
//! concrete engine built on the `webrtc` crate lives in [`webrtc_rs`]; tests
//! script their own.

pub mod webrtc_rs;

pub use webrtc_rs::WebRtcEngine;

use crate::session::SessionId;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Identifier of a media track as reported by the engine
pub type TrackId = String;

/// SDP description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Session description exchanged during negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate in the browser's `RTCIceCandidate.toJSON()` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,

    #[serde(default, alias = "sdp_mid", skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    #[serde(
        default,
        rename = "sdpMLineIndex",
        alias = "sdp_mline_index",
        alias = "sdpMlineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,

    #[serde(
        default,
        alias = "username_fragment",
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

/// Peer connection state as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Codec parameters an outbound track must be created with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecInfo {
    pub mime_type: String,
    pub clock_rate: u32,
    pub channels: u16,
    pub sdp_fmtp_line: String,
}

impl CodecInfo {
    /// 48kHz stereo Opus, the WebRTC default audio codec
    pub fn opus() -> Self {
        Self {
            mime_type: "audio/opus".to_string(),
            clock_rate: 48000,
            channels: 2,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
        }
    }

    /// VP8 at the standard 90kHz video clock
    pub fn vp8() -> Self {
        Self {
            mime_type: "video/VP8".to_string(),
            clock_rate: 90000,
            channels: 0,
            sdp_fmtp_line: String::new(),
        }
    }
}

/// One RTP packet, stripped of engine-specific types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub payload: Bytes,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub marker: bool,
    pub payload_type: u8,
}

/// A track received from the remote peer.
///
/// Cloning shares the upstream: only one clone may ever take the packet
/// receiver, which is what lets the relay guarantee a single upstream
/// subscription per track.
#[derive(Clone)]
pub struct InboundTrack {
    pub id: TrackId,
    pub kind: TrackKind,
    pub codec: CodecInfo,
    upstream: Arc<Mutex<Option<mpsc::Receiver<MediaPacket>>>>,
}

impl InboundTrack {
    pub fn new(
        id: impl Into<TrackId>,
        kind: TrackKind,
        codec: CodecInfo,
        upstream: mpsc::Receiver<MediaPacket>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            codec,
            upstream: Arc::new(Mutex::new(Some(upstream))),
        }
    }

    /// Take the upstream packet receiver. Returns `None` after the first call.
    pub fn take_upstream(&self) -> Option<mpsc::Receiver<MediaPacket>> {
        self.upstream.lock().take()
    }
}

impl fmt::Debug for InboundTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("codec", &self.codec.mime_type)
            .finish()
    }
}

/// Stream of packets feeding an outbound track
pub type PacketStream = Pin<Box<dyn Stream<Item = MediaPacket> + Send>>;

/// A track the session asks the engine to send to the remote peer
pub struct OutboundTrack {
    pub id: TrackId,
    /// Media stream label; carries the requested video transform, if any
    pub stream_label: String,
    pub kind: TrackKind,
    pub codec: CodecInfo,
    pub packets: PacketStream,
}

impl fmt::Debug for OutboundTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundTrack")
            .field("id", &self.id)
            .field("stream_label", &self.stream_label)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Everything the engine can report about a connection.
///
/// The session subscribes to these once, at construction.
#[derive(Debug)]
pub enum EngineEvent {
    /// Local ICE candidate gathered; `None` marks end of gathering
    IceCandidate(Option<IceCandidate>),
    ConnectionStateChanged(ConnectionState),
    Track(InboundTrack),
    TrackEnded { track_id: TrackId, kind: TrackKind },
    DataChannelOpened { label: String },
    DataChannelMessage { label: String, text: String },
}

/// A fresh engine connection plus the event stream it reports on
pub struct EngineBinding {
    pub connection: Box<dyn EngineConnection>,
    pub events: mpsc::Receiver<EngineEvent>,
}

/// Factory for engine connections; one per session
#[async_trait]
pub trait PeerEngine: Send + Sync {
    async fn connect(&self, session_id: &SessionId) -> Result<EngineBinding>;
}

/// One negotiated peer connection inside the engine
#[async_trait]
pub trait EngineConnection: Send + Sync {
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Current local description, including any candidates gathered so far
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Resolves once ICE gathering has finished
    async fn gathering_complete(&self);

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn add_track(&self, track: OutboundTrack) -> Result<()>;

    /// Send text on the data channel with the given label
    async fn send_text(&self, channel_label: &str, text: String) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ice_candidate_browser_shape() {
        let json = r#"{"candidate":"candidate:1 1 udp 2122260223 10.0.0.1 54321 typ host","sdpMid":"0","sdpMLineIndex":0,"usernameFragment":"abcd"}"#;
        let candidate: IceCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_mline_index, Some(0));
        assert_eq!(candidate.username_fragment.as_deref(), Some("abcd"));

        let value = serde_json::to_value(&candidate).unwrap();
        assert_eq!(value["sdpMLineIndex"], 0);
        assert_eq!(value["sdpMid"], "0");
    }

    #[test]
    fn test_ice_candidate_snake_case_aliases() {
        let json = r#"{"candidate":"candidate:2","sdp_mid":"1","sdp_mline_index":1}"#;
        let candidate: IceCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.sdp_mid.as_deref(), Some("1"));
        assert_eq!(candidate.sdp_mline_index, Some(1));
        assert_eq!(candidate.username_fragment, None);
    }

    #[test]
    fn test_inbound_track_upstream_taken_once() {
        let (_tx, rx) = mpsc::channel(4);
        let track = InboundTrack::new("t1", TrackKind::Audio, CodecInfo::opus(), rx);
        let clone = track.clone();
        assert!(track.take_upstream().is_some());
        assert!(clone.take_upstream().is_none());
    }
}
