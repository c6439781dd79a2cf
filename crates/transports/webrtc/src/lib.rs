//! WebRTC signaling and session-lifecycle core
//!
//! One state machine per connecting client. The crate mediates SDP
//! offer/answer and ICE candidate exchange over a duplex text channel, owns
//! fan-out of received tracks (echo, local playback, recording), and closes
//! everything down cleanly on failure or shutdown.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Transport (WebSocket / HTTP)                            │
//! │  ↓ text in                      ↑ text out (mpsc)        │
//! │  SignalingAdapter  (one task per channel)                │
//! │  └─ PeerSession    (state machine, owned by the task)    │
//! │     ├─ EngineConnection  ← EngineEvent (mpsc)            │
//! │     ├─ MediaRelay        (broadcast per inbound track)   │
//! │     └─ Recorder          (optional)                      │
//! │  SessionRegistry   (handles only)                        │
//! │  ShutdownCoordinator                                     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use peerlink_webrtc::SignalingConfig;
//!
//! let config = SignalingConfig {
//!     negotiation_timeout_secs: 15,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Serving a channel
//!
//! ```no_run
//! use peerlink_webrtc::{
//!     Role, SessionContext, SignalingAdapter, SignalingConfig, WebRtcEngine,
//! };
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> peerlink_webrtc::Result<()> {
//! let config = SignalingConfig::default();
//! let engine = Arc::new(WebRtcEngine::new(&config)?);
//! let adapter = SignalingAdapter::new(SessionContext::new(engine, config));
//!
//! let (outbound, _replies) = mpsc::channel(128);
//! let inbound = futures::stream::iter(vec![Ok(r#"{"type":"bye"}"#.to_string())]);
//! adapter.run(Role::Answerer, inbound, outbound).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod media;
pub mod session;
pub mod signaling;

pub use config::{SignalingConfig, TlsConfig, TurnServerConfig};
pub use engine::{
    ConnectionState, EngineConnection, EngineEvent, IceCandidate, PeerEngine,
    SessionDescription, TrackKind, WebRtcEngine,
};
pub use error::{Error, ErrorKind, ProtocolError, Result};
pub use media::{
    FileRecorderFactory, LocalMediaSource, MediaRelay, PacketFileSource, Recorder,
    RecorderFactory,
};
pub use session::{
    PeerSession, Role, SessionContext, SessionHandle, SessionId, SessionRegistry, SessionState,
    ShutdownCoordinator,
};
pub use signaling::{OfferRequest, OfferResponse, OneShotOffer, SignalingAdapter, SignalingMessage};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
