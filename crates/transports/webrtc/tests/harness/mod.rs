//! In-memory test harness
//!
//! `MockEngine` stands in for the WebRTC stack: every connection records the
//! calls made on it, can be told to fail specific calls, and exposes the
//! event sender so tests can play the engine's side.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use peerlink_webrtc::engine::{
    CodecInfo, EngineBinding, EngineConnection, EngineEvent, IceCandidate, InboundTrack,
    MediaPacket, OutboundTrack, PacketStream, PeerEngine, SessionDescription, TrackKind,
};
use peerlink_webrtc::media::{LocalMediaSource, Recorder, RecorderFactory, TrackConsumer};
use peerlink_webrtc::session::SessionId;
use peerlink_webrtc::{Error, Result, SessionContext, SignalingConfig};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const OFFER_SDP: &str = "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";
pub const OFFER_WITH_MEDIA_SDP: &str = "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=mid:0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:1\r\n";
pub const ANSWER_SDP: &str = "v=0\r\na=mock-answer\r\n";
pub const MOCK_OFFER_SDP: &str = "v=0\r\na=mock-offer\r\n";
/// Appended to the local description once "gathering" has finished
pub const GATHERED: &str = "a=end-of-candidates\r\n";

/// Initialize tracing for tests (call once per test)
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug,webrtc=warn")
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Mock engine
// =============================================================================

/// One recorded engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetRemote(SessionDescription),
    SetLocal(SessionDescription),
    CreateOffer,
    CreateAnswer,
    AddCandidate(String),
    AddTrack {
        id: String,
        kind: TrackKind,
        stream_label: String,
    },
    SendText {
        label: String,
        text: String,
    },
    Close,
}

/// Which engine calls fail
#[derive(Debug, Clone, Default)]
pub struct Failures {
    pub connect: bool,
    pub set_remote: bool,
    pub set_local: bool,
    pub create_answer: bool,
    pub add_candidate: bool,
    /// ICE gathering never finishes
    pub stall_gathering: bool,
}

/// Test-side view of one engine connection
#[derive(Clone)]
pub struct MockPeer {
    pub session_id: SessionId,
    calls: Arc<Mutex<Vec<Call>>>,
    outbound: Arc<Mutex<Vec<OutboundTrack>>>,
    events: mpsc::Sender<EngineEvent>,
}

impl MockPeer {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn close_count(&self) -> usize {
        self.count(&Call::Close)
    }

    pub fn applied_candidates(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::AddCandidate(candidate) => Some(candidate.clone()),
                _ => None,
            })
            .collect()
    }

    /// Position of the first call matching `pred`
    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.lock().iter().position(pred)
    }

    /// Play an engine event into the session
    pub async fn emit(&self, event: EngineEvent) {
        self.events
            .send(event)
            .await
            .expect("session stopped listening to engine events");
    }

    /// Announce an inbound track; returns the upstream packet sender
    pub async fn add_inbound_track(&self, id: &str, kind: TrackKind) -> mpsc::Sender<MediaPacket> {
        let (tx, rx) = mpsc::channel(64);
        let codec = match kind {
            TrackKind::Audio => CodecInfo::opus(),
            TrackKind::Video => CodecInfo::vp8(),
        };
        self.emit(EngineEvent::Track(InboundTrack::new(id, kind, codec, rx)))
            .await;
        tx
    }

    /// Outbound tracks the session has added so far
    pub fn take_outbound(&self) -> Vec<OutboundTrack> {
        std::mem::take(&mut *self.outbound.lock())
    }
}

#[derive(Default)]
struct EngineState {
    failures: Failures,
    peers: Vec<MockPeer>,
}

/// Scripted engine; clones share state
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<EngineState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(failures: Failures) -> Self {
        let engine = Self::new();
        engine.state.lock().failures = failures;
        engine
    }

    pub fn peers(&self) -> Vec<MockPeer> {
        self.state.lock().peers.clone()
    }

    pub fn peer_count(&self) -> usize {
        self.state.lock().peers.len()
    }

    pub fn last_peer(&self) -> MockPeer {
        self.state
            .lock()
            .peers
            .last()
            .cloned()
            .expect("no connection created yet")
    }
}

#[async_trait]
impl PeerEngine for MockEngine {
    async fn connect(&self, session_id: &SessionId) -> Result<EngineBinding> {
        let mut state = self.state.lock();
        if state.failures.connect {
            return Err(Error::WebRtcError("mock connect failure".to_string()));
        }

        let (events_tx, events) = mpsc::channel(64);
        let peer = MockPeer {
            session_id: session_id.clone(),
            calls: Arc::new(Mutex::new(Vec::new())),
            outbound: Arc::new(Mutex::new(Vec::new())),
            events: events_tx,
        };
        let connection = MockConnection {
            calls: Arc::clone(&peer.calls),
            outbound: Arc::clone(&peer.outbound),
            failures: state.failures.clone(),
            local: Mutex::new(None),
        };
        state.peers.push(peer);

        Ok(EngineBinding {
            connection: Box::new(connection),
            events,
        })
    }
}

struct MockConnection {
    calls: Arc<Mutex<Vec<Call>>>,
    outbound: Arc<Mutex<Vec<OutboundTrack>>>,
    failures: Failures,
    local: Mutex<Option<SessionDescription>>,
}

impl MockConnection {
    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl EngineConnection for MockConnection {
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.record(Call::SetRemote(description));
        if self.failures.set_remote {
            return Err(Error::SdpError("mock rejects remote description".to_string()));
        }
        Ok(())
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.record(Call::SetLocal(description.clone()));
        if self.failures.set_local {
            return Err(Error::SdpError("mock rejects local description".to_string()));
        }
        *self.local.lock() = Some(description);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.record(Call::CreateOffer);
        Ok(SessionDescription::offer(MOCK_OFFER_SDP))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record(Call::CreateAnswer);
        if self.failures.create_answer {
            return Err(Error::SdpError("mock cannot answer".to_string()));
        }
        Ok(SessionDescription::answer(ANSWER_SDP))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone().map(|mut description| {
            description.sdp.push_str(GATHERED);
            description
        })
    }

    async fn gathering_complete(&self) {
        if self.failures.stall_gathering {
            futures::future::pending::<()>().await;
        }
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.record(Call::AddCandidate(candidate.candidate));
        if self.failures.add_candidate {
            return Err(Error::IceCandidateError("mock rejects candidate".to_string()));
        }
        Ok(())
    }

    async fn add_track(&self, track: OutboundTrack) -> Result<()> {
        self.record(Call::AddTrack {
            id: track.id.clone(),
            kind: track.kind,
            stream_label: track.stream_label.clone(),
        });
        self.outbound.lock().push(track);
        Ok(())
    }

    async fn send_text(&self, channel_label: &str, text: String) -> Result<()> {
        self.record(Call::SendText {
            label: channel_label.to_string(),
            text,
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(Call::Close);
        Ok(())
    }
}

// =============================================================================
// Mock recorder and local source
// =============================================================================

#[derive(Default)]
pub struct MockRecorder {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    /// Consumers handed to the recorder, kept attached to the relay
    pub consumers: Mutex<Vec<TrackConsumer>>,
}

impl MockRecorder {
    pub fn track_ids(&self) -> Vec<String> {
        self.consumers
            .lock()
            .iter()
            .map(|c| c.track_id().to_string())
            .collect()
    }
}

#[async_trait]
impl Recorder for MockRecorder {
    async fn start(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn add_track(&self, consumer: TrackConsumer) -> Result<()> {
        self.consumers.lock().push(consumer);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockRecorderFactory {
    recorders: Arc<Mutex<Vec<Arc<MockRecorder>>>>,
}

impl MockRecorderFactory {
    pub fn last(&self) -> Arc<MockRecorder> {
        self.recorders
            .lock()
            .last()
            .cloned()
            .expect("no recorder created yet")
    }
}

impl RecorderFactory for MockRecorderFactory {
    fn create(&self, _session_id: &SessionId) -> Result<Arc<dyn Recorder>> {
        let recorder = Arc::new(MockRecorder::default());
        self.recorders.lock().push(Arc::clone(&recorder));
        Ok(recorder)
    }
}

/// Local audio made of `count` numbered packets
pub struct MockSource {
    pub label: String,
    pub count: u16,
}

#[async_trait]
impl LocalMediaSource for MockSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn codec(&self) -> CodecInfo {
        CodecInfo::opus()
    }

    async fn open(&self) -> Result<PacketStream> {
        Ok(Box::pin(futures::stream::iter((0..self.count).map(packet))))
    }
}

pub fn packet(seq: u16) -> MediaPacket {
    MediaPacket {
        payload: Bytes::from(vec![0xAB; 8]),
        sequence_number: seq,
        timestamp: seq as u32 * 960,
        marker: false,
        payload_type: 111,
    }
}

/// Read `count` packets from an outbound track
pub async fn read_packets(track: &mut OutboundTrack, count: usize) -> Vec<u16> {
    let mut seqs = Vec::new();
    while seqs.len() < count {
        match tokio::time::timeout(Duration::from_secs(5), track.packets.next()).await {
            Ok(Some(packet)) => seqs.push(packet.sequence_number),
            Ok(None) => break,
            Err(_) => panic!("timed out waiting for packets on {}", track.id),
        }
    }
    seqs
}

// =============================================================================
// Context and channel helpers
// =============================================================================

pub fn context(engine: &MockEngine) -> SessionContext {
    context_with(engine, SignalingConfig::default())
}

pub fn context_with(engine: &MockEngine, config: SignalingConfig) -> SessionContext {
    SessionContext::new(Arc::new(engine.clone()), config)
}

/// Client end of an in-memory signaling channel
pub struct TestChannel {
    inbound: Option<mpsc::UnboundedSender<Result<String>>>,
    outbound: mpsc::Receiver<String>,
}

/// Transport end handed to the adapter
pub struct TransportEnd {
    pub inbound: UnboundedReceiverStream<Result<String>>,
    pub outbound: mpsc::Sender<String>,
}

pub fn channel() -> (TestChannel, TransportEnd) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::channel(64);
    (
        TestChannel {
            inbound: Some(in_tx),
            outbound: out_rx,
        },
        TransportEnd {
            inbound: UnboundedReceiverStream::new(in_rx),
            outbound: out_tx,
        },
    )
}

impl TestChannel {
    pub fn send(&self, message: Value) {
        self.send_text(&message.to_string());
    }

    pub fn send_text(&self, text: &str) {
        self.inbound
            .as_ref()
            .expect("channel already closed")
            .send(Ok(text.to_string()))
            .expect("adapter stopped reading");
    }

    /// Simulate a transport error
    pub fn fail(&self, reason: &str) {
        let _ = self
            .inbound
            .as_ref()
            .expect("channel already closed")
            .send(Err(Error::TransportError(reason.to_string())));
    }

    /// Close the client side; the adapter sees end of stream
    pub fn close(&mut self) {
        self.inbound = None;
    }

    /// Next server message (real-time tests only)
    pub async fn recv(&mut self) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(5), self.outbound.recv())
            .await
            .expect("timed out waiting for a server message")
            .expect("server closed the channel");
        serde_json::from_str(&text).expect("server sent invalid JSON")
    }

    /// Server message if one is already queued
    pub fn try_recv(&mut self) -> Option<Value> {
        self.outbound
            .try_recv()
            .ok()
            .map(|text| serde_json::from_str(&text).expect("server sent invalid JSON"))
    }
}

/// Yield until `cond` holds
pub async fn wait_for(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never held: {}", what);
}

/// Let spawned tasks run until they block
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
