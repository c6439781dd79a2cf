//! Per-client negotiation and lifecycle
//!
//! A [`PeerSession`] is owned by exactly one task. That task feeds it three
//! kinds of input: signaling messages from the client, [`EngineEvent`]s from
//! the engine, and the negotiation deadline. Nothing here is shared, so
//! nothing here is locked.

use super::registry::{SessionCommand, SessionHandle, SessionId, SessionRegistry};
use super::state::{Role, SessionState};
use crate::config::SignalingConfig;
use crate::engine::{
    CodecInfo, ConnectionState, EngineBinding, EngineConnection, EngineEvent, IceCandidate,
    InboundTrack, OutboundTrack, PacketStream, PeerEngine, SessionDescription, TrackId, TrackKind,
};
use crate::error::ProtocolError;
use crate::media::{
    ConsumerId, FileRecorderFactory, LocalMediaSource, MediaRelay, PacketFileSource, Recorder,
    RecorderFactory,
};
use crate::signaling::SignalingMessage;
use crate::{Error, Result};
use futures::StreamExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Span};

/// Queued control commands per session
const CONTROL_QUEUE: usize = 4;

/// Everything a new session needs from the process
#[derive(Clone)]
pub struct SessionContext {
    pub engine: Arc<dyn PeerEngine>,
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<SignalingConfig>,
    pub recorders: Option<Arc<dyn RecorderFactory>>,
    pub local_audio: Option<Arc<dyn LocalMediaSource>>,
}

impl SessionContext {
    /// Context for `config`, with file recording and local audio set up
    /// from `record_audio` and `local_audio` when they are given
    pub fn new(engine: Arc<dyn PeerEngine>, config: SignalingConfig) -> Self {
        let recorders = config.record_audio.as_ref().map(|path| {
            Arc::new(FileRecorderFactory::new(path)) as Arc<dyn RecorderFactory>
        });
        let local_audio = config
            .local_audio
            .as_ref()
            .map(|path| Arc::new(PacketFileSource::new(path)) as Arc<dyn LocalMediaSource>);

        Self {
            engine,
            registry: Arc::new(SessionRegistry::new()),
            config: Arc::new(config),
            recorders,
            local_audio,
        }
    }

    /// Record inbound audio of every session
    pub fn with_recorders(mut self, recorders: Arc<dyn RecorderFactory>) -> Self {
        self.recorders = Some(recorders);
        self
    }

    /// Local audio offered to one-shot sessions
    pub fn with_local_audio(mut self, source: Arc<dyn LocalMediaSource>) -> Self {
        self.local_audio = Some(source);
        self
    }
}

/// Where outbound audio comes from
#[derive(Clone)]
pub enum AudioSource {
    /// Relay the client's own audio back
    Echo,
    /// Play a local source instead of the echo
    Local(Arc<dyn LocalMediaSource>),
}

/// Outbound media of one session
#[derive(Clone)]
pub struct MediaPlan {
    pub audio: AudioSource,
    /// Label the echoed video carries
    pub video_transform: Option<String>,
}

impl MediaPlan {
    /// Echo audio and video
    pub fn echo() -> Self {
        Self {
            audio: AudioSource::Echo,
            video_transform: None,
        }
    }

    /// Local audio when available, echoed video tagged with `video_transform`
    pub fn one_shot(
        local_audio: Option<Arc<dyn LocalMediaSource>>,
        video_transform: Option<String>,
    ) -> Self {
        Self {
            audio: local_audio.map_or(AudioSource::Echo, AudioSource::Local),
            video_transform: video_transform.filter(|t| !t.is_empty()),
        }
    }
}

impl fmt::Debug for MediaPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let audio = match &self.audio {
            AudioSource::Echo => "echo".to_string(),
            AudioSource::Local(source) => format!("local:{}", source.label()),
        };
        f.debug_struct("MediaPlan")
            .field("audio", &audio)
            .field("video_transform", &self.video_transform)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSource {
    /// Track received from the peer
    Remote(TrackId),
    /// Local source, by label
    Local(String),
}

/// A track the session has wired up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackBinding {
    pub direction: TrackDirection,
    pub kind: TrackKind,
    pub source: TrackSource,
    /// Relay consumers attached to (inbound) or feeding (outbound) the track
    pub consumers: Vec<ConsumerId>,
}

/// Channels the owning task listens on
pub struct SessionIo {
    pub events: mpsc::Receiver<EngineEvent>,
    pub commands: mpsc::Receiver<SessionCommand>,
}

/// State machine for one client
pub struct PeerSession {
    id: SessionId,
    role: Role,
    state: SessionState,
    connection: Option<Arc<dyn EngineConnection>>,
    pending_candidates: VecDeque<IceCandidate>,
    bindings: Vec<TrackBinding>,
    relay: MediaRelay,
    plan: MediaPlan,
    /// Outbound tracks announced before their inbound source arrived
    slots: HashMap<TrackKind, oneshot::Sender<PacketStream>>,
    local_audio_sent: bool,
    recorder: Option<Arc<dyn Recorder>>,
    recorded_tracks: HashSet<TrackId>,
    registry: Arc<SessionRegistry>,
    connected: bool,
    negotiation_timeout: Duration,
    negotiation_deadline: Instant,
}

impl PeerSession {
    /// Connect a new engine peer, start the recorder if one is configured,
    /// and register the session.
    pub async fn create(
        ctx: &SessionContext,
        role: Role,
        plan: MediaPlan,
    ) -> Result<(Self, SessionIo)> {
        let id = SessionId::new();
        let EngineBinding { connection, events } = ctx.engine.connect(&id).await?;

        let recorder = match &ctx.recorders {
            Some(factory) => match start_recorder(factory.as_ref(), &id).await {
                Ok(recorder) => Some(recorder),
                Err(e) => {
                    warn!(session_id = %id, "Recording disabled for session: {}", e);
                    None
                }
            },
            None => None,
        };

        let (control, commands) = mpsc::channel(CONTROL_QUEUE);
        if let Err(e) = ctx
            .registry
            .add(SessionHandle::new(id.clone(), role, control))
        {
            let _ = connection.close().await;
            if let Some(recorder) = &recorder {
                let _ = recorder.stop().await;
            }
            return Err(e);
        }

        let negotiation_timeout = ctx.config.negotiation_timeout();
        info!(session_id = %id, role = %role, plan = ?plan, "Session created");

        let session = Self {
            id,
            role,
            state: SessionState::New,
            connection: Some(Arc::from(connection)),
            pending_candidates: VecDeque::new(),
            bindings: Vec::new(),
            relay: MediaRelay::new(ctx.config.relay_buffer_packets),
            plan,
            slots: HashMap::new(),
            local_audio_sent: false,
            recorder,
            recorded_tracks: HashSet::new(),
            registry: Arc::clone(&ctx.registry),
            connected: false,
            negotiation_timeout,
            negotiation_deadline: Instant::now() + negotiation_timeout,
        };
        Ok((session, SessionIo { events, commands }))
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Remote candidates waiting for the remote description
    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn bindings(&self) -> &[TrackBinding] {
        &self.bindings
    }

    pub fn relay(&self) -> &MediaRelay {
        &self.relay
    }

    /// Whether the engine connection is still held
    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    /// True until the engine reports `Connected` or the session ends
    pub fn awaiting_negotiation(&self) -> bool {
        !self.connected && !self.state.is_terminal()
    }

    pub fn negotiation_deadline(&self) -> Instant {
        self.negotiation_deadline
    }

    /// Span every log line of this session is recorded under
    pub fn span(&self) -> Span {
        info_span!("session", session_id = %self.id, role = %self.role)
    }

    fn connection(&self) -> Result<&dyn EngineConnection> {
        self.connection
            .as_deref()
            .ok_or_else(|| self.missing_connection())
    }

    fn missing_connection(&self) -> Error {
        Error::SessionError(format!("session {} has no engine connection", self.id))
    }

    fn timeout_error(&self) -> Error {
        Error::NegotiationTimeout(format!(
            "not connected after {}s",
            self.negotiation_timeout.as_secs()
        ))
    }

    fn transition(&mut self, next: SessionState) {
        if !self.state.can_transition(next) {
            warn!(from = %self.state, to = %next, "Rejected state transition");
            return;
        }
        debug!(from = %self.state, to = %next, "State transition");
        self.state = next;
    }

    /// Dispatch one client message; the result is the reply, if any.
    ///
    /// Protocol errors leave the session untouched. Negotiation errors are
    /// absorbed here: the session moves to `Failed` and no reply is sent.
    pub async fn handle_message(
        &mut self,
        message: SignalingMessage,
    ) -> std::result::Result<Option<SignalingMessage>, ProtocolError> {
        if self.state.is_terminal() {
            debug!(state = %self.state, "Ignoring {} on ended session", message.message_type());
            return Ok(None);
        }

        match message {
            SignalingMessage::Offer { sdp } => {
                if self.role != Role::Answerer {
                    return Err(ProtocolError::RoleMismatch {
                        message_type: "offer",
                        role: self.role.as_str(),
                    });
                }
                Ok(self
                    .accept_offer(sdp)
                    .await
                    .ok()
                    .map(|answer| SignalingMessage::Answer { sdp: answer.sdp }))
            }
            SignalingMessage::Answer { sdp } => {
                if self.role != Role::Offerer {
                    return Err(ProtocolError::RoleMismatch {
                        message_type: "answer",
                        role: self.role.as_str(),
                    });
                }
                if self.state != SessionState::HaveLocalOffer {
                    return Err(ProtocolError::UnexpectedState {
                        message_type: "answer",
                        state: self.state.as_str(),
                    });
                }
                self.accept_answer(sdp).await;
                Ok(None)
            }
            SignalingMessage::Candidate { candidate } => {
                self.add_remote_candidate(candidate).await;
                Ok(None)
            }
            SignalingMessage::Bye => {
                self.close("client said bye").await;
                Ok(None)
            }
        }
    }

    /// Run the answerer path for `sdp`.
    ///
    /// Either returns the applied answer with the session in
    /// `HaveLocalAnswer`, or returns the error with the session `Failed`.
    pub async fn accept_offer(&mut self, sdp: String) -> Result<SessionDescription> {
        let result = if self.state == SessionState::New {
            self.negotiate_answer(sdp).await
        } else {
            Err(Error::SdpError(format!(
                "offer received in state {}; renegotiation is not supported",
                self.state
            )))
        };
        if let Err(e) = &result {
            self.fail(e).await;
        }
        result
    }

    async fn negotiate_answer(&mut self, sdp: String) -> Result<SessionDescription> {
        let offered = offered_kinds(&sdp);

        self.connection()?
            .set_remote_description(SessionDescription::offer(sdp))
            .await?;
        self.transition(SessionState::HaveRemoteOffer);
        self.apply_pending_candidates().await;

        self.prepare_outbound(&offered).await;

        let answer = self.connection()?.create_answer().await?;
        self.connection()?
            .set_local_description(answer.clone())
            .await?;
        self.transition(SessionState::HaveLocalAnswer);

        info!("Answer created");
        Ok(answer)
    }

    /// Run the offerer path: announce outbound media, create and apply the
    /// offer. On error the session is `Failed`.
    pub async fn create_offer(&mut self) -> Result<SessionDescription> {
        let result = self.negotiate_offer().await;
        if let Err(e) = &result {
            self.fail(e).await;
        }
        result
    }

    async fn negotiate_offer(&mut self) -> Result<SessionDescription> {
        if self.role != Role::Offerer || self.state != SessionState::New {
            return Err(Error::SdpError(format!(
                "cannot create an offer as {} in state {}",
                self.role, self.state
            )));
        }

        self.prepare_outbound(&[TrackKind::Audio, TrackKind::Video])
            .await;

        let offer = self.connection()?.create_offer().await?;
        self.connection()?.set_local_description(offer.clone()).await?;
        self.transition(SessionState::HaveLocalOffer);

        info!("Offer created");
        Ok(offer)
    }

    async fn accept_answer(&mut self, sdp: String) {
        let applied = match self.connection() {
            Ok(connection) => {
                connection
                    .set_remote_description(SessionDescription::answer(sdp))
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = applied {
            self.fail(&e).await;
            return;
        }
        self.transition(SessionState::HaveRemoteAnswer);
        self.apply_pending_candidates().await;
        info!("Answer applied");
    }

    async fn add_remote_candidate(&mut self, candidate: Option<IceCandidate>) {
        let Some(candidate) = candidate.filter(|c| !c.candidate.is_empty()) else {
            debug!("Remote end of candidates");
            return;
        };

        if self.state.has_remote_description() {
            self.apply_candidate(candidate).await;
        } else {
            self.pending_candidates.push_back(candidate);
            debug!(queued = self.pending_candidates.len(), "Candidate queued");
        }
    }

    async fn apply_pending_candidates(&mut self) {
        if !self.pending_candidates.is_empty() {
            debug!(count = self.pending_candidates.len(), "Applying queued candidates");
        }
        while let Some(candidate) = self.pending_candidates.pop_front() {
            self.apply_candidate(candidate).await;
        }
    }

    async fn apply_candidate(&self, candidate: IceCandidate) {
        let applied = match self.connection() {
            Ok(connection) => connection.add_ice_candidate(candidate).await,
            Err(e) => Err(e),
        };
        if let Err(e) = applied {
            warn!("Failed to apply remote candidate: {}", e);
        }
    }

    /// Add outbound tracks for `kinds` before the description is created,
    /// so they appear in it. Echoed tracks start as empty slots that are
    /// filled when the matching inbound track arrives.
    async fn prepare_outbound(&mut self, kinds: &[TrackKind]) {
        for &kind in kinds {
            let result = match (kind, &self.plan.audio) {
                (TrackKind::Audio, AudioSource::Local(source)) => {
                    let source = Arc::clone(source);
                    self.send_local(source).await
                }
                _ => self.open_slot(kind).await,
            };
            if let Err(e) = result {
                warn!(kind = %kind, "Failed to prepare outbound track: {}", e);
            }
        }
    }

    async fn open_slot(&mut self, kind: TrackKind) -> Result<()> {
        if self.slots.contains_key(&kind) {
            return Ok(());
        }

        let (feed, ready) = oneshot::channel::<PacketStream>();
        let packets: PacketStream = Box::pin(
            futures::stream::once(ready)
                .filter_map(|stream| futures::future::ready(stream.ok()))
                .flatten(),
        );
        let codec = match kind {
            TrackKind::Audio => CodecInfo::opus(),
            TrackKind::Video => CodecInfo::vp8(),
        };
        self.connection()?
            .add_track(OutboundTrack {
                id: format!("{}-echo", kind),
                stream_label: self.stream_label(kind),
                kind,
                codec,
                packets,
            })
            .await?;
        self.slots.insert(kind, feed);
        Ok(())
    }

    async fn send_local(&mut self, source: Arc<dyn LocalMediaSource>) -> Result<()> {
        if self.local_audio_sent {
            return Ok(());
        }

        let packets = source.open().await?;
        self.connection()?
            .add_track(OutboundTrack {
                id: source.label().to_string(),
                stream_label: self.id.to_string(),
                kind: source.kind(),
                codec: source.codec(),
                packets,
            })
            .await?;
        self.local_audio_sent = true;
        self.bindings.push(TrackBinding {
            direction: TrackDirection::Outbound,
            kind: source.kind(),
            source: TrackSource::Local(source.label().to_string()),
            consumers: Vec::new(),
        });
        info!(source = source.label(), "Sending local media");
        Ok(())
    }

    fn stream_label(&self, kind: TrackKind) -> String {
        match (kind, &self.plan.video_transform) {
            (TrackKind::Video, Some(transform)) => transform.clone(),
            _ => self.id.to_string(),
        }
    }

    /// Handle one engine event; the result is a message for the client, if
    /// any.
    pub async fn handle_event(&mut self, event: EngineEvent) -> Option<SignalingMessage> {
        if self.state.is_terminal() {
            debug!(?event, "Ignoring engine event on ended session");
            return None;
        }

        match event {
            EngineEvent::IceCandidate(Some(candidate)) => {
                return Some(SignalingMessage::candidate(candidate));
            }
            EngineEvent::IceCandidate(None) => debug!("Local ICE gathering complete"),
            EngineEvent::ConnectionStateChanged(state) => self.on_connection_state(state).await,
            EngineEvent::Track(track) => self.bind_track(track).await,
            EngineEvent::TrackEnded { track_id, kind } => self.unbind_track(&track_id, kind).await,
            EngineEvent::DataChannelOpened { label } => debug!(label = %label, "Data channel opened"),
            EngineEvent::DataChannelMessage { label, text } => {
                self.on_channel_message(&label, &text).await
            }
        }
        None
    }

    async fn on_connection_state(&mut self, state: ConnectionState) {
        info!(connection_state = ?state, "Engine connection state changed");
        match state {
            ConnectionState::Connected => self.connected = true,
            ConnectionState::Failed => {
                self.fail(&Error::TransportError(
                    "engine reported connection failure".to_string(),
                ))
                .await
            }
            ConnectionState::Disconnected | ConnectionState::Closed => {
                self.close("engine connection closed").await
            }
            ConnectionState::New | ConnectionState::Connecting => {}
        }
    }

    async fn bind_track(&mut self, track: InboundTrack) {
        info!(track_id = %track.id, kind = %track.kind, codec = %track.codec.mime_type, "Inbound track");
        let mut consumers = Vec::new();

        match (track.kind, &self.plan.audio) {
            (TrackKind::Audio, AudioSource::Local(source)) => {
                let source = Arc::clone(source);
                if let Err(e) = self.send_local(source).await {
                    warn!("Failed to send local audio: {}", e);
                }
            }
            _ => match self.echo(&track).await {
                Ok(consumer) => consumers.push(consumer),
                Err(e) => warn!(track_id = %track.id, "Failed to echo track: {}", e),
            },
        }

        if track.kind == TrackKind::Audio {
            if let Some(recorder) = self.recorder.clone() {
                let recorded = match self.relay.subscribe(&track) {
                    Ok(consumer) => {
                        let consumer_id = consumer.id();
                        recorder.add_track(consumer).await.map(|_| consumer_id)
                    }
                    Err(e) => Err(e),
                };
                match recorded {
                    Ok(consumer_id) => {
                        consumers.push(consumer_id);
                        self.recorded_tracks.insert(track.id.clone());
                    }
                    Err(e) => warn!(track_id = %track.id, "Failed to record track: {}", e),
                }
            }
        }

        self.bindings.push(TrackBinding {
            direction: TrackDirection::Inbound,
            kind: track.kind,
            source: TrackSource::Remote(track.id.clone()),
            consumers,
        });
    }

    /// Route `track` back to the peer, through an open slot if the
    /// description already announced one
    async fn echo(&mut self, track: &InboundTrack) -> Result<ConsumerId> {
        let consumer = self.relay.subscribe(track)?;
        let consumer_id = consumer.id();

        match self.slots.remove(&track.kind) {
            Some(feed) => {
                if feed.send(consumer.into_stream()).is_err() {
                    return Err(Error::MediaTrackError(format!(
                        "outbound {} track is gone",
                        track.kind
                    )));
                }
            }
            None => {
                self.connection()?
                    .add_track(OutboundTrack {
                        id: format!("echo-{}", track.id),
                        stream_label: self.stream_label(track.kind),
                        kind: track.kind,
                        codec: track.codec.clone(),
                        packets: consumer.into_stream(),
                    })
                    .await?;
            }
        }

        self.bindings.push(TrackBinding {
            direction: TrackDirection::Outbound,
            kind: track.kind,
            source: TrackSource::Remote(track.id.clone()),
            consumers: vec![consumer_id],
        });
        Ok(consumer_id)
    }

    async fn unbind_track(&mut self, track_id: &str, kind: TrackKind) {
        info!(track_id = %track_id, kind = %kind, "Inbound track ended");
        self.relay.release(track_id);
        self.bindings
            .retain(|b| !matches!(&b.source, TrackSource::Remote(id) if id == track_id));

        // The recorder is shared by every audio track of the session
        if self.recorded_tracks.remove(track_id) && self.recorded_tracks.is_empty() {
            if let Some(recorder) = &self.recorder {
                if let Err(e) = recorder.stop().await {
                    warn!("Failed to stop recorder: {}", e);
                }
            }
        }
    }

    async fn on_channel_message(&self, label: &str, text: &str) {
        let Some(rest) = text.strip_prefix("ping") else {
            debug!(label = %label, "Data channel message");
            return;
        };
        let sent = match self.connection() {
            Ok(connection) => connection.send_text(label, format!("pong{}", rest)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!(label = %label, "Failed to answer ping: {}", e);
        }
    }

    /// Fail the session if it is still waiting for the engine to connect
    pub async fn negotiation_timed_out(&mut self) {
        if !self.awaiting_negotiation() {
            return;
        }
        let error = self.timeout_error();
        self.fail(&error).await;
    }

    /// Final local description, once ICE gathering has finished.
    ///
    /// Engine events and control commands are served while gathering runs
    /// and the negotiation deadline still applies. If any of them ends the
    /// session, the session is already terminal when the error is returned.
    pub async fn gathered_local_description(
        &mut self,
        io: &mut SessionIo,
    ) -> Result<SessionDescription> {
        let connection = match &self.connection {
            Some(connection) => Arc::clone(connection),
            None => return Err(self.missing_connection()),
        };
        let gathered = connection.gathering_complete();
        tokio::pin!(gathered);

        let mut events_open = true;
        let mut commands_open = true;
        loop {
            tokio::select! {
                _ = &mut gathered => break,

                event = io.events.recv(), if events_open => match event {
                    // Local candidates end up in the description itself
                    Some(event) => {
                        self.handle_event(event).await;
                    }
                    None => events_open = false,
                },

                command = io.commands.recv(), if commands_open => match command {
                    Some(SessionCommand::Close { done }) => {
                        self.close("server shutting down").await;
                        let _ = done.send(());
                    }
                    None => commands_open = false,
                },

                _ = tokio::time::sleep_until(self.negotiation_deadline),
                    if self.awaiting_negotiation() =>
                {
                    let error = self.timeout_error();
                    self.fail(&error).await;
                    return Err(error);
                }
            }

            if self.state.is_terminal() {
                return Err(Error::SessionError(format!(
                    "session ended during ICE gathering ({})",
                    self.state
                )));
            }
        }

        connection
            .local_description()
            .await
            .ok_or_else(|| Error::SdpError("no local description after gathering".to_string()))
    }

    /// Move to `Failed` and clean up. No-op on an ended session.
    pub async fn fail(&mut self, error: &Error) {
        if self.state.is_terminal() {
            return;
        }
        warn!(state = %self.state, "Session failed: {}", error);
        self.transition(SessionState::Failed);
        self.cleanup().await;
    }

    /// Move to `Closed` and clean up. No-op on an ended session.
    pub async fn close(&mut self, reason: &str) {
        if self.state.is_terminal() {
            return;
        }
        info!(state = %self.state, reason, "Session closed");
        self.transition(SessionState::Closed);
        self.cleanup().await;
    }

    async fn cleanup(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                warn!("Failed to close engine connection: {}", e);
            }
        }

        self.pending_candidates.clear();
        self.slots.clear();

        for binding in self.bindings.drain(..) {
            if let (TrackDirection::Inbound, TrackSource::Remote(track_id)) =
                (binding.direction, &binding.source)
            {
                self.relay.release(track_id);
            }
        }
        self.recorded_tracks.clear();

        if let Some(recorder) = &self.recorder {
            if let Err(e) = recorder.stop().await {
                warn!("Failed to stop recorder: {}", e);
            }
        }

        self.registry.remove(&self.id);
    }
}

async fn start_recorder(
    factory: &dyn RecorderFactory,
    session_id: &SessionId,
) -> Result<Arc<dyn Recorder>> {
    let recorder = factory.create(session_id)?;
    recorder.start().await?;
    Ok(recorder)
}

/// Media kinds with an `m=` section in `sdp`, first occurrence only
fn offered_kinds(sdp: &str) -> Vec<TrackKind> {
    let mut kinds = Vec::new();
    for line in sdp.lines() {
        let kind = if line.starts_with("m=audio") {
            TrackKind::Audio
        } else if line.starts_with("m=video") {
            TrackKind::Video
        } else {
            continue;
        };
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    kinds
}
