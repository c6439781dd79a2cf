//! [`PeerEngine`] implemented on webrtc-rs
//!
//! This is the only module that touches the `webrtc` crate. Every callback
//! registered here does one thing: translate the library's notification into
//! an [`EngineEvent`] and push it to the owning session.

use super::{
    CodecInfo, ConnectionState, EngineBinding, EngineConnection, EngineEvent, IceCandidate,
    InboundTrack, MediaPacket, OutboundTrack, PeerEngine, SdpType, SessionDescription, TrackKind,
};
use crate::config::SignalingConfig;
use crate::session::SessionId;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp::header::Header;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

/// Engine events buffered per connection
const EVENT_QUEUE: usize = 64;

/// RTP packets buffered between `read_rtp` and the relay pump
const INBOUND_PACKET_QUEUE: usize = 256;

/// Data channels by label, filled as the remote side opens them
type DataChannels = Arc<Mutex<HashMap<String, Arc<RTCDataChannel>>>>;

/// Engine backed by a single shared webrtc-rs `API`
pub struct WebRtcEngine {
    api: API,
    rtc_config: RTCConfiguration,
}

impl WebRtcEngine {
    /// Build the webrtc-rs API with default codecs and interceptors
    pub fn new(config: &SignalingConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| Error::WebRtcError(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| RTCIceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            }))
            .collect();

        info!(
            stun_servers = config.stun_servers.len(),
            turn_servers = config.turn_servers.len(),
            "WebRTC engine initialized"
        );

        Ok(Self {
            api,
            rtc_config: RTCConfiguration {
                ice_servers,
                ..Default::default()
            },
        })
    }
}

#[async_trait]
impl PeerEngine for WebRtcEngine {
    async fn connect(&self, session_id: &SessionId) -> Result<EngineBinding> {
        let pc = Arc::new(
            self.api
                .new_peer_connection(self.rtc_config.clone())
                .await
                .map_err(|e| Error::WebRtcError(format!("Failed to create peer connection: {}", e)))?,
        );

        let (events_tx, events) = mpsc::channel(EVENT_QUEUE);
        let data_channels: DataChannels = Arc::new(Mutex::new(HashMap::new()));

        forward_ice_candidates(&pc, events_tx.clone());
        forward_connection_state(&pc, events_tx.clone());
        forward_tracks(&pc, events_tx.clone());
        forward_data_channels(&pc, events_tx, Arc::clone(&data_channels));

        debug!(session_id = %session_id, "Peer connection created");

        Ok(EngineBinding {
            connection: Box::new(WebRtcConnection { pc, data_channels }),
            events,
        })
    }
}

fn forward_ice_candidates(pc: &RTCPeerConnection, tx: mpsc::Sender<EngineEvent>) {
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let tx = tx.clone();
        Box::pin(async move {
            let candidate = match candidate {
                Some(candidate) => match candidate.to_json() {
                    Ok(init) => Some(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                        username_fragment: init.username_fragment,
                    }),
                    Err(e) => {
                        warn!("Failed to convert ICE candidate to JSON: {}", e);
                        return;
                    }
                },
                None => None,
            };
            let _ = tx.send(EngineEvent::IceCandidate(candidate)).await;
        })
    }));
}

fn forward_connection_state(pc: &RTCPeerConnection, tx: mpsc::Sender<EngineEvent>) {
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let tx = tx.clone();
        Box::pin(async move {
            let state = match state {
                RTCPeerConnectionState::New => ConnectionState::New,
                RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
                RTCPeerConnectionState::Connected => ConnectionState::Connected,
                RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
                RTCPeerConnectionState::Failed => ConnectionState::Failed,
                RTCPeerConnectionState::Closed => ConnectionState::Closed,
                _ => return,
            };
            let _ = tx.send(EngineEvent::ConnectionStateChanged(state)).await;
        })
    }));
}

fn forward_tracks(pc: &RTCPeerConnection, tx: mpsc::Sender<EngineEvent>) {
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let tx = tx.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    _ => return,
                };
                let capability = track.codec().capability;
                let codec = CodecInfo {
                    mime_type: capability.mime_type,
                    clock_rate: capability.clock_rate,
                    channels: capability.channels,
                    sdp_fmtp_line: capability.sdp_fmtp_line,
                };
                let track_id = track.id();

                let (packet_tx, packet_rx) = mpsc::channel(INBOUND_PACKET_QUEUE);
                let inbound = InboundTrack::new(track_id.clone(), kind, codec, packet_rx);
                if tx.send(EngineEvent::Track(inbound)).await.is_err() {
                    return;
                }

                tokio::spawn(async move {
                    while let Ok((packet, _)) = track.read_rtp().await {
                        let packet = MediaPacket {
                            sequence_number: packet.header.sequence_number,
                            timestamp: packet.header.timestamp,
                            marker: packet.header.marker,
                            payload_type: packet.header.payload_type,
                            payload: packet.payload,
                        };
                        if packet_tx.send(packet).await.is_err() {
                            break;
                        }
                    }
                    let _ = tx.send(EngineEvent::TrackEnded { track_id, kind }).await;
                });
            })
        },
    ));
}

fn forward_data_channels(
    pc: &RTCPeerConnection,
    tx: mpsc::Sender<EngineEvent>,
    channels: DataChannels,
) {
    pc.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
        let tx = tx.clone();
        let channels = Arc::clone(&channels);
        Box::pin(async move {
            let label = channel.label().to_string();
            channels.lock().insert(label.clone(), Arc::clone(&channel));
            let _ = tx
                .send(EngineEvent::DataChannelOpened {
                    label: label.clone(),
                })
                .await;

            channel.on_message(Box::new(move |message: DataChannelMessage| {
                let tx = tx.clone();
                let label = label.clone();
                Box::pin(async move {
                    if !message.is_string {
                        return;
                    }
                    match String::from_utf8(message.data.to_vec()) {
                        Ok(text) => {
                            let _ = tx
                                .send(EngineEvent::DataChannelMessage { label, text })
                                .await;
                        }
                        Err(_) => debug!("Dropping non-UTF-8 text on data channel {}", label),
                    }
                })
            }));
        })
    }));
}

/// One webrtc-rs peer connection
struct WebRtcConnection {
    pc: Arc<RTCPeerConnection>,
    data_channels: DataChannels,
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
    let converted = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
    };
    converted.map_err(|e| Error::SdpError(format!("Invalid SDP: {}", e)))
}

fn from_rtc(description: RTCSessionDescription) -> Result<SessionDescription> {
    match description.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(description.sdp)),
        RTCSdpType::Answer | RTCSdpType::Pranswer => Ok(SessionDescription::answer(description.sdp)),
        other => Err(Error::SdpError(format!(
            "Unsupported description type: {}",
            other
        ))),
    }
}

#[async_trait]
impl EngineConnection for WebRtcConnection {
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.pc
            .set_remote_description(to_rtc(description)?)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.pc
            .set_local_description(to_rtc(description)?)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        // An offer without transceivers carries no media sections.
        if self.pc.get_transceivers().await.is_empty() {
            for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
                self.pc
                    .add_transceiver_from_kind(kind, None)
                    .await
                    .map_err(|e| Error::SdpError(format!("Failed to add transceiver: {}", e)))?;
            }
        }

        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;
        from_rtc(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;
        from_rtc(answer)
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let description = self.pc.local_description().await?;
        from_rtc(description).ok()
    }

    async fn gathering_complete(&self) {
        let mut done = self.pc.gathering_complete_promise().await;
        let _ = done.recv().await;
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn add_track(&self, track: OutboundTrack) -> Result<()> {
        let local = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: track.codec.mime_type.clone(),
                clock_rate: track.codec.clock_rate,
                channels: track.codec.channels,
                sdp_fmtp_line: track.codec.sdp_fmtp_line.clone(),
                rtcp_feedback: vec![],
            },
            track.id.clone(),
            track.stream_label.clone(),
        ));

        let sender = self
            .pc
            .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to add track: {}", e)))?;

        // Interceptors only run while RTCP is read off the sender.
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        let track_id = track.id;
        let mut packets = track.packets;
        tokio::spawn(async move {
            while let Some(packet) = packets.next().await {
                let packet = Packet {
                    header: Header {
                        version: 2,
                        marker: packet.marker,
                        payload_type: packet.payload_type,
                        sequence_number: packet.sequence_number,
                        timestamp: packet.timestamp,
                        ..Default::default()
                    },
                    payload: packet.payload,
                };
                if let Err(e) = local.write_rtp(&packet).await {
                    debug!("Outbound track {} stopped: {}", track_id, e);
                    break;
                }
            }
        });

        Ok(())
    }

    async fn send_text(&self, channel_label: &str, text: String) -> Result<()> {
        let channel = self.data_channels.lock().get(channel_label).cloned();
        let channel = channel.ok_or_else(|| {
            Error::WebRtcError(format!("No data channel labelled {}", channel_label))
        })?;
        channel
            .send_text(text)
            .await
            .map(|_| ())
            .map_err(|e| Error::WebRtcError(format!("Data channel send failed: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        self.data_channels.lock().clear();
        self.pc
            .close()
            .await
            .map_err(|e| Error::WebRtcError(format!("Failed to close peer connection: {}", e)))
    }
}
