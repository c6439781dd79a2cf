//! Fan-out of inbound tracks to multiple consumers
//!
//! The first `subscribe` for a track takes the track's single upstream
//! receiver and spawns one pump task that copies packets into a broadcast
//! buffer. Every consumer is a broadcast receiver with its own cursor, so a
//! slow consumer only ever hurts itself: it skips ahead and logs how much it
//! lost.

use crate::engine::{CodecInfo, InboundTrack, MediaPacket, PacketStream, TrackId, TrackKind};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Identifier of one consumer cursor
pub type ConsumerId = u64;

struct Subscription {
    sender: broadcast::Sender<MediaPacket>,
    pump: JoinHandle<()>,
    generation: u64,
}

struct RelayInner {
    buffer: usize,
    subscriptions: Mutex<HashMap<TrackId, Subscription>>,
    next_consumer: AtomicU64,
    next_generation: AtomicU64,
}

/// Shared relay; clones refer to the same subscription table
#[derive(Clone)]
pub struct MediaRelay {
    inner: Arc<RelayInner>,
}

impl MediaRelay {
    /// Create a relay buffering `buffer` packets per track
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                buffer: buffer.max(1),
                subscriptions: Mutex::new(HashMap::new()),
                next_consumer: AtomicU64::new(1),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Attach a new consumer to `track`.
    ///
    /// The first call for a track creates the upstream subscription; later
    /// calls only add a cursor to it. Fails if the track's upstream was
    /// already taken by someone else, or if its subscription has ended.
    pub fn subscribe(&self, track: &InboundTrack) -> Result<TrackConsumer> {
        let receiver = {
            let mut subscriptions = self.inner.subscriptions.lock();
            match subscriptions.get(&track.id) {
                Some(subscription) => subscription.sender.subscribe(),
                None => {
                    let upstream = track.take_upstream().ok_or_else(|| {
                        Error::MediaTrackError(format!(
                            "upstream of track {} is no longer available",
                            track.id
                        ))
                    })?;
                    let (sender, receiver) = broadcast::channel(self.inner.buffer);
                    let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                    let pump = tokio::spawn(pump(
                        Arc::clone(&self.inner),
                        track.id.clone(),
                        generation,
                        upstream,
                        sender.clone(),
                    ));
                    subscriptions.insert(
                        track.id.clone(),
                        Subscription {
                            sender,
                            pump,
                            generation,
                        },
                    );
                    debug!(track_id = %track.id, kind = %track.kind, "Relay subscription created");
                    receiver
                }
            }
        };

        Ok(TrackConsumer {
            id: self.inner.next_consumer.fetch_add(1, Ordering::Relaxed),
            track_id: track.id.clone(),
            kind: track.kind,
            codec: track.codec.clone(),
            receiver,
        })
    }

    /// Tear down the subscription for `track_id`; consumers see end of
    /// stream. Returns whether a subscription existed.
    pub fn release(&self, track_id: &str) -> bool {
        let removed = self.inner.subscriptions.lock().remove(track_id);
        match removed {
            Some(subscription) => {
                subscription.pump.abort();
                debug!(track_id = %track_id, "Relay subscription released");
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self, track_id: &str) -> bool {
        self.inner.subscriptions.lock().contains_key(track_id)
    }

    /// Live consumers attached to `track_id`
    pub fn consumer_count(&self, track_id: &str) -> usize {
        self.inner
            .subscriptions
            .lock()
            .get(track_id)
            .map(|s| s.sender.receiver_count())
            .unwrap_or(0)
    }

    /// Upstream subscriptions currently held
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }
}

async fn pump(
    inner: Arc<RelayInner>,
    track_id: TrackId,
    generation: u64,
    mut upstream: mpsc::Receiver<MediaPacket>,
    sender: broadcast::Sender<MediaPacket>,
) {
    while let Some(packet) = upstream.recv().await {
        // No consumers right now is not an error; the packet is dropped.
        let _ = sender.send(packet);
    }

    let mut subscriptions = inner.subscriptions.lock();
    if subscriptions
        .get(&track_id)
        .is_some_and(|s| s.generation == generation)
    {
        subscriptions.remove(&track_id);
    }
    debug!(track_id = %track_id, "Upstream ended, relay subscription dropped");
}

/// One consumer's cursor into a relayed track
pub struct TrackConsumer {
    id: ConsumerId,
    track_id: TrackId,
    kind: TrackKind,
    codec: CodecInfo,
    receiver: broadcast::Receiver<MediaPacket>,
}

impl TrackConsumer {
    pub fn id(&self) -> ConsumerId {
        self.id
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn codec(&self) -> &CodecInfo {
        &self.codec
    }

    /// Next packet, or `None` once the subscription has ended
    pub async fn recv(&mut self) -> Option<MediaPacket> {
        loop {
            match self.receiver.recv().await {
                Ok(packet) => return Some(packet),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        track_id = %self.track_id,
                        consumer = self.id,
                        skipped,
                        "Relay consumer lagging, skipping packets"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Turn this consumer into a packet stream for an outbound track
    pub fn into_stream(self) -> PacketStream {
        Box::pin(futures::stream::unfold(self, |mut consumer| async move {
            consumer.recv().await.map(|packet| (packet, consumer))
        }))
    }
}

impl std::fmt::Debug for TrackConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackConsumer")
            .field("id", &self.id)
            .field("track_id", &self.track_id)
            .field("kind", &self.kind)
            .finish()
    }
}
