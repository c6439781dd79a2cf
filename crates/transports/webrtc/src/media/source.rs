//! Locally sourced outbound media

use super::decode_packets;
use crate::engine::{CodecInfo, PacketStream, TrackKind};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Source of an outbound track that does not come from the peer
#[async_trait]
pub trait LocalMediaSource: Send + Sync {
    /// Label used as the outbound track and stream id
    fn label(&self) -> &str;

    fn kind(&self) -> TrackKind;

    fn codec(&self) -> CodecInfo;

    /// Start a fresh playback. Each call returns an independent stream.
    async fn open(&self) -> Result<PacketStream>;
}

/// Plays a packet dump file back at a fixed packet interval
#[derive(Debug, Clone)]
pub struct PacketFileSource {
    path: PathBuf,
    label: String,
    codec: CodecInfo,
    interval: Duration,
}

impl PacketFileSource {
    /// Opus audio, one packet every 20 ms
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local-audio".to_string());
        Self {
            path,
            label,
            codec: CodecInfo::opus(),
            interval: Duration::from_millis(20),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl LocalMediaSource for PacketFileSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn codec(&self) -> CodecInfo {
        self.codec.clone()
    }

    async fn open(&self) -> Result<PacketStream> {
        let data = tokio::fs::read(&self.path).await.map_err(|e| {
            Error::MediaTrackError(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let packets = decode_packets(Bytes::from(data))?;
        debug!(path = %self.path.display(), packets = packets.len(), "Local source opened");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let paced = futures::stream::unfold(
            (packets.into_iter(), ticker),
            |(mut packets, mut ticker)| async move {
                let packet = packets.next()?;
                ticker.tick().await;
                Some((packet, (packets, ticker)))
            },
        );
        Ok(Box::pin(paced))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{encode_packet, packet, DUMP_MAGIC};
    use futures::StreamExt;

    async fn dump_file(count: u16) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut buf = DUMP_MAGIC.to_vec();
        for seq in 0..count {
            encode_packet(&mut buf, &packet(seq));
        }
        tokio::fs::write(file.path(), buf).await.unwrap();
        file
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_packets_in_order_at_interval() {
        let file = dump_file(3).await;
        let source = PacketFileSource::new(file.path());
        assert_eq!(source.kind(), TrackKind::Audio);

        let started = tokio::time::Instant::now();
        let packets: Vec<_> = source.open().await.unwrap().collect().await;

        assert_eq!(packets, vec![packet(0), packet(1), packet(2)]);
        // First tick is immediate, then one interval per packet.
        assert_eq!(started.elapsed(), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_each_open_is_independent() {
        let file = dump_file(2).await;
        let source = PacketFileSource::new(file.path()).with_interval(Duration::from_millis(1));

        let first: Vec<_> = source.open().await.unwrap().collect().await;
        let second: Vec<_> = source.open().await.unwrap().collect().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let source = PacketFileSource::new("/definitely/not/here.pkt");
        assert!(source.open().await.is_err());
    }
}
