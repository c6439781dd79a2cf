//! Recording sinks
//!
//! A session that has a recorder tees every inbound audio track into it.
//! Sinks are started when the session is created and stopped when the last
//! recorded track ends or the session is cleaned up, whichever comes first.

use super::relay::TrackConsumer;
use super::{encode_packet, DUMP_MAGIC};
use crate::session::SessionId;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sink for relayed media
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Open the sink
    async fn start(&self) -> Result<()>;

    /// Start draining `consumer` into the sink
    async fn add_track(&self, consumer: TrackConsumer) -> Result<()>;

    /// Flush and close the sink. Calling it again is a no-op.
    async fn stop(&self) -> Result<()>;
}

/// Creates one recorder per session
pub trait RecorderFactory: Send + Sync {
    fn create(&self, session_id: &SessionId) -> Result<Arc<dyn Recorder>>;
}

type SharedWriter = Arc<tokio::sync::Mutex<Option<BufWriter<File>>>>;

/// Writes every packet of its tracks to a packet dump file
pub struct FileRecorder {
    path: PathBuf,
    writer: SharedWriter,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FileRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Arc::new(tokio::sync::Mutex::new(None)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Recorder for FileRecorder {
    async fn start(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        if writer.is_some() {
            return Ok(());
        }

        let file = File::create(&self.path).await.map_err(|e| {
            Error::RecorderError(format!("cannot create {}: {}", self.path.display(), e))
        })?;
        let mut file = BufWriter::new(file);
        file.write_all(DUMP_MAGIC).await?;
        *writer = Some(file);

        info!(path = %self.path.display(), "Recording started");
        Ok(())
    }

    async fn add_track(&self, mut consumer: TrackConsumer) -> Result<()> {
        if self.writer.lock().await.is_none() {
            return Err(Error::RecorderError(format!(
                "recorder for {} is not running",
                self.path.display()
            )));
        }

        let writer = Arc::clone(&self.writer);
        let path = self.path.clone();
        let task = tokio::spawn(async move {
            let mut record = Vec::new();
            while let Some(packet) = consumer.recv().await {
                record.clear();
                encode_packet(&mut record, &packet);

                let mut writer = writer.lock().await;
                let Some(file) = writer.as_mut() else {
                    break;
                };
                if let Err(e) = file.write_all(&record).await {
                    warn!(path = %path.display(), "Failed to write recorded packet: {}", e);
                    break;
                }
            }
            debug!(track_id = %consumer.track_id(), "Recorder track drained");
        });
        self.tasks.lock().push(task);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let Some(mut file) = self.writer.lock().await.take() else {
            return Ok(());
        };
        file.flush().await?;
        file.into_inner().sync_all().await?;

        info!(path = %self.path.display(), "Recording stopped");
        Ok(())
    }
}

/// Builds per-session file names from one base path:
/// `audio.pkt` becomes `audio-<session id>.pkt`.
#[derive(Debug, Clone)]
pub struct FileRecorderFactory {
    base: PathBuf,
}

impl FileRecorderFactory {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn path_for(&self, session_id: &SessionId) -> PathBuf {
        let stem = self
            .base
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording".to_string());
        let name = match self.base.extension() {
            Some(ext) => format!("{}-{}.{}", stem, session_id, ext.to_string_lossy()),
            None => format!("{}-{}", stem, session_id),
        };
        self.base.with_file_name(name)
    }
}

impl RecorderFactory for FileRecorderFactory {
    fn create(&self, session_id: &SessionId) -> Result<Arc<dyn Recorder>> {
        Ok(Arc::new(FileRecorder::new(self.path_for(session_id))))
    }
}
