//! Configuration types for the signaling core

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for `negotiation_timeout_secs`
pub const MAX_NEGOTIATION_TIMEOUT_SECS: u64 = 300;

/// Main configuration shared by every session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// STUN server URLs handed to the engine
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Seconds a session may spend before the engine reports it connected
    /// (default: 30)
    pub negotiation_timeout_secs: u64,

    /// Packets buffered per relayed track before slow consumers start
    /// skipping (default: 256)
    pub relay_buffer_packets: usize,

    /// Outbound signaling messages queued per channel (default: 128)
    pub outgoing_queue: usize,

    /// Record received audio to this path (one file per session)
    pub record_audio: Option<PathBuf>,

    /// Packet dump played as outbound audio on one-shot sessions
    pub local_audio: Option<PathBuf>,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            negotiation_timeout_secs: 30,
            relay_buffer_packets: 256,
            outgoing_queue: 128,
            record_audio: None,
            local_audio: None,
        }
    }
}

impl SignalingConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - a STUN URL does not start with `stun:` or `stuns:`
    /// - a TURN URL does not start with `turn:` or `turns:`
    /// - `negotiation_timeout_secs` is not in range 1-300
    /// - `relay_buffer_packets` or `outgoing_queue` is zero
    /// - `local_audio` points at a file that does not exist
    pub fn validate(&self) -> Result<()> {
        for url in &self.stun_servers {
            if !url.starts_with("stun:") && !url.starts_with("stuns:") {
                return Err(Error::InvalidConfig(format!(
                    "STUN server URL must start with stun: or stuns:, got {}",
                    url
                )));
            }
        }

        for turn in &self.turn_servers {
            if !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:") {
                return Err(Error::InvalidConfig(format!(
                    "TURN server URL must start with turn: or turns:, got {}",
                    turn.url
                )));
            }
        }

        if self.negotiation_timeout_secs == 0
            || self.negotiation_timeout_secs > MAX_NEGOTIATION_TIMEOUT_SECS
        {
            return Err(Error::InvalidConfig(format!(
                "negotiation_timeout_secs must be in range 1-{}, got {}",
                MAX_NEGOTIATION_TIMEOUT_SECS, self.negotiation_timeout_secs
            )));
        }

        if self.relay_buffer_packets == 0 {
            return Err(Error::InvalidConfig(
                "relay_buffer_packets must be at least 1".to_string(),
            ));
        }

        if self.outgoing_queue == 0 {
            return Err(Error::InvalidConfig(
                "outgoing_queue must be at least 1".to_string(),
            ));
        }

        if let Some(path) = &self.local_audio {
            if !path.is_file() {
                return Err(Error::InvalidConfig(format!(
                    "local audio file not found: {}",
                    path.display()
                )));
            }
        }

        Ok(())
    }

    /// Negotiation timeout as a `Duration`
    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_secs(self.negotiation_timeout_secs)
    }
}

/// Certificate and key used to serve HTTPS/WSS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl TlsConfig {
    /// Build TLS settings from the optional CLI paths.
    ///
    /// Returns `Ok(None)` when neither path is given. Giving only one of
    /// them, or a path that is not a readable file, is a configuration error.
    pub fn from_paths(cert_file: Option<&Path>, key_file: Option<&Path>) -> Result<Option<Self>> {
        match (cert_file, key_file) {
            (None, None) => Ok(None),
            (Some(_), None) => Err(Error::InvalidConfig(
                "--cert-file requires --key-file".to_string(),
            )),
            (None, Some(_)) => Err(Error::InvalidConfig(
                "--key-file requires --cert-file".to_string(),
            )),
            (Some(cert), Some(key)) => {
                for (label, path) in [("certificate", cert), ("key", key)] {
                    if !path.is_file() {
                        return Err(Error::InvalidConfig(format!(
                            "{} file not found: {}",
                            label,
                            path.display()
                        )));
                    }
                }
                Ok(Some(Self {
                    cert_file: cert.to_path_buf(),
                    key_file: key.to_path_buf(),
                }))
            }
        }
    }
}
