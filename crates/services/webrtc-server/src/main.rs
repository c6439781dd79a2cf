//! WebRTC server binary entry point
//!
//! Serves the browser client, the WebSocket signaling channel and the
//! one-shot offer endpoint. Every session echoes the client's media back.
//!
//! # Usage
//!
//! ```bash
//! # Plain HTTP on 0.0.0.0:8080
//! cargo run -p peerlink-webrtc-server
//!
//! # HTTPS/WSS (browsers require a secure context off localhost)
//! cargo run -p peerlink-webrtc-server -- \
//!   --cert-file cert.pem --key-file key.pem --port 8443
//!
//! # Record received audio, play a packet dump on one-shot sessions
//! cargo run -p peerlink-webrtc-server -- \
//!   --write-audio recordings/audio.pkt \
//!   --play-audio demo.pkt
//! ```

mod routes;

use anyhow::Context;
use clap::Parser;
use peerlink_webrtc::{
    SessionContext, ShutdownCoordinator, SignalingConfig, TlsConfig, WebRtcEngine,
};
use routes::AppState;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long in-flight HTTP requests get once all sessions are closed
const GRACEFUL_SHUTDOWN: Duration = Duration::from_secs(3);

/// PeerLink WebRTC Server
///
/// WebRTC echo server with WebSocket signaling and a one-shot HTTP offer
/// endpoint.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SSL certificate file (for HTTPS)
    #[arg(long, env = "PEERLINK_CERT_FILE")]
    cert_file: Option<PathBuf>,

    /// SSL key file (for HTTPS)
    #[arg(long, env = "PEERLINK_KEY_FILE")]
    key_file: Option<PathBuf>,

    /// Host for HTTP server
    #[arg(long, default_value = "0.0.0.0", env = "PEERLINK_HOST")]
    host: IpAddr,

    /// Port for HTTP server
    #[arg(short, long, default_value_t = 8080, env = "PEERLINK_PORT")]
    port: u16,

    /// Enable debug logging
    #[arg(short, long, env = "PEERLINK_VERBOSE")]
    verbose: bool,

    /// Write received audio to this file (one file per session)
    #[arg(long, env = "PEERLINK_WRITE_AUDIO")]
    write_audio: Option<PathBuf>,

    /// Packet dump to play as outbound audio on one-shot sessions
    #[arg(long, env = "PEERLINK_PLAY_AUDIO")]
    play_audio: Option<PathBuf>,

    /// Directory holding index.html and the client scripts
    #[arg(long, default_value = "static", env = "PEERLINK_STATIC_DIR")]
    static_dir: PathBuf,

    /// STUN servers (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302",
        env = "PEERLINK_STUN_SERVERS"
    )]
    stun_servers: Vec<String>,

    /// Seconds a session may take to connect before it is failed
    #[arg(long, default_value_t = 30, env = "PEERLINK_NEGOTIATION_TIMEOUT")]
    negotiation_timeout: u64,
}

impl Args {
    fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            stun_servers: self.stun_servers.clone(),
            negotiation_timeout_secs: self.negotiation_timeout,
            record_audio: self.write_audio.clone(),
            local_audio: self.play_audio.clone(),
            ..Default::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("peerlink-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        core_version = peerlink_webrtc::version(),
        "PeerLink WebRTC Server starting"
    );

    let tls = TlsConfig::from_paths(args.cert_file.as_deref(), args.key_file.as_deref())
        .context("invalid TLS configuration")?;

    let config = args.signaling_config();
    config
        .validate()
        .context("invalid signaling configuration")?;
    info!(
        stun_servers = ?config.stun_servers,
        negotiation_timeout_secs = config.negotiation_timeout_secs,
        record_audio = ?config.record_audio,
        local_audio = ?config.local_audio,
        "Signaling configuration loaded"
    );

    let engine = Arc::new(WebRtcEngine::new(&config).context("failed to initialize WebRTC")?);
    let ctx = SessionContext::new(engine, config);

    let coordinator = ShutdownCoordinator::new(Arc::clone(&ctx.registry));
    let app = routes::router(AppState::new(ctx), &args.static_dir);
    let addr = SocketAddr::new(args.host, args.port);

    let handle = axum_server::Handle::new();
    tokio::spawn(shutdown_on_ctrl_c(handle.clone(), coordinator));

    match tls {
        Some(tls) => {
            let rustls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                &tls.cert_file,
                &tls.key_file,
            )
            .await
            .with_context(|| {
                format!(
                    "failed to load certificate {} / key {}",
                    tls.cert_file.display(),
                    tls.key_file.display()
                )
            })?;
            info!("Listening on https://{}", addr);
            axum_server::bind_rustls(addr, rustls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTPS server failed")?;
        }
        None => {
            info!("Listening on http://{}", addr);
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTP server failed")?;
        }
    }

    info!("Server shut down gracefully");
    Ok(())
}

/// Close every session on Ctrl+C, then stop accepting connections
async fn shutdown_on_ctrl_c(handle: axum_server::Handle, coordinator: ShutdownCoordinator) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Ctrl+C received, initiating shutdown");

    let closed = coordinator.shutdown().await;
    info!(sessions = closed, "Sessions drained");

    handle.graceful_shutdown(Some(GRACEFUL_SHUTDOWN));
}

/// Default filter: `info` (or `debug` with `--verbose`) for our crates, the
/// webrtc stack capped at `warn`
fn default_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!(
        "{level},webrtc=warn,interceptor=warn,peerlink_webrtc={level},webrtc_server={level}"
    )
}

fn init_tracing(verbose: bool) {
    // Initialize tracing with EnvFilter for RUST_LOG support
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
