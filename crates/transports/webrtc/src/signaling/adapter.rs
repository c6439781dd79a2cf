//! Signaling channel adapter
//!
//! One adapter task per channel. It creates the session when the channel
//! opens, then multiplexes four inputs until the channel closes:
//!
//! - text from the client
//! - engine events
//! - control commands from the registry handle (shutdown)
//! - the negotiation deadline
//!
//! Replies go out through an `mpsc::Sender<String>`; the transport owns the
//! task that writes them to the socket.

use super::message::SignalingMessage;
use crate::session::{
    MediaPlan, PeerSession, Role, SessionCommand, SessionContext, SessionIo, SessionState,
};
use crate::Result;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

/// Serves signaling channels for one process
#[derive(Clone)]
pub struct SignalingAdapter {
    ctx: SessionContext,
}

impl SignalingAdapter {
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Run one channel to completion.
    ///
    /// `inbound` yields the client's text messages and ends when the
    /// transport closes. Returns the state the session ended in, or an error
    /// if the session could not be created.
    pub async fn run<S>(
        &self,
        role: Role,
        inbound: S,
        outbound: mpsc::Sender<String>,
    ) -> Result<SessionState>
    where
        S: Stream<Item = Result<String>> + Unpin + Send,
    {
        let (mut session, io) = PeerSession::create(&self.ctx, role, MediaPlan::echo()).await?;
        let span = session.span();

        async move {
            info!("Signaling channel open");
            if role == Role::Offerer {
                if let Ok(offer) = session.create_offer().await {
                    send(Some(&outbound), SignalingMessage::Offer { sdp: offer.sdp }).await;
                }
            }
            let state = drive(session, io, inbound, Some(&outbound)).await;
            info!(state = %state, "Signaling channel finished");
            Ok(state)
        }
        .instrument(span)
        .await
    }
}

/// Drive a session until it is done.
///
/// With an `outbound` channel the loop keeps reading `inbound` after the
/// session ends, ignoring everything, until the transport closes. Without
/// one (a detached one-shot session) it returns as soon as the session
/// ends. A shutdown `Close` always ends the loop.
pub(crate) async fn drive<S>(
    mut session: PeerSession,
    mut io: SessionIo,
    mut inbound: S,
    outbound: Option<&mpsc::Sender<String>>,
) -> SessionState
where
    S: Stream<Item = Result<String>> + Unpin,
{
    let detached = outbound.is_none();
    let mut inbound_open = true;
    let mut events_open = true;
    let mut commands_open = true;

    loop {
        let deadline = session.negotiation_deadline();
        let awaiting = session.awaiting_negotiation();

        tokio::select! {
            text = inbound.next(), if inbound_open => match text {
                Some(Ok(text)) => on_text(&mut session, &text, outbound).await,
                Some(Err(e)) => {
                    warn!("Signaling channel error: {}", e);
                    inbound_open = false;
                    session.close("signaling channel error").await;
                }
                None => {
                    inbound_open = false;
                    session.close("signaling channel closed").await;
                }
            },
            event = io.events.recv(), if events_open => match event {
                Some(event) => {
                    if let Some(message) = session.handle_event(event).await {
                        send(outbound, message).await;
                    }
                }
                None => events_open = false,
            },
            command = io.commands.recv(), if commands_open => match command {
                Some(SessionCommand::Close { done }) => {
                    session.close("server shutting down").await;
                    let _ = done.send(());
                    break;
                }
                None => commands_open = false,
            },
            _ = tokio::time::sleep_until(deadline), if awaiting => {
                session.negotiation_timed_out().await;
            }
            else => break,
        }

        if session.is_terminal() && (detached || !inbound_open) {
            break;
        }
    }

    session.state()
}

async fn on_text(session: &mut PeerSession, text: &str, outbound: Option<&mpsc::Sender<String>>) {
    if session.is_terminal() {
        debug!(state = %session.state(), "Ignoring message on ended session");
        return;
    }

    let message = match SignalingMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Dropping signaling message: {}", e);
            return;
        }
    };

    match session.handle_message(message).await {
        Ok(Some(reply)) => send(outbound, reply).await,
        Ok(None) => {}
        Err(e) => warn!("Dropping signaling message: {}", e),
    }
}

async fn send(outbound: Option<&mpsc::Sender<String>>, message: SignalingMessage) {
    let Some(outbound) = outbound else {
        return;
    };
    match message.to_json() {
        Ok(json) => {
            if outbound.send(json).await.is_err() {
                debug!("Channel writer gone, dropping {}", message.message_type());
            }
        }
        Err(e) => warn!("Failed to serialize {}: {}", message.message_type(), e),
    }
}
