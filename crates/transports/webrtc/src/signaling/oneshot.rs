//! One-shot offer/answer over plain HTTP
//!
//! The client posts a complete offer and gets back a complete answer with
//! every local candidate already in it. No candidates are trickled, so the
//! session lives on in a detached task with no channel attached.

use super::adapter::drive;
use crate::engine::{SdpType, SessionDescription};
use crate::error::ProtocolError;
use crate::session::{MediaPlan, PeerSession, Role, SessionContext, SessionIo};
use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};

/// `POST /offer` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRequest {
    pub sdp: String,

    #[serde(rename = "type")]
    pub sdp_type: String,

    /// Label for the echoed video track
    #[serde(default)]
    pub video_transform: Option<String>,
}

/// `POST /offer` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferResponse {
    pub sdp: String,

    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

/// Answers complete offers
#[derive(Clone)]
pub struct OneShotOffer {
    ctx: SessionContext,
}

impl OneShotOffer {
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    /// Negotiate a session for `request` and return the final answer.
    ///
    /// The negotiation deadline and server shutdown already apply while ICE
    /// gathering runs. On success the session keeps running in a detached
    /// task; on failure it has already ended and been deregistered.
    pub async fn answer(&self, request: OfferRequest) -> Result<OfferResponse> {
        if request.sdp_type != "offer" {
            return Err(ProtocolError::InvalidBody {
                message_type: "offer",
                reason: format!("type must be \"offer\", got \"{}\"", request.sdp_type),
            }
            .into());
        }

        let plan = MediaPlan::one_shot(self.ctx.local_audio.clone(), request.video_transform);
        let (mut session, mut io) = PeerSession::create(&self.ctx, Role::Answerer, plan).await?;
        let span = session.span();

        let negotiated = negotiate(&mut session, &mut io, request.sdp)
            .instrument(span.clone())
            .await;
        let description = match negotiated {
            Ok(description) => description,
            Err(e) => {
                session.fail(&e).await;
                return Err(e);
            }
        };

        tokio::spawn(
            async move {
                let state = drive(session, io, futures::stream::pending(), None).await;
                info!(state = %state, "Detached session finished");
            }
            .instrument(span),
        );

        Ok(OfferResponse {
            sdp: description.sdp,
            sdp_type: description.sdp_type,
        })
    }
}

async fn negotiate(
    session: &mut PeerSession,
    io: &mut SessionIo,
    sdp: String,
) -> Result<SessionDescription> {
    session.accept_offer(sdp).await?;
    let description = session.gathered_local_description(io).await?;
    info!("One-shot answer ready");
    Ok(description)
}
