//! Signaling: wire messages, the channel adapter and the one-shot endpoint

pub mod adapter;
pub mod message;
pub mod oneshot;

pub use adapter::SignalingAdapter;
pub use message::SignalingMessage;
pub use oneshot::{OfferRequest, OfferResponse, OneShotOffer};
