//! Session lifecycle: registry, state machine and shutdown

pub mod peer;
pub mod registry;
pub mod shutdown;
pub mod state;

pub use peer::{
    AudioSource, MediaPlan, PeerSession, SessionContext, SessionIo, TrackBinding,
    TrackDirection, TrackSource,
};
pub use registry::{SessionCommand, SessionHandle, SessionId, SessionRegistry};
pub use shutdown::ShutdownCoordinator;
pub use state::{Role, SessionState};
