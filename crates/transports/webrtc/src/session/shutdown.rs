//! Process-wide session drain

use super::registry::SessionRegistry;
use futures::future::join_all;
use std::sync::Arc;
use tracing::info;

/// Closes every registered session when the process is asked to stop
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    registry: Arc<SessionRegistry>,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Close all sessions concurrently, wait for every close to finish, then
    /// clear the registry. Returns how many sessions were asked to close.
    pub async fn shutdown(&self) -> usize {
        let handles = self.registry.snapshot();
        let count = handles.len();
        info!(sessions = count, "Closing all sessions");

        join_all(handles.iter().map(|handle| handle.close())).await;
        self.registry.clear();

        info!(sessions = count, "All sessions closed");
        count
    }
}
