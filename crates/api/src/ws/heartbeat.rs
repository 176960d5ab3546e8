use std::sync::Arc;
use std::time::Duration;

use crate::ws::registry::SessionRegistry;

/// Spawn a background task that pings every worker session on `interval`.
///
/// Workers answer with Pong, which refreshes their liveness. The returned
/// handle is aborted on shutdown.
pub fn start_heartbeat(
    sessions: Arc<SessionRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;
            let count = sessions.count().await;
            tracing::debug!(count, "Worker heartbeat ping");
            sessions.ping_all().await;
        }
    })
}
