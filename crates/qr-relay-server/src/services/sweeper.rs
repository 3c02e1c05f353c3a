use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::RelayService;

/// Background sweep of expired sessions and idle rate windows, on top of
/// the opportunistic sweep each request does.
pub fn spawn_sweeper(relay: Arc<RelayService>, interval: Duration) -> JoinHandle<()> {
    let interval = interval.max(Duration::from_secs(1));
    info!("Session sweeper started (every {}s)", interval.as_secs());

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let (sessions, windows) = relay.sweep();
            if sessions > 0 || windows > 0 {
                debug!("Sweep removed {} sessions, {} rate windows", sessions, windows);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::services::upstream::MockQrProvider;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_sessions() {
        let relay = Arc::new(RelayService::new(
            Arc::new(MockQrProvider::new()),
            RelayConfig::default(),
        ));
        relay.store().create("u1", "qr-1").unwrap();

        let handle = spawn_sweeper(relay.clone(), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(290)).await;
        assert_eq!(relay.store().len(), 1);

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(relay.store().is_empty());

        handle.abort();
    }
}
