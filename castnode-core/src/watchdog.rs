// Connection watchdogs.
//
// Two cooperating timers per active push. The inactivity reaper terminates
// streams whose publisher went away; the liveness kicker refreshes the
// connection while a single segment spends longer than the push timeout in
// the transcode pipeline, so the reaper never evicts a connection mid-flight.
//
// Both tasks hold only the stream identity and resolve the connection
// through the registry on every tick; a missing connection is an exit
// condition, not an error.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::registry::ConnectionRegistry;

/// Spawn the inactivity reaper for a newly registered stream.
///
/// Ticks every `push_timeout`; removes the stream once no refresh happened
/// for a full timeout. Exits when the identity no longer resolves (stream
/// ended, or the external binding was evicted by a rebind).
pub fn spawn_reaper(
    registry: Arc<ConnectionRegistry>,
    id: String,
    push_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(push_timeout);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(conn) = registry.lookup(&id) else {
                debug!("Reaper exiting, identity {} no longer resolves", id);
                return;
            };
            if conn.last_used_age() >= push_timeout {
                info!(
                    "Reaping inactive stream id={} manifest_id={}",
                    id, conn.manifest_id
                );
                if let Err(e) = registry.remove(&id) {
                    warn!("Reaper failed to remove {}: {}", id, e);
                }
                return;
            }
        }
    })
}

/// Stops the liveness kicker when the push request completes.
///
/// The signal is delivered by `Drop`, so every handler exit path (including
/// panics and client disconnects) stops the kicker exactly once; an explicit
/// [`KickerGuard::cancel`] before the drop is harmless.
pub struct KickerGuard {
    stop: watch::Sender<bool>,
}

impl KickerGuard {
    pub fn cancel(&self) {
        let _ = self.stop.send(true);
    }
}

impl Drop for KickerGuard {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}

/// Start the per-request liveness kicker.
///
/// Refreshes the connection's last-used timestamp every 90% of the push
/// timeout until the returned guard is dropped, keeping long-running
/// segment processing ahead of the reaper.
pub fn start_kicker(
    registry: Arc<ConnectionRegistry>,
    id: String,
    push_timeout: Duration,
) -> KickerGuard {
    let (stop, mut stopped) = watch::channel(false);
    let period = (push_timeout * 9 / 10).max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match registry.lookup(&id) {
                        Some(conn) => conn.refresh_last_used(),
                        None => break,
                    }
                }
                _ = stopped.changed() => break,
            }
        }
        debug!("Liveness kicker stopped for {}", id);
    });
    KickerGuard { stop }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{preset, Format, VideoProfile};
    use crate::registry::Connection;
    use crate::storage::{MemoryStore, ObjectStore, StoreSession};
    use crate::transcode::{OrchestratorPool, SessionManager};
    use tokio::time::sleep;

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn register(registry: &ConnectionRegistry, internal: &str) {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let source = VideoProfile {
            name: "source".to_string(),
            format: Format::MpegTs,
            ..VideoProfile::default()
        };
        let conn = Connection::new(
            internal.to_string(),
            None,
            source,
            vec![preset("P240p30fps16x9").unwrap()],
            StoreSession::new(store, internal),
            None,
            SessionManager::new(OrchestratorPool::default()),
        );
        registry.register(conn).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_removes_inactive_stream() {
        let registry = Arc::new(ConnectionRegistry::new(10));
        register(&registry, "mani3");
        let handle = spawn_reaper(registry.clone(), "mani3".to_string(), TIMEOUT);

        sleep(Duration::from_millis(150)).await;
        assert!(!registry.contains("mani3"));
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_spares_refreshed_stream() {
        let registry = Arc::new(ConnectionRegistry::new(10));
        register(&registry, "mani");
        spawn_reaper(registry.clone(), "mani".to_string(), TIMEOUT);

        for _ in 0..6 {
            sleep(Duration::from_millis(50)).await;
            if let Some(conn) = registry.lookup("mani") {
                conn.refresh_last_used();
            }
        }
        assert!(registry.contains("mani"));

        // No more refreshes; the next full timeout reaps it.
        sleep(Duration::from_millis(250)).await;
        assert!(!registry.contains("mani"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_exits_when_external_unbound() {
        let registry = Arc::new(ConnectionRegistry::new(10));
        register(&registry, "intmid");
        registry.rebind_external("extmid1", "intmid");
        let handle = spawn_reaper(registry.clone(), "extmid1".to_string(), TIMEOUT);

        // A newer publisher takes over the external binding.
        registry.rebind_external("extmid2", "intmid");
        assert!(!registry.is_external_bound("extmid1"));

        sleep(Duration::from_millis(350)).await;
        // The old reaper exited without touching the connection.
        handle.await.unwrap();
        assert!(registry.contains("intmid"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_kicker_outlasts_long_processing() {
        let registry = Arc::new(ConnectionRegistry::new(10));
        register(&registry, "mani");
        spawn_reaper(registry.clone(), "mani".to_string(), TIMEOUT);

        // Segment processing takes several push timeouts.
        let guard = start_kicker(registry.clone(), "mani".to_string(), TIMEOUT);
        sleep(Duration::from_millis(450)).await;
        assert!(registry.contains("mani"));

        // Request completes; with the kicker gone the reaper takes over.
        drop(guard);
        sleep(Duration::from_millis(300)).await;
        assert!(!registry.contains("mani"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_kicker_cancel_after_completion_is_safe() {
        let registry = Arc::new(ConnectionRegistry::new(10));
        register(&registry, "mani");

        let guard = start_kicker(registry.clone(), "mani".to_string(), TIMEOUT);
        guard.cancel();
        guard.cancel();
        drop(guard);

        // Give the kicker task a chance to observe the signal and exit.
        sleep(Duration::from_millis(10)).await;
        assert!(registry.contains("mani"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_kicker_exits_when_stream_removed() {
        let registry = Arc::new(ConnectionRegistry::new(10));
        register(&registry, "mani");
        let _guard = start_kicker(registry.clone(), "mani".to_string(), TIMEOUT);

        registry.remove("mani").unwrap();
        // Ticks after removal find nothing and the task exits on its own.
        sleep(Duration::from_millis(200)).await;
        assert!(!registry.contains("mani"));
    }
}
