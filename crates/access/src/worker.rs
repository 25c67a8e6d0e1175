use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use portal_events::{RefreshTrigger, Subscription};

use crate::source::GrantSource;
use crate::store::{PolicyStore, RefreshOutcome};

/// Upper bound on one refresh when the caller does not pick one.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Turns change notifications into policy rebuilds.
///
/// - Subscribes to the trigger bus (focus regained, cross-tab "grants
///   changed", manual refresh)
/// - Coalesces a burst of queued triggers into one rebuild
/// - Drives the async refresh on the given runtime, abandoning it after the
///   refresh timeout so a silent source cannot block shutdown
/// - Supports graceful shutdown
#[derive(Debug)]
pub struct RefreshWorker;

impl RefreshWorker {
    pub fn spawn<S>(
        store: Arc<PolicyStore<S>>,
        triggers: Subscription<RefreshTrigger>,
        runtime: tokio::runtime::Handle,
    ) -> std::io::Result<WorkerHandle>
    where
        S: GrantSource + 'static,
    {
        Self::spawn_with_timeout(store, triggers, runtime, DEFAULT_REFRESH_TIMEOUT)
    }

    pub fn spawn_with_timeout<S>(
        store: Arc<PolicyStore<S>>,
        triggers: Subscription<RefreshTrigger>,
        runtime: tokio::runtime::Handle,
        refresh_timeout: Duration,
    ) -> std::io::Result<WorkerHandle>
    where
        S: GrantSource + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let name = format!("policy-refresh-{}", store.principal_id());

        let join = thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(&store, triggers, shutdown_rx, &runtime, refresh_timeout))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<S>(
    store: &PolicyStore<S>,
    triggers: Subscription<RefreshTrigger>,
    shutdown_rx: mpsc::Receiver<()>,
    runtime: &tokio::runtime::Handle,
    refresh_timeout: Duration,
) where
    S: GrantSource,
{
    let tick = Duration::from_millis(250);

    loop {
        // Shutdown check (non-blocking)
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match triggers.recv_timeout(tick) {
            Ok(first) => {
                // Everything already queued is answered by the same rebuild.
                let trigger = triggers.latest().unwrap_or(first);

                let refresh = runtime.block_on(async {
                    tokio::time::timeout(refresh_timeout, store.refresh(trigger)).await
                });

                match refresh {
                    Ok(RefreshOutcome::SourceUnavailable) => {
                        warn!(principal_id = %store.principal_id(), %trigger, "refresh worker could not reach grant source");
                    }
                    Ok(outcome) => debug!(principal_id = %store.principal_id(), %trigger, ?outcome, "refresh handled"),
                    Err(_) => {
                        warn!(principal_id = %store.principal_id(), %trigger, ?refresh_timeout, "refresh abandoned; grant source did not answer");
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_auth::{Action, Grant};
    use portal_core::PrincipalId;
    use portal_events::{EventBus, InMemoryEventBus};

    use crate::source::{SourceError, StaticGrantSource};

    struct SilentSource;

    #[async_trait::async_trait]
    impl GrantSource for SilentSource {
        async fn fetch_grants(&self) -> Result<Vec<Grant>, SourceError> {
            std::future::pending().await
        }
    }

    #[test]
    fn rebuilds_when_a_trigger_is_published() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let store = Arc::new(PolicyStore::new(
            PrincipalId::new(),
            StaticGrantSource::new(Vec::new()),
        ));
        runtime.block_on(store.load());

        let bus = InMemoryEventBus::<RefreshTrigger>::new();
        let updates = store.subscribe();
        let handle =
            RefreshWorker::spawn(Arc::clone(&store), bus.subscribe(), runtime.handle().clone()).unwrap();

        store
            .source()
            .set_grants(vec![Grant::new("qualidade", "/qualidade").with_view()]);
        bus.publish(RefreshTrigger::GrantsChanged).unwrap();

        let update = updates.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(update.trigger, RefreshTrigger::GrantsChanged);
        assert!(store.can_with_inheritance(Action::Read, "/qualidade/inspecoes"));

        handle.shutdown();
    }

    #[test]
    fn stops_when_the_trigger_bus_goes_away() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let store = Arc::new(PolicyStore::new(
            PrincipalId::new(),
            StaticGrantSource::new(Vec::new()),
        ));

        let bus = InMemoryEventBus::<RefreshTrigger>::new();
        let handle =
            RefreshWorker::spawn(Arc::clone(&store), bus.subscribe(), runtime.handle().clone()).unwrap();
        drop(bus);

        handle.shutdown();
        assert_eq!(store.source().fetch_count(), 0);
    }

    #[test]
    fn silent_source_does_not_block_shutdown() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let store = Arc::new(PolicyStore::new(PrincipalId::new(), SilentSource));

        let bus = InMemoryEventBus::<RefreshTrigger>::new();
        let handle = RefreshWorker::spawn_with_timeout(
            Arc::clone(&store),
            bus.subscribe(),
            runtime.handle().clone(),
            Duration::from_millis(50),
        )
        .unwrap();

        bus.publish(RefreshTrigger::Initial).unwrap();
        thread::sleep(Duration::from_millis(100));

        handle.shutdown();
        assert!(store.is_loading());
    }
}
