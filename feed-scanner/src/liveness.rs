use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::document::HostDocument;

/// Reports whether the host still honours this process's state.
pub trait LivenessProbe: Send + Sync {
    fn is_alive(&self) -> bool;
}

impl<F> LivenessProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_alive(&self) -> bool {
        self()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAlive;

impl LivenessProbe for AlwaysAlive {
    fn is_alive(&self) -> bool {
        true
    }
}

/// Shared switch the host side flips once it invalidates the scanner.
#[derive(Debug, Clone)]
pub struct LivenessFlag(Arc<AtomicBool>);

impl LivenessFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn invalidate(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for LivenessFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessProbe for LivenessFlag {
    fn is_alive(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reloads the page after `delay`.
pub fn schedule_reload(document: Arc<dyn HostDocument>, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        info!("Reloading page");
        document.reload();
    })
}

/// Polls `probe` every `check_every`; on the first failure schedules a reload
/// and stops.
pub fn spawn_liveness_watchdog(
    probe: Arc<dyn LivenessProbe>,
    document: Arc<dyn HostDocument>,
    check_every: Duration,
    reload_delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(check_every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !probe.is_alive() {
                error!("Extension context is invalid. Reloading page...");
                if let Err(e) = schedule_reload(document, reload_delay).await {
                    error!("Reload task failed: {}", e);
                }
                return;
            }
        }
    })
}
