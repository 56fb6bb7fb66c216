//! Owns the set of registered probes and the summary buffer the status
//! endpoint reads from. The loop itself is the sole writer of the summary;
//! everyone else only ever takes a read lock.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::probe::{run_with_timeout, CheckStatus, DependencyProbe};

/// Collected CRIT errors from the most recent completed health-loop
/// iteration. Reset at the start of each iteration.
#[derive(Default)]
pub struct HealthSummary {
    errors: RwLock<Vec<String>>,
}

impl HealthSummary {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&self) {
        self.errors.write().clear();
    }

    fn push(&self, message: String) {
        self.errors.write().push(message);
    }

    /// Read-locked snapshot for the status endpoint.
    pub fn snapshot(&self) -> Vec<String> {
        self.errors.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.read().is_empty()
    }
}

/// How often the loop re-runs every probe. The first iteration starts
/// immediately.
pub const LOOP_PERIOD: Duration = Duration::from_secs(30);

/// A mutable set of probes plus the channel used to stop the loop.
pub struct HealthRegistry {
    probes: Vec<DependencyProbe>,
    summary: Arc<HealthSummary>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            probes: Vec::new(),
            summary: Arc::new(HealthSummary::new()),
        }
    }

    /// Register a probe. Calling this after `Listen` has started the loop
    /// is undefined; probes are meant to be fully assembled beforehand.
    pub fn register(&mut self, probe: DependencyProbe) {
        self.probes.push(probe);
    }

    pub fn summary(&self) -> Arc<HealthSummary> {
        Arc::clone(&self.summary)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }

    /// Spawn the passive loop, returning a close handle. Dropping or
    /// sending on the handle stops the loop within one iteration boundary
    /// plus any single in-flight probe timeout.
    pub fn spawn_loop(&self) -> (tokio::task::JoinHandle<()>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel(1);
        let probes = Arc::new(self.probes.clone());
        let summary = Arc::clone(&self.summary);
        let handle = tokio::spawn(run_loop(probes, summary, rx));
        (handle, tx)
    }
}

async fn run_loop(
    probes: Arc<Vec<DependencyProbe>>,
    summary: Arc<HealthSummary>,
    mut close_rx: mpsc::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(LOOP_PERIOD);
    loop {
        tokio::select! {
            _ = close_rx.recv() => {
                tracing::debug!("health loop received close signal");
                return;
            }
            _ = ticker.tick() => {
                summary.reset();
                for probe in probes.iter() {
                    let outcome = tokio::select! {
                        _ = close_rx.recv() => {
                            tracing::debug!("health loop closed mid-iteration");
                            return;
                        }
                        outcome = run_with_timeout(probe) => outcome,
                    };
                    if outcome.0 == CheckStatus::Crit {
                        let message = outcome
                            .1
                            .unwrap_or_else(|| format!("probe {} failed", probe.name));
                        summary.push(message);
                    }
                }
            }
        }
    }
}
