//! A named, timeout-bounded dependency probe.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Tri-state result a probe's check can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    /// Reserved for future use; the loop must never add a `Warn` to the
    /// summary.
    Warn,
    Crit,
}

pub type CheckOutcome = (CheckStatus, Option<String>);
pub type BoxCheckFuture = Pin<Box<dyn Future<Output = CheckOutcome> + Send + 'static>>;

/// The callable a probe wraps. Implementations must return a future that
/// owns everything it needs (no borrow of `&self` survives the call) so it
/// can be raced against a timer on its own task.
pub trait ProbeCheck: Send + Sync + 'static {
    fn check(&self) -> BoxCheckFuture;
}

impl<F, Fut> ProbeCheck for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CheckOutcome> + Send + 'static,
{
    fn check(&self) -> BoxCheckFuture {
        Box::pin((self)())
    }
}

/// A dependency probe registered with the service before `Listen`. Mutation
/// after `Listen` is undefined — probes are read-only for the lifetime of
/// the health loop.
#[derive(Clone)]
pub struct DependencyProbe {
    pub name: Arc<str>,
    pub timeout: Duration,
    pub check: Arc<dyn ProbeCheck>,
}

impl DependencyProbe {
    pub fn new(name: impl Into<Arc<str>>, timeout: Duration, check: impl ProbeCheck) -> Self {
        Self {
            name: name.into(),
            timeout,
            check: Arc::new(check),
        }
    }
}

/// Run `probe.check` racing a timer, both on their own tasks, correlated
/// through a one-slot buffered channel so the loser never blocks on send.
///
/// On timeout returns `(Crit, "probe <name> did timeout after <d>s")` and
/// leaves the original check task to finish on its own; its late result is
/// simply dropped when the channel slot is already taken.
pub async fn run_with_timeout(probe: &DependencyProbe) -> CheckOutcome {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<CheckOutcome>(1);

    let check = Arc::clone(&probe.check);
    let check_tx = tx.clone();
    tokio::spawn(async move {
        let outcome = check.check().await;
        let _ = check_tx.try_send(outcome);
    });

    let timeout = probe.timeout;
    let name = Arc::clone(&probe.name);
    let timer_tx = tx;
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let message = format!(
            "probe {} did timeout after {} seconds",
            name,
            timeout.as_secs_f64()
        );
        let _ = timer_tx.try_send((CheckStatus::Crit, Some(message)));
    });

    rx.recv()
        .await
        .expect("at least one of the two racing senders always succeeds")
}
