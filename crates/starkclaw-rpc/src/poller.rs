//! Self-rescheduling transaction status poller.
//!
//! One cycle enumerates pending activity records that carry a transaction
//! hash and resolves their receipts through a bounded pool of 3. Records
//! older than 30 minutes stop being polled and become `unknown`. A cycle
//! only starts while the app is foregrounded and in live mode; backgrounding
//! lets the in-flight cycle finish but schedules no new one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use starkclaw_activity::{ActivityLog, ActivityStatus, StatusUpdate};
use starkclaw_core::constants::{POLL_CONCURRENCY, POLL_INTERVAL_SECS, POLL_STALE_AFTER_SECS};

use crate::receipt::ReceiptProvider;

/// Gates the poller consults before starting a cycle.
#[derive(Clone, Default)]
pub struct PollerGates {
    background: Arc<AtomicBool>,
    demo: Arc<AtomicBool>,
}

impl PollerGates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_foreground(&self, foreground: bool) {
        self.background.store(!foreground, Ordering::SeqCst);
    }

    pub fn set_live(&self, live: bool) {
        self.demo.store(!live, Ordering::SeqCst);
    }

    fn should_poll(&self) -> bool {
        !self.background.load(Ordering::SeqCst) && !self.demo.load(Ordering::SeqCst)
    }
}

/// Handle for one poller subscription. Dropping it does not stop the task;
/// call `stop` during teardown. In-flight cycles run to completion.
pub struct PollerHandle {
    cancelled: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl PollerHandle {
    pub fn stop(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Stop and wait for the loop (and any in-flight cycle) to finish.
    pub async fn shutdown(self) {
        self.stop();
        let _ = self.task.await;
    }
}

pub struct StatusPoller<P> {
    provider: Arc<P>,
    activity: Arc<ActivityLog>,
    gates: PollerGates,
    interval: Duration,
    stale_after_secs: i64,
    in_flight: Arc<tokio::sync::Mutex<()>>,
}

impl<P: ReceiptProvider + 'static> StatusPoller<P> {
    pub fn new(provider: Arc<P>, activity: Arc<ActivityLog>, gates: PollerGates) -> Self {
        Self {
            provider,
            activity,
            gates,
            interval: Duration::from_secs(POLL_INTERVAL_SECS),
            stale_after_secs: POLL_STALE_AFTER_SECS,
            in_flight: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Override the cadence (tests run at millisecond scale).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_stale_after_secs(mut self, secs: i64) -> Self {
        self.stale_after_secs = secs;
        self
    }

    /// Start the polling loop. Each tick sleeps, re-checks the cancel flag
    /// captured for this subscription, then runs at most one cycle.
    pub fn spawn(self) -> PollerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(self.interval).await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                if !self.gates.should_poll() {
                    continue;
                }
                self.poll_once().await;
            }
        });
        PollerHandle { cancelled, task }
    }

    /// One poll cycle. Concurrent invocations are blocked by the in-flight
    /// guard; item failures are logged and never abort the cycle.
    pub async fn poll_once(&self) {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!("poll cycle already in flight, skipping");
            return;
        };

        let pending = match self.activity.pending_with_tx_hash() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "could not enumerate pending records");
                return;
            }
        };
        if pending.is_empty() {
            return;
        }

        let now = starkclaw_core::unix_now();
        let (stale, live): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|r| now - r.created_at > self.stale_after_secs);

        for record in stale {
            let Some(tx_hash) = record.tx_hash else { continue };
            let update = StatusUpdate {
                status: ActivityStatus::Unknown,
                execution_status: Some("no receipt within 30 minutes; polling stopped".into()),
                revert_reason: None,
            };
            if let Err(e) = self.activity.update_by_tx_hash(&tx_hash, update) {
                tracing::warn!(error = %e, tx_hash = %format!("{tx_hash:#x}"), "stale update failed");
            }
        }

        futures::stream::iter(live)
            .for_each_concurrent(POLL_CONCURRENCY, |record| {
                let provider = self.provider.clone();
                let activity = self.activity.clone();
                async move {
                    let Some(tx_hash) = record.tx_hash else { return };
                    let receipt = match provider.receipt_status(tx_hash).await {
                        Ok(Some(receipt)) => receipt,
                        Ok(None) => return,
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                tx_hash = %format!("{tx_hash:#x}"),
                                "receipt fetch failed; will retry next cycle"
                            );
                            return;
                        }
                    };

                    let update = if receipt.is_reverted() {
                        StatusUpdate {
                            status: ActivityStatus::Reverted,
                            execution_status: Some(receipt.execution_status.clone()),
                            revert_reason: receipt.revert_reason.clone(),
                        }
                    } else if receipt.is_succeeded() {
                        StatusUpdate {
                            status: ActivityStatus::Succeeded,
                            execution_status: Some(receipt.execution_status.clone()),
                            revert_reason: None,
                        }
                    } else {
                        return;
                    };

                    if let Err(e) = activity.update_by_tx_hash(&tx_hash, update) {
                        tracing::warn!(error = %e, "activity update failed");
                    }
                }
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::TxReceiptStatus;
    use starkclaw_activity::{ActivityDraft, ActivityKind};
    use starkclaw_core::CoreError;
    use starkclaw_keystore::MemoryKeystore;
    use starknet::core::types::Felt;
    use std::future::Future;
    use std::sync::atomic::AtomicUsize;

    struct FakeProvider {
        outcome: TxReceiptStatus,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn succeeding() -> Self {
            Self {
                outcome: TxReceiptStatus {
                    execution_status: "SUCCEEDED".into(),
                    finality_status: "ACCEPTED_ON_L2".into(),
                    revert_reason: None,
                },
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ReceiptProvider for FakeProvider {
        fn receipt_status(
            &self,
            _tx_hash: Felt,
        ) -> impl Future<Output = Result<Option<TxReceiptStatus>, CoreError>> + Send {
            async {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(25)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(Some(self.outcome.clone()))
            }
        }
    }

    fn activity_with_pending(n: u64) -> Arc<ActivityLog> {
        let log = ActivityLog::open(Arc::new(MemoryKeystore::new())).unwrap();
        for i in 0..n {
            log.append(
                ActivityDraft::new(ActivityKind::TransferSubmitted, format!("tx {i}"))
                    .with_tx_hash(Felt::from(i + 1)),
            )
            .unwrap();
        }
        Arc::new(log)
    }

    fn poller(provider: Arc<FakeProvider>, activity: Arc<ActivityLog>) -> StatusPoller<FakeProvider> {
        StatusPoller::new(provider, activity, PollerGates::new())
            .with_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn cycle_resolves_pending_records() {
        let provider = Arc::new(FakeProvider::succeeding());
        let activity = activity_with_pending(2);
        poller(provider, activity.clone()).poll_once().await;
        for record in activity.list().unwrap() {
            assert_eq!(record.status, ActivityStatus::Succeeded);
        }
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_pool() {
        let provider = Arc::new(FakeProvider::succeeding());
        let activity = activity_with_pending(10);
        poller(provider.clone(), activity).poll_once().await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 10);
        assert!(provider.max_in_flight.load(Ordering::SeqCst) <= POLL_CONCURRENCY);
    }

    #[tokio::test]
    async fn stale_records_become_unknown_and_stop_polling() {
        let provider = Arc::new(FakeProvider::succeeding());
        let activity = activity_with_pending(1);
        let poller = StatusPoller::new(provider.clone(), activity.clone(), PollerGates::new())
            .with_stale_after_secs(-1);
        poller.poll_once().await;
        let record = &activity.list().unwrap()[0];
        assert_eq!(record.status, ActivityStatus::Unknown);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        // A second cycle finds nothing pending.
        poller.poll_once().await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn background_gate_blocks_new_cycles() {
        let provider = Arc::new(FakeProvider::succeeding());
        let activity = activity_with_pending(1);
        let gates = PollerGates::new();
        gates.set_foreground(false);
        let handle = StatusPoller::new(provider.clone(), activity.clone(), gates.clone())
            .with_interval(Duration::from_millis(5))
            .spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        gates.set_foreground(true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(provider.calls.load(Ordering::SeqCst) >= 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn demo_mode_blocks_polling() {
        let provider = Arc::new(FakeProvider::succeeding());
        let activity = activity_with_pending(1);
        let gates = PollerGates::new();
        gates.set_live(false);
        let handle = StatusPoller::new(provider.clone(), activity, gates)
            .with_interval(Duration::from_millis(5))
            .spawn();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn cancelled_subscription_schedules_no_more_cycles() {
        let provider = Arc::new(FakeProvider::succeeding());
        let activity = activity_with_pending(1);
        let handle = poller(provider.clone(), activity).spawn();
        handle.shutdown().await;
        let after = provider.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), after);
    }
}
