use crate::chain::client::ChainClient;
use crate::models::{TransactionStatus, TxState};
use crate::utils::errors::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Tracks submitted transactions to a terminal state.
///
/// Each monitored hash gets an independent poll loop bounded by both a retry
/// count and a wall-clock deadline; `monitor` always resolves. Cancellation
/// is cooperative — it stops local tracking, it does not roll back the
/// transaction.
pub struct TransactionMonitor {
    client: Arc<dyn ChainClient>,
    scan_depth: u64,
    poll_interval: Duration,
    max_retries: u32,
    timeout: Duration,
    // Cancel flags for in-flight monitors, keyed by transaction hash. Owned
    // here, swept inline when a monitor finishes — no ambient timers.
    active: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl TransactionMonitor {
    pub fn new(
        client: Arc<dyn ChainClient>,
        scan_depth: u64,
        poll_interval: Duration,
        max_retries: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            scan_depth,
            poll_interval,
            max_retries,
            timeout,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Poll the ledger until `hash` reaches a terminal state, retries are
    /// exhausted or the wall clock runs out. `on_update` fires at most once
    /// per distinct status, the terminal one included.
    pub async fn monitor<F>(&self, hash: &str, on_update: F) -> Result<TransactionStatus>
    where
        F: Fn(&TransactionStatus) + Send + Sync,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let mut active = self.active.lock().await;
            active.insert(hash.to_string(), cancelled.clone());
        }

        let mut status = TransactionStatus::pending(hash);
        let mut last_emitted: Option<TxState> = None;
        let mut emit = |status: &TransactionStatus| {
            if last_emitted != Some(status.status) {
                last_emitted = Some(status.status);
                on_update(status);
            }
        };
        emit(&status);

        let deadline = Instant::now() + self.timeout;

        for attempt in 0..self.max_retries {
            if cancelled.load(Ordering::SeqCst) {
                debug!(tx = %hash, "monitoring cancelled");
                break;
            }

            match self.poll_once(hash).await {
                Ok(Some(observed)) => {
                    status = observed;
                    emit(&status);
                    if status.status.is_terminal() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!(tx = %hash, attempt, "transaction not yet observed");
                }
                Err(e) => {
                    // A flaky RPC round is not a verdict; keep polling
                    // until the bounds say otherwise.
                    warn!(tx = %hash, attempt, error = %e, "poll failed");
                }
            }

            if Instant::now() >= deadline {
                status.status = TxState::Failed;
                status.error = Some(format!("monitoring timed out after {:?}", self.timeout));
                emit(&status);
                break;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.poll_interval.min(remaining)).await;

            // A poll resolving after cancellation must not re-arm.
            if cancelled.load(Ordering::SeqCst) {
                debug!(tx = %hash, "monitoring cancelled");
                break;
            }
        }

        if !status.status.is_terminal() && !cancelled.load(Ordering::SeqCst) {
            status.status = TxState::Failed;
            status.error = Some(format!("retries exhausted after {} attempts", self.max_retries));
            emit(&status);
        }

        {
            // Remove only our own flag: a cancelled session draining its
            // last sleep must not unregister a newer monitor for the same
            // hash.
            let mut active = self.active.lock().await;
            if active.get(hash).map_or(false, |flag| Arc::ptr_eq(flag, &cancelled)) {
                active.remove(hash);
            }
        }

        info!(tx = %hash, status = ?status.status, "monitoring finished");
        Ok(status)
    }

    /// One scan over the recent-block window for the transaction.
    async fn poll_once(&self, hash: &str) -> Result<Option<TransactionStatus>> {
        if self.client.is_known_invalid(hash).await? {
            return Ok(Some(TransactionStatus {
                hash: hash.to_string(),
                status: TxState::Invalid,
                block_hash: None,
                block_number: None,
                events: None,
                error: Some("transaction rejected by the node".to_string()),
            }));
        }

        let latest = self.client.latest_block().await?;
        let from = latest.saturating_sub(self.scan_depth);

        for number in (from..=latest).rev() {
            let block_hash = match self.client.block_hash(number).await? {
                Some(h) => h,
                None => continue,
            };

            for outcome in self.client.extrinsic_outcomes_at(&block_hash).await? {
                if outcome.tx_hash != hash {
                    continue;
                }
                let status = if outcome.success {
                    TxState::Finalized
                } else {
                    TxState::Failed
                };
                return Ok(Some(TransactionStatus {
                    hash: hash.to_string(),
                    status,
                    block_hash: Some(outcome.block_hash),
                    block_number: Some(outcome.block_number),
                    events: Some(outcome.events),
                    error: outcome.dispatch_error,
                }));
            }
        }

        Ok(None)
    }

    /// Cancel the monitor for one hash, if any. The next flag check stops
    /// the loop; nothing is raised to the original caller.
    pub async fn stop_monitoring(&self, hash: &str) {
        let mut active = self.active.lock().await;
        if let Some(flag) = active.remove(hash) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Cancel every outstanding monitor.
    pub async fn stop_all_monitoring(&self) {
        let mut active = self.active.lock().await;
        for flag in active.values() {
            flag.store(true, Ordering::SeqCst);
        }
        active.clear();
    }

    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }
}
