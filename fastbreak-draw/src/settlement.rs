use crate::Result;
use fastbreak_core::{
    AccessNode, FastbreakError, LedgerEvent, TransactionId, TransactionResult, TransactionStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Fires a [`CancelSignal`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Caller-supplied cancellation for waits that may never finish.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // handle dropped without cancelling
                std::future::pending::<()>().await;
            }
        }
    }
}

/// One observation of a transaction's progress.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: TransactionStatus,
    pub events: Vec<LedgerEvent>,
    pub block_height: Option<u64>,
}

impl From<TransactionResult> for StatusUpdate {
    fn from(result: TransactionResult) -> Self {
        Self {
            status: result.status,
            events: result.events,
            block_height: result.block_height,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SealResult {
    pub transaction_id: TransactionId,
    pub events: Vec<LedgerEvent>,
    pub block_height: Option<u64>,
}

/// Waits for transactions to seal by polling the access node.
#[derive(Clone)]
pub struct SettlementWaiter {
    node: Arc<dyn AccessNode>,
    poll_interval: Duration,
}

impl SettlementWaiter {
    pub fn new(node: Arc<dyn AccessNode>, poll_interval: Duration) -> Self {
        Self {
            node,
            poll_interval,
        }
    }

    pub async fn await_sealed(
        &self,
        id: &TransactionId,
        cancel: &mut CancelSignal,
    ) -> Result<SealResult> {
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(FastbreakError::stalled(format!(
                        "gave up waiting for {} to seal",
                        id
                    ))
                    .into());
                }
                result = self.node.transaction_result(id) => result?,
            };

            tracing::debug!("Transaction {} is {}", id, result.status);

            match result.status {
                TransactionStatus::Sealed if result.execution_failed() => {
                    return Err(FastbreakError::Execution {
                        transaction_id: id.to_string(),
                        message: result.error_message.unwrap_or_default(),
                    }
                    .into());
                }
                TransactionStatus::Sealed => {
                    return Ok(SealResult {
                        transaction_id: id.clone(),
                        events: result.events,
                        block_height: result.block_height,
                    });
                }
                TransactionStatus::Expired => {
                    return Err(FastbreakError::Expired(id.to_string()).into());
                }
                _ => {}
            }

            self.pause(cancel, id).await?;
        }
    }

    /// Wait until the latest sealed block reaches `target`.
    pub async fn await_block_height(&self, target: u64, cancel: &mut CancelSignal) -> Result<u64> {
        loop {
            let height = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(FastbreakError::stalled(format!(
                        "gave up waiting for block {}",
                        target
                    ))
                    .into());
                }
                height = self.node.latest_sealed_block_height() => height?,
            };

            if height >= target {
                return Ok(height);
            }

            tracing::debug!("Sealed height {} < {}", height, target);
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(FastbreakError::stalled(format!(
                        "gave up waiting for block {}",
                        target
                    ))
                    .into());
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Live status stream for a transaction.
    ///
    /// Each change in status or visible event count is pushed to the channel.
    /// The poller stops at a terminal status, on a query error (the sealed
    /// wait reports it), or when the receiver is dropped.
    pub fn subscribe(&self, id: &TransactionId) -> mpsc::Receiver<StatusUpdate> {
        let (tx, rx) = mpsc::channel(16);
        let node = self.node.clone();
        let id = id.clone();
        let interval = self.poll_interval;

        tokio::spawn(async move {
            let mut last: Option<(TransactionStatus, usize)> = None;
            loop {
                match node.transaction_result(&id).await {
                    Ok(result) => {
                        let marker = (result.status, result.events.len());
                        if last != Some(marker) {
                            last = Some(marker);
                            let terminal = result.status.is_terminal();
                            if tx.send(StatusUpdate::from(result)).await.is_err() || terminal {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!("Subscription for {} ended: {}", id, e);
                        return;
                    }
                }

                tokio::select! {
                    _ = tx.closed() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        rx
    }

    async fn pause(&self, cancel: &mut CancelSignal, id: &TransactionId) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(FastbreakError::stalled(format!(
                "gave up waiting for {} to seal",
                id
            ))
            .into()),
            _ = tokio::time::sleep(self.poll_interval) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedLedger;
    use crate::DrawError;
    use fastbreak_core::contract::{with_address, COMMIT_TRANSACTION};
    use fastbreak_core::{Argument, SignerRoles, TransactionRequest, Wallet};

    const ADDRESS: &str = "0xf8d6e0586b0a20c7";

    fn commit(usernames: &[&str], teams: &[&str]) -> TransactionRequest {
        TransactionRequest {
            code: with_address(COMMIT_TRANSACTION, ADDRESS),
            arguments: vec![
                Argument::StringArray(usernames.iter().map(|s| s.to_string()).collect()),
                Argument::StringArray(teams.iter().map(|s| s.to_string()).collect()),
                Argument::StringArray(Vec::new()),
            ],
            roles: SignerRoles::current_user(),
            compute_limit: 9999,
        }
    }

    async fn connected() -> Arc<SimulatedLedger> {
        let ledger = Arc::new(SimulatedLedger::new(7));
        ledger.authenticate().await.unwrap();
        ledger
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_sealed_returns_block_height() {
        let ledger = connected().await;
        let id = ledger
            .submit_transaction(commit(&["alice"], &["Utah Jazz"]))
            .await
            .unwrap();

        let waiter = SettlementWaiter::new(ledger.clone(), Duration::from_millis(100));
        let sealed = waiter
            .await_sealed(&id, &mut CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(sealed.transaction_id, id);
        assert!(sealed.block_height.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_execution_failure_is_reported() {
        let ledger = connected().await;
        // two usernames, one team
        let id = ledger
            .submit_transaction(commit(&["alice", "bob"], &["Utah Jazz"]))
            .await
            .unwrap();

        let waiter = SettlementWaiter::new(ledger.clone(), Duration::from_millis(100));
        let err = waiter
            .await_sealed(&id, &mut CancelSignal::never())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DrawError::Core(FastbreakError::Execution { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stalled_wait() {
        let ledger = connected().await;
        ledger.stall_sealing(true);
        let id = ledger
            .submit_transaction(commit(&["alice"], &["Utah Jazz"]))
            .await
            .unwrap();

        let waiter = SettlementWaiter::new(ledger.clone(), Duration::from_millis(100));
        let (handle, mut signal) = CancelSignal::pair();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            handle.cancel();
        });

        let err = waiter.await_sealed(&id, &mut signal).await.unwrap_err();
        assert!(matches!(err, DrawError::Core(FastbreakError::Stalled(_))));
        assert!(signal.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_reports_each_status_once() {
        let ledger = connected().await;
        let id = ledger
            .submit_transaction(commit(&["alice"], &["Utah Jazz"]))
            .await
            .unwrap();

        let waiter = SettlementWaiter::new(ledger.clone(), Duration::from_millis(100));
        let mut updates = waiter.subscribe(&id);

        let mut statuses = Vec::new();
        while let Some(update) = updates.recv().await {
            statuses.push(update.status);
        }

        assert_eq!(statuses.last(), Some(&TransactionStatus::Sealed));
        let mut deduped = statuses.clone();
        deduped.dedup();
        assert_eq!(deduped, statuses);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_block_height() {
        let ledger = connected().await;
        let start = ledger.height();

        let waiter = SettlementWaiter::new(ledger.clone(), Duration::from_millis(100));
        let reached = waiter
            .await_block_height(start + 3, &mut CancelSignal::never())
            .await
            .unwrap();
        assert!(reached >= start + 3);
    }
}
