//! Ledger driver.
//!
//! Executes the ledger against the fork: reverts rolled-back transactions,
//! then sends pending transactions one at a time from the head of the
//! queue. Sending pauses while a rollback is in progress or the fork is
//! being refreshed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use pilot_core::TransactionId;
use pilot_settings::DriverSettings;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::LedgerAction;
use crate::errors::{LedgerError, Result};
use crate::ledger::Ledger;
use crate::stream::{ForkEvent, MinedStatus};
use crate::types::TransactionPayload;

/// Execution surface of the simulation fork.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForkExecutor: Send + Sync {
    /// Take a checkpoint of the current fork state.
    async fn snapshot(&self) -> Result<String>;
    /// Submit a transaction; returns its hash.
    async fn send(&self, payload: &TransactionPayload) -> Result<String>;
    /// Wait until the transaction is mined.
    async fn wait_for_receipt(&self, transaction_hash: &str) -> Result<MinedStatus>;
    /// Restore the fork to a checkpoint.
    async fn revert(&self, snapshot_id: &str) -> Result<()>;
}

/// External key-value store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Write `value` under `key`.
    async fn set(&self, key: &str, value: String) -> Result<()>;
}

/// What one driver step did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Nothing to do right now.
    Idle,
    /// The fork was reverted for a rollback.
    RolledBack(TransactionId),
    /// A pending transaction was sent and mined.
    Executed {
        /// Sent transaction.
        id: TransactionId,
        /// Its outcome.
        status: MinedStatus,
    },
    /// The ledger moved on while the transaction was being sent: it was
    /// cleared, or a rollback or refresh started. It is not recorded as
    /// executed.
    Discarded(TransactionId),
}

/// Drives one ledger against one fork.
pub struct LedgerDriver {
    ledger: Ledger,
    executor: Arc<dyn ForkExecutor>,
    store: Arc<dyn KeyValueStore>,
    settings: DriverSettings,
}

impl LedgerDriver {
    /// Create a driver.
    pub fn new(
        ledger: Ledger,
        executor: Arc<dyn ForkExecutor>,
        store: Arc<dyn KeyValueStore>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            ledger,
            executor,
            store,
            settings,
        }
    }

    /// The driven ledger.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Perform at most one unit of work.
    ///
    /// A send error leaves the transaction at the head of `pending` and is
    /// returned.
    pub async fn drive_once(&self) -> Result<Step> {
        let state = self.ledger.snapshot();

        if let Some(rollback) = state.rollback {
            match rollback.snapshot_id.as_deref() {
                Some(snapshot_id) => self.executor.revert(snapshot_id).await?,
                None => warn!(id = %rollback.id, "rolled back transaction has no snapshot"),
            }
            let _ = self.ledger.dispatch(LedgerAction::ConfirmRollback {
                id: rollback.id.clone(),
            });
            info!(id = %rollback.id, "rollback reverted on fork");
            return Ok(Step::RolledBack(rollback.id));
        }

        if state.refreshing {
            return Ok(Step::Idle);
        }
        let Some(tx) = state.pending.into_iter().next() else {
            return Ok(Step::Idle);
        };

        let snapshot_id = self.executor.snapshot().await?;
        let transaction_hash = match self.executor.send(&tx.payload).await {
            Ok(hash) => hash,
            Err(error) => {
                warn!(id = %tx.id, %error, "failed to send transaction");
                return Err(error);
            }
        };

        let confirmed = self.ledger.dispatch(LedgerAction::Confirm {
            id: tx.id.clone(),
            snapshot_id,
            transaction_hash: transaction_hash.clone(),
        });
        if !confirmed.is_applied() {
            debug!(id = %tx.id, "ledger changed during send, transaction not confirmed");
            return Ok(Step::Discarded(tx.id));
        }

        let timestamp = Utc::now().to_rfc3339();
        if let Err(error) = self
            .store
            .set(&self.settings.last_executed_key, timestamp)
            .await
        {
            warn!(%error, category = error.category(), "failed to record execution time");
        }

        let status = tokio::time::timeout(
            self.settings.receipt_timeout(),
            self.executor.wait_for_receipt(&transaction_hash),
        )
        .await
        .map_err(|_| LedgerError::ReceiptTimeout {
            id: tx.id.clone(),
            after_ms: self.settings.receipt_timeout_ms,
        })??;

        let _ = self.ledger.dispatch(
            ForkEvent::TransactionMined {
                id: tx.id.clone(),
                status,
            }
            .into_action(),
        );
        debug!(id = %tx.id, ?status, "transaction mined");
        Ok(Step::Executed { id: tx.id, status })
    }

    /// Keep driving until cancelled. Sleeps on ledger changes while idle and
    /// returns the first error.
    #[tracing::instrument(skip_all, name = "ledger_driver")]
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut changes = self.ledger.subscribe();
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let _ = changes.borrow_and_update();
            if self.drive_once().await? != Step::Idle {
                continue;
            }
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                changed = changes.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}
