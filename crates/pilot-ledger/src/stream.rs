//! Fork transaction stream bridge.
//!
//! The fork reports intercepted transactions and their progress as
//! [`ForkEvent`]s. The bridge maps each event onto the matching ledger
//! action.

use pilot_core::TransactionId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::action::{LedgerAction, Transition};
use crate::ledger::Ledger;
use crate::types::TransactionPayload;

/// Final outcome of a mined transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MinedStatus {
    /// Executed successfully.
    Success,
    /// Could not be executed.
    Failed,
    /// Executed and reverted.
    Reverted,
}

/// Event emitted by the fork.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ForkEvent {
    /// A page asked the wallet to send a transaction.
    Transaction {
        /// Id assigned by the fork side.
        id: TransactionId,
        /// The intercepted call.
        payload: TransactionPayload,
    },
    /// The transaction was submitted to the fork.
    TransactionSent {
        /// Target transaction.
        id: TransactionId,
        /// Checkpoint taken before sending.
        snapshot_id: String,
        /// Hash on the fork.
        transaction_hash: String,
    },
    /// The transaction was mined.
    TransactionMined {
        /// Target transaction.
        id: TransactionId,
        /// Outcome.
        status: MinedStatus,
    },
}

impl ForkEvent {
    /// Ledger action this event maps to.
    pub fn into_action(self) -> LedgerAction {
        match self {
            Self::Transaction { id, payload } => LedgerAction::Append { id, payload },
            Self::TransactionSent {
                id,
                snapshot_id,
                transaction_hash,
            } => LedgerAction::Confirm {
                id,
                snapshot_id,
                transaction_hash,
            },
            Self::TransactionMined { id, status } => match status {
                MinedStatus::Success => LedgerAction::Finish { id },
                MinedStatus::Failed => LedgerAction::Fail { id },
                MinedStatus::Reverted => LedgerAction::Revert { id },
            },
        }
    }
}

/// Apply one fork event to the ledger.
pub fn apply_fork_event(ledger: &Ledger, event: ForkEvent) -> Transition {
    ledger.dispatch(event.into_action())
}

/// Forward fork events into the ledger until the channel closes or the
/// token is cancelled. Returns the number of events applied.
#[tracing::instrument(skip_all, name = "fork_bridge")]
pub async fn run_bridge(
    ledger: Ledger,
    mut rx: mpsc::Receiver<ForkEvent>,
    cancel: CancellationToken,
) -> usize {
    let mut applied = 0;
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!(applied, "fork bridge cancelled");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else {
                    info!(applied, "fork stream closed");
                    break;
                };
                let transition = apply_fork_event(&ledger, event);
                debug!(?transition, "fork event applied");
                if transition.is_applied() {
                    applied += 1;
                }
            }
        }
    }
    applied
}
