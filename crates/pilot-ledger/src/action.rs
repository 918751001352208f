//! Ledger actions.
//!
//! [`LedgerAction`] is the closed set of transitions the ledger accepts.
//! The reducer in [`crate::state`] matches on it exhaustively.

use pilot_core::TransactionId;
use serde::{Deserialize, Serialize};

use crate::types::{ContractInfo, TransactionPayload};

/// A transition request for the ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LedgerAction {
    /// Record a new intercepted transaction at the tail of `pending`.
    Append {
        /// Identifier to assign.
        id: TransactionId,
        /// The intercepted call.
        payload: TransactionPayload,
    },
    /// Attach decoded contract information.
    Decode {
        /// Target transaction.
        id: TransactionId,
        /// Decoded information.
        contract_info: ContractInfo,
    },
    /// The head of `pending` was sent to the fork.
    Confirm {
        /// Target transaction.
        id: TransactionId,
        /// Fork checkpoint taken right before sending.
        snapshot_id: String,
        /// Hash on the fork.
        transaction_hash: String,
    },
    /// An executed transaction could not be executed.
    Fail {
        /// Target transaction.
        id: TransactionId,
    },
    /// An executed transaction was mined successfully.
    Finish {
        /// Target transaction.
        id: TransactionId,
    },
    /// An executed transaction was mined but reverted.
    Revert {
        /// Target transaction.
        id: TransactionId,
    },
    /// Remove an executed transaction; everything after it is re-queued.
    Rollback {
        /// Target transaction.
        id: TransactionId,
    },
    /// The fork has been reverted for the rollback in progress.
    ConfirmRollback {
        /// Transaction that was rolled back.
        id: TransactionId,
    },
    /// Replace one executed transaction with a list of new ones.
    Translate {
        /// Target transaction.
        id: TransactionId,
        /// Payloads that take its place, in order.
        replacements: Vec<TransactionPayload>,
    },
    /// Replace the whole executed list, re-executing from the first
    /// diverging entry.
    GlobalTranslate {
        /// New version of the batch.
        replacements: Vec<TransactionPayload>,
    },
    /// The fork is being recreated; re-queue everything.
    Refresh,
    /// The new fork is ready.
    CommitRefresh,
    /// Drop everything.
    Clear,
}

impl LedgerAction {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Append { .. } => "append",
            Self::Decode { .. } => "decode",
            Self::Confirm { .. } => "confirm",
            Self::Fail { .. } => "fail",
            Self::Finish { .. } => "finish",
            Self::Revert { .. } => "revert",
            Self::Rollback { .. } => "rollback",
            Self::ConfirmRollback { .. } => "confirm_rollback",
            Self::Translate { .. } => "translate",
            Self::GlobalTranslate { .. } => "global_translate",
            Self::Refresh => "refresh",
            Self::CommitRefresh => "commit_refresh",
            Self::Clear => "clear",
        }
    }
}

/// Outcome of dispatching an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The ledger changed.
    Applied,
    /// The action was valid but there was nothing to change.
    Unchanged,
    /// The action referenced a transaction that is not (or no longer) where
    /// the action expects it. The ledger is untouched.
    Stale,
}

impl Transition {
    /// Whether the ledger changed.
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}
