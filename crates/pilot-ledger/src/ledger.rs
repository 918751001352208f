//! Shared ledger handle.

use std::sync::Arc;

use parking_lot::RwLock;
use pilot_core::TransactionId;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::action::{LedgerAction, Transition};
use crate::state::LedgerState;
use crate::types::{Transaction, TransactionPayload};

/// Cloneable handle to one ledger.
///
/// All writes go through [`Ledger::dispatch`], which applies the action under
/// the write lock and bumps a revision counter watchers can await.
#[derive(Clone, Debug)]
pub struct Ledger {
    state: Arc<RwLock<LedgerState>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::from_state(LedgerState::new())
    }

    /// Ledger seeded with existing state.
    pub fn from_state(state: LedgerState) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(state)),
            revision: Arc::new(revision),
        }
    }

    /// Apply an action. Watchers are notified only when the ledger changed.
    pub fn dispatch(&self, action: LedgerAction) -> Transition {
        let name = action.name();
        let transition = self.state.write().apply(action);
        match transition {
            Transition::Applied => {
                self.revision.send_modify(|rev| *rev += 1);
                debug!(action = name, revision = *self.revision.borrow(), "ledger updated");
            }
            Transition::Unchanged => trace!(action = name, "ledger unchanged"),
            Transition::Stale => debug!(action = name, "stale ledger action ignored"),
        }
        transition
    }

    /// Record a new transaction and return its id.
    pub fn append(&self, payload: TransactionPayload) -> TransactionId {
        let id = TransactionId::new();
        let _ = self.dispatch(LedgerAction::Append {
            id: id.clone(),
            payload,
        });
        id
    }

    /// Copy of the executed list.
    pub fn executed(&self) -> Vec<Transaction> {
        self.state.read().executed.clone()
    }

    /// Copy of the pending list.
    pub fn pending(&self) -> Vec<Transaction> {
        self.state.read().pending.clone()
    }

    /// Transaction currently being rolled back.
    pub fn rollback_in_progress(&self) -> Option<Transaction> {
        self.state.read().rollback.clone()
    }

    /// Whether the fork is being recreated.
    pub fn is_refreshing(&self) -> bool {
        self.state.read().refreshing
    }

    /// Look a transaction up in either list.
    pub fn get(&self, id: &TransactionId) -> Option<Transaction> {
        self.state.read().find(id).cloned()
    }

    /// Copy of the whole state.
    pub fn snapshot(&self) -> LedgerState {
        self.state.read().clone()
    }

    /// Head of `pending` when sending is allowed.
    pub fn next_sendable(&self) -> Option<Transaction> {
        self.state.read().next_sendable().cloned()
    }

    /// Current revision.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Receiver that observes every applied change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}
