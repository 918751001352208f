//! Ledger state and its reducer.
//!
//! The ledger holds two ordered lists. `executed` contains transactions
//! already sent to the fork, `pending` those still waiting. Every executed
//! transaction was recorded before every pending one, and the transitions
//! below preserve that ordering: transactions only ever move from the head
//! of `pending` to the tail of `executed` (confirm), or from a cut point in
//! `executed` back to the front of `pending` (rollback, translate, refresh).

use pilot_core::TransactionId;
use serde::{Deserialize, Serialize};

use crate::action::{LedgerAction, Transition};
use crate::types::{Transaction, TransactionPayload, TransactionStatus};

/// Snapshot of the ledger.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerState {
    /// Transactions sent to the fork, oldest first.
    pub executed: Vec<Transaction>,
    /// Transactions waiting to be sent, oldest first.
    pub pending: Vec<Transaction>,
    /// Executed transaction currently being undone on the fork.
    pub rollback: Option<Transaction>,
    /// The fork is being recreated.
    pub refreshing: bool,
}

impl LedgerState {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a pending transaction may be sent right now.
    pub fn can_send(&self) -> bool {
        self.rollback.is_none() && !self.refreshing
    }

    /// Head of `pending`, if sending is currently allowed.
    pub fn next_sendable(&self) -> Option<&Transaction> {
        if self.can_send() {
            self.pending.first()
        } else {
            None
        }
    }

    /// Look a transaction up in either list.
    pub fn find(&self, id: &TransactionId) -> Option<&Transaction> {
        self.executed
            .iter()
            .chain(self.pending.iter())
            .find(|tx| &tx.id == id)
    }

    /// Whether the ledger holds nothing at all.
    pub fn is_empty(&self) -> bool {
        self.executed.is_empty() && self.pending.is_empty() && self.rollback.is_none()
    }

    fn executed_index(&self, id: &TransactionId) -> Option<usize> {
        self.executed.iter().position(|tx| &tx.id == id)
    }

    fn executed_mut(&mut self, id: &TransactionId) -> Option<&mut Transaction> {
        self.executed.iter_mut().find(|tx| &tx.id == id)
    }

    /// Remove `executed[index]` into the rollback slot and re-queue every
    /// executed transaction after it in front of `pending`.
    fn rollback_at(&mut self, index: usize) {
        let mut tail = self.executed.split_off(index);
        let target = tail.remove(0);
        let mut pending: Vec<Transaction> = tail.iter().map(Transaction::requeued).collect();
        pending.append(&mut self.pending);
        self.pending = pending;
        self.rollback = Some(target);
    }

    fn set_status(&mut self, id: &TransactionId, status: TransactionStatus) -> Transition {
        match self.executed_mut(id) {
            Some(tx) => {
                tx.status = status;
                Transition::Applied
            }
            None => Transition::Stale,
        }
    }

    /// Apply one action.
    pub fn apply(&mut self, action: LedgerAction) -> Transition {
        match action {
            LedgerAction::Append { id, payload } => {
                if self.find(&id).is_some() {
                    return Transition::Unchanged;
                }
                self.pending.push(Transaction::pending(id, payload));
                Transition::Applied
            }
            LedgerAction::Decode { id, contract_info } => {
                match self
                    .executed
                    .iter_mut()
                    .chain(self.pending.iter_mut())
                    .find(|tx| tx.id == id)
                {
                    Some(tx) => {
                        tx.contract_info = Some(contract_info);
                        Transition::Applied
                    }
                    None => Transition::Stale,
                }
            }
            LedgerAction::Confirm {
                id,
                snapshot_id,
                transaction_hash,
            } => {
                // Only the head may move, anything else would reorder the batch.
                // A send that raced a rollback or refresh ran against fork state
                // that is about to be discarded; the head is sent again later.
                if !self.can_send() || self.pending.first().is_none_or(|head| head.id != id) {
                    return Transition::Stale;
                }
                let mut tx = self.pending.remove(0);
                tx.status = TransactionStatus::Confirmed;
                tx.snapshot_id = Some(snapshot_id);
                tx.transaction_hash = Some(transaction_hash);
                self.executed.push(tx);
                Transition::Applied
            }
            LedgerAction::Fail { id } => self.set_status(&id, TransactionStatus::Failed),
            LedgerAction::Finish { id } => self.set_status(&id, TransactionStatus::Success),
            LedgerAction::Revert { id } => self.set_status(&id, TransactionStatus::Reverted),
            LedgerAction::Rollback { id } => match self.executed_index(&id) {
                Some(index) => {
                    self.rollback_at(index);
                    Transition::Applied
                }
                None => Transition::Stale,
            },
            LedgerAction::ConfirmRollback { id } => {
                if self.rollback.as_ref().is_some_and(|tx| tx.id == id) {
                    self.rollback = None;
                    Transition::Applied
                } else {
                    Transition::Stale
                }
            }
            LedgerAction::Translate { id, replacements } => match self.executed_index(&id) {
                Some(index) => {
                    self.rollback_at(index);
                    let mut pending = wrap_all(replacements);
                    pending.append(&mut self.pending);
                    self.pending = pending;
                    Transition::Applied
                }
                None => Transition::Stale,
            },
            LedgerAction::GlobalTranslate { replacements } => self.global_translate(replacements),
            LedgerAction::Refresh => {
                if self.refreshing && self.executed.is_empty() {
                    return Transition::Unchanged;
                }
                let mut pending: Vec<Transaction> =
                    self.executed.drain(..).map(|tx| tx.requeued()).collect();
                pending.append(&mut self.pending);
                self.pending = pending;
                self.refreshing = true;
                Transition::Applied
            }
            LedgerAction::CommitRefresh => {
                if self.refreshing {
                    self.refreshing = false;
                    Transition::Applied
                } else {
                    Transition::Unchanged
                }
            }
            LedgerAction::Clear => {
                if *self == Self::default() {
                    Transition::Unchanged
                } else {
                    *self = Self::default();
                    Transition::Applied
                }
            }
        }
    }

    /// Replace the batch with `replacements` from the first position where
    /// it diverges from `executed`.
    ///
    /// The replacements go in front of the existing `pending` rather than
    /// after it. They stand in for executed transactions, which were all
    /// recorded before anything still pending, so queueing them behind
    /// `pending` would break the executed-before-pending ordering once they
    /// are sent.
    fn global_translate(&mut self, replacements: Vec<TransactionPayload>) -> Transition {
        let longest = self.executed.len().max(replacements.len());
        let Some(first_diff) = (0..longest).find(|&i| {
            self.executed.get(i).map(|tx| &tx.payload) != replacements.get(i)
        }) else {
            return Transition::Unchanged;
        };

        if first_diff < self.executed.len() {
            // The diverging executed entries are replaced, not re-queued.
            self.executed.truncate(first_diff + 1);
            self.rollback = self.executed.pop();
        }

        let mut pending = wrap_all(replacements.into_iter().skip(first_diff));
        pending.append(&mut self.pending);
        self.pending = pending;
        Transition::Applied
    }
}

fn wrap_all(payloads: impl IntoIterator<Item = TransactionPayload>) -> Vec<Transaction> {
    payloads
        .into_iter()
        .map(|payload| Transaction::pending(TransactionId::new(), payload))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
