//! # pilot-ledger
//!
//! Ordered record of the transactions a page sent through the fork.
//!
//! - [`types`]: recorded transaction and payload types
//! - [`action`]: the closed set of [`LedgerAction`]s
//! - [`state`]: [`LedgerState`] and its reducer
//! - [`ledger`]: the shared [`Ledger`] handle with change notification
//! - [`stream`]: bridge from fork events to ledger actions
//! - [`driver`]: [`LedgerDriver`], which executes the ledger on the fork

#![deny(unsafe_code)]

pub mod action;
pub mod driver;
pub mod errors;
pub mod ledger;
pub mod state;
pub mod stream;
pub mod types;

pub use action::{LedgerAction, Transition};
pub use driver::{ForkExecutor, KeyValueStore, LedgerDriver, Step};
pub use errors::{LedgerError, Result};
pub use ledger::Ledger;
pub use state::LedgerState;
pub use stream::{ForkEvent, MinedStatus, apply_fork_event, run_bridge};
pub use types::{ContractInfo, Operation, Transaction, TransactionPayload, TransactionStatus};
