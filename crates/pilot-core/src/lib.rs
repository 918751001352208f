//! # pilot-core
//!
//! Foundation types shared by the Pilot crates:
//!
//! - **Branded IDs**: [`WindowId`], [`TabId`], [`RuleId`], [`TransactionId`]
//! - **Errors**: the [`ErrorKind`] taxonomy and the [`Classify`] trait
//! - **Events**: [`EventBus`], a typed publish/subscribe bus with removal
//!   by subscription identity
//! - **Logging**: `tracing` subscriber initialization

#![deny(unsafe_code)]

pub mod bus;
pub mod errors;
pub mod ids;
pub mod logging;

pub use bus::{EventBus, Subscription, SubscriptionId};
pub use errors::{Classify, ErrorKind};
pub use ids::{RuleId, TabId, TransactionId, WindowId};
