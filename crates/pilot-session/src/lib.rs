//! # pilot-session
//!
//! Per-window sessions that redirect a page's wallet RPC traffic to a
//! simulation fork.
//!
//! - [`tracker`]: classifies the JSON-RPC urls tracked tabs talk to
//! - [`rules`]: compiles a session's redirect rules
//! - [`session`] / [`registry`]: session state, fork lifecycle, tab events
//! - [`probe`] / [`sink`]: host collaborators

#![deny(unsafe_code)]

pub mod errors;
pub mod probe;
pub mod registry;
pub mod rules;
pub mod session;
pub mod sink;
pub mod tracker;

pub use errors::{ProbeError, Result, SessionError, SinkError};
pub use probe::{ChainId, ChainProber, JsonRpcProber};
pub use registry::SessionRegistry;
pub use rules::{RedirectRule, RuleDiff, compile, rule_id};
pub use session::{Fork, Session, SessionContext};
pub use sink::{MemoryRuleSink, Notification, NotificationSink, RuleSink, TracingNotifications};
pub use tracker::{EndpointEvent, EndpointTracker, is_json_rpc_body};
