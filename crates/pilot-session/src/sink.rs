//! Host collaborators: where rules and UI notifications go.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use pilot_core::{RuleId, TabId, WindowId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::SinkError;
use crate::rules::RedirectRule;

/// Host rule engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleSink: Send + Sync {
    /// Remove `remove_ids`, then install `add`, as one update.
    async fn install_rules(&self, add: Vec<RedirectRule>, remove_ids: Vec<RuleId>) -> Result<(), SinkError>;
}

/// UI feedback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Notification {
    /// The tab is now routed through its window's session.
    Connected {
        /// Tab.
        tab_id: TabId,
    },
    /// The tab left its session.
    Disconnected {
        /// Tab.
        tab_id: TabId,
    },
    /// A window's redirect rules were replaced.
    RulesUpdated {
        /// Window.
        window_id: WindowId,
        /// Number of installed rules.
        count: usize,
    },
}

/// Receives UI notifications. Must not block.
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification.
    fn notify(&self, notification: Notification);
}

/// Notification sink that only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifications;

impl NotificationSink for TracingNotifications {
    fn notify(&self, notification: Notification) {
        debug!(?notification, "notification");
    }
}

/// In-process rule engine keyed by rule id, with the host's
/// remove-then-add semantics.
#[derive(Debug, Default)]
pub struct MemoryRuleSink {
    rules: Mutex<BTreeMap<RuleId, RedirectRule>>,
}

impl MemoryRuleSink {
    /// Empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installed rules, ordered by id.
    pub fn rules(&self) -> Vec<RedirectRule> {
        self.rules.lock().values().cloned().collect()
    }

    /// Installed rule with `id`.
    pub fn get(&self, id: RuleId) -> Option<RedirectRule> {
        self.rules.lock().get(&id).cloned()
    }

    /// Number of installed rules.
    pub fn len(&self) -> usize {
        self.rules.lock().len()
    }

    /// Whether no rule is installed.
    pub fn is_empty(&self) -> bool {
        self.rules.lock().is_empty()
    }
}

#[async_trait]
impl RuleSink for MemoryRuleSink {
    async fn install_rules(&self, add: Vec<RedirectRule>, remove_ids: Vec<RuleId>) -> Result<(), SinkError> {
        let mut rules = self.rules.lock();
        let mut next = rules.clone();
        for id in &remove_ids {
            let _ = next.remove(id);
        }
        for rule in add {
            if next.contains_key(&rule.id) {
                return Err(SinkError::Rejected(format!("duplicate rule id {}", rule.id)));
            }
            let _ = next.insert(rule.id, rule);
        }
        *rules = next;
        info!(removed = remove_ids.len(), installed = rules.len(), "rules updated");
        Ok(())
    }
}
