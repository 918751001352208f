//! Per-window session.
//!
//! All mutation of one session (tab set, fork, installed rules) happens under
//! its async mutex, so operations on the same window are serialized while
//! different windows proceed independently. Every state change recompiles
//! the window's rules from the state it finds under the lock.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use pilot_core::{SubscriptionId, TabId, WindowId};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{Result, SessionError};
use crate::probe::ChainId;
use crate::rules::{RedirectRule, RuleDiff, compile};
use crate::sink::{Notification, NotificationSink, RuleSink};
use crate::tracker::{EndpointEvent, EndpointTracker};

/// Simulation fork attached to a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fork {
    /// Chain the fork simulates. Fixed for the fork's lifetime.
    pub chain_id: ChainId,
    /// Fork rpc url redirected requests go to.
    pub rpc_url: String,
}

/// Collaborators shared by all sessions.
#[derive(Clone)]
pub struct SessionContext {
    /// Process-wide endpoint tracker.
    pub tracker: Arc<EndpointTracker>,
    /// Host rule engine.
    pub rules: Arc<dyn RuleSink>,
    /// UI feedback.
    pub notifications: Arc<dyn NotificationSink>,
}

struct EndpointListener {
    subscription: SubscriptionId,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct SessionState {
    tabs: BTreeSet<TabId>,
    fork: Option<Fork>,
    installed: Vec<RedirectRule>,
    listener: Option<EndpointListener>,
    deleted: bool,
}

/// One browser window's session.
pub struct Session {
    window_id: WindowId,
    state: Mutex<SessionState>,
}

impl Session {
    /// New empty session.
    pub fn new(window_id: WindowId) -> Arc<Self> {
        Arc::new(Self {
            window_id,
            state: Mutex::new(SessionState::default()),
        })
    }

    /// Window this session belongs to.
    pub fn window_id(&self) -> WindowId {
        self.window_id
    }

    /// Current fork.
    pub async fn fork(&self) -> Option<Fork> {
        self.state.lock().await.fork.clone()
    }

    /// Tracked tabs.
    pub async fn tabs(&self) -> BTreeSet<TabId> {
        self.state.lock().await.tabs.clone()
    }

    /// Rules currently installed for this window.
    pub async fn installed_rules(&self) -> Vec<RedirectRule> {
        self.state.lock().await.installed.clone()
    }

    /// Whether the session has been torn down.
    pub async fn is_deleted(&self) -> bool {
        self.state.lock().await.deleted
    }

    fn ensure_live(&self, state: &SessionState) -> Result<()> {
        if state.deleted {
            Err(SessionError::SessionNotFound(self.window_id))
        } else {
            Ok(())
        }
    }

    /// Start tracking a tab. Returns `false` if it was already tracked.
    pub async fn track_tab(&self, ctx: &SessionContext, tab: TabId) -> Result<bool> {
        let mut state = self.state.lock().await;
        self.ensure_live(&state)?;
        if !state.tabs.insert(tab) {
            return Ok(false);
        }
        let _ = ctx.tracker.track_tab(tab);
        ctx.notifications.notify(Notification::Connected { tab_id: tab });
        debug!(window = %self.window_id, %tab, "tab tracked");
        self.recompile(ctx, &mut state).await?;
        Ok(true)
    }

    /// Stop tracking a tab. Returns `false` if it was not tracked.
    pub async fn untrack_tab(&self, ctx: &SessionContext, tab: TabId) -> Result<bool> {
        let mut state = self.state.lock().await;
        self.ensure_live(&state)?;
        if !state.tabs.remove(&tab) {
            return Ok(false);
        }
        let _ = ctx.tracker.untrack_tab(tab);
        ctx.notifications.notify(Notification::Disconnected { tab_id: tab });
        debug!(window = %self.window_id, %tab, "tab untracked");
        self.recompile(ctx, &mut state).await?;
        Ok(true)
    }

    /// Re-announce a tracked tab after it started loading a new page.
    pub async fn tab_reloading(&self, ctx: &SessionContext, tab: TabId) -> bool {
        let state = self.state.lock().await;
        let tracked = !state.deleted && state.tabs.contains(&tab);
        if tracked {
            ctx.notifications.notify(Notification::Connected { tab_id: tab });
        }
        tracked
    }

    /// Attach a fork and start redirecting.
    pub async fn create_fork(
        self: &Arc<Self>,
        ctx: &SessionContext,
        chain_id: ChainId,
        rpc_url: String,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_live(&state)?;
        if state.fork.is_some() {
            return Err(SessionError::AlreadyForked(self.window_id));
        }
        ctx.tracker.register_fork_url(&rpc_url);
        state.listener = Some(self.spawn_listener(ctx, chain_id));
        info!(window = %self.window_id, chain_id, %rpc_url, "fork created");
        state.fork = Some(Fork { chain_id, rpc_url });
        self.recompile(ctx, &mut state).await
    }

    /// Point the fork at a new rpc url. The chain id is kept.
    pub async fn update_fork(&self, ctx: &SessionContext, rpc_url: String) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_live(&state)?;
        let Some(fork) = state.fork.as_mut() else {
            return Err(SessionError::NotForked(self.window_id));
        };
        ctx.tracker.unregister_fork_url(&fork.rpc_url);
        ctx.tracker.register_fork_url(&rpc_url);
        info!(window = %self.window_id, chain_id = fork.chain_id, %rpc_url, "fork updated");
        fork.rpc_url = rpc_url;
        self.recompile(ctx, &mut state).await
    }

    /// Detach the fork and drop its rules. No-op without a fork.
    pub async fn clear_fork(&self, ctx: &SessionContext) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_live(&state)?;
        let Some(fork) = state.fork.take() else {
            return Ok(());
        };
        ctx.tracker.unregister_fork_url(&fork.rpc_url);
        if let Some(listener) = state.listener.take() {
            stop_listener(ctx, listener);
        }
        info!(window = %self.window_id, chain_id = fork.chain_id, "fork cleared");
        self.recompile(ctx, &mut state).await
    }

    /// Recompile after an endpoint event.
    pub async fn refresh_rules(&self, ctx: &SessionContext) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_live(&state)?;
        self.recompile(ctx, &mut state).await
    }

    /// Tear the session down: disconnect tabs, stop listening, remove rules.
    ///
    /// Tolerates partial state and never fails; a rule sink error is logged.
    pub async fn delete(&self, ctx: &SessionContext) {
        let mut state = self.state.lock().await;
        if state.deleted {
            return;
        }
        state.deleted = true;

        for tab in std::mem::take(&mut state.tabs) {
            let _ = ctx.tracker.untrack_tab(tab);
            ctx.notifications.notify(Notification::Disconnected { tab_id: tab });
        }
        if let Some(listener) = state.listener.take() {
            stop_listener(ctx, listener);
        }
        if let Some(fork) = state.fork.take() {
            ctx.tracker.unregister_fork_url(&fork.rpc_url);
        }

        let installed = std::mem::take(&mut state.installed);
        if !installed.is_empty() {
            let diff = RuleDiff::replace(&installed, &[]);
            if let Err(error) = ctx.rules.install_rules(diff.add, diff.remove_ids).await {
                warn!(window = %self.window_id, %error, "failed to remove rules of deleted session");
            }
        }
        info!(window = %self.window_id, "session deleted");
    }

    async fn recompile(&self, ctx: &SessionContext, state: &mut SessionState) -> Result<()> {
        let endpoints = state
            .fork
            .as_ref()
            .map(|fork| ctx.tracker.tracked_urls_for_chain_id(fork.chain_id))
            .unwrap_or_default();
        let next = compile(state.fork.as_ref(), &state.tabs, &endpoints);
        if next == state.installed {
            return Ok(());
        }

        let diff = RuleDiff::replace(&state.installed, &next);
        if let Err(error) = ctx.rules.install_rules(diff.add, diff.remove_ids).await {
            warn!(window = %self.window_id, %error, "failed to install rules");
            return Err(error.into());
        }
        debug!(window = %self.window_id, count = next.len(), "rules installed");
        ctx.notifications.notify(Notification::RulesUpdated {
            window_id: self.window_id,
            count: next.len(),
        });
        state.installed = next;
        Ok(())
    }

    fn spawn_listener(self: &Arc<Self>, ctx: &SessionContext, chain_id: ChainId) -> EndpointListener {
        let mut events = ctx.tracker.subscribe();
        let subscription = events.id();
        let session: Weak<Self> = Arc::downgrade(self);
        let ctx = ctx.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event.chain_id() != chain_id {
                    continue;
                }
                let Some(session) = session.upgrade() else {
                    break;
                };
                if let EndpointEvent::NewEndpoint { url, .. } = &event {
                    debug!(window = %session.window_id, %url, "new endpoint for fork chain");
                }
                if let Err(error) = session.refresh_rules(&ctx).await {
                    warn!(window = %session.window_id, %error, "recompile after endpoint event failed");
                }
            }
        });
        EndpointListener { subscription, task }
    }
}

fn stop_listener(ctx: &SessionContext, listener: EndpointListener) {
    let _ = ctx.tracker.unsubscribe(listener.subscription);
    listener.task.abort();
}
