//! Session registry.
//!
//! Owns every live session, keyed by window. Host tab events and fork control
//! requests enter here and are routed to the owning session.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use pilot_core::{TabId, WindowId};
use tracing::{info, instrument};

use crate::errors::{Result, SessionError};
use crate::probe::ChainId;
use crate::rules::RedirectRule;
use crate::session::{Fork, Session, SessionContext};
use crate::sink::{NotificationSink, RuleSink};
use crate::tracker::EndpointTracker;

/// All live sessions.
pub struct SessionRegistry {
    sessions: DashMap<WindowId, Arc<Session>>,
    ctx: SessionContext,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new(
        tracker: Arc<EndpointTracker>,
        rules: Arc<dyn RuleSink>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            ctx: SessionContext {
                tracker,
                rules,
                notifications,
            },
        }
    }

    /// The shared endpoint tracker.
    pub fn tracker(&self) -> &Arc<EndpointTracker> {
        &self.ctx.tracker
    }

    fn session(&self, window: WindowId) -> Option<Arc<Session>> {
        self.sessions.get(&window).map(|entry| Arc::clone(entry.value()))
    }

    fn require(&self, window: WindowId) -> Result<Arc<Session>> {
        self.session(window)
            .ok_or(SessionError::SessionNotFound(window))
    }

    /// Open (or reuse) the window's session, optionally tracking a tab.
    #[instrument(skip(self), fields(window = %window))]
    pub async fn start_session(&self, window: WindowId, tab: Option<TabId>) -> Result<()> {
        let session = {
            let entry = self.sessions.entry(window).or_insert_with(|| {
                info!("session started");
                Session::new(window)
            });
            Arc::clone(entry.value())
        };
        if let Some(tab) = tab {
            let _ = session.track_tab(&self.ctx, tab).await?;
        }
        Ok(())
    }

    /// Close the window's session. Same as [`delete_session`](Self::delete_session).
    pub async fn stop_session(&self, window: WindowId) -> bool {
        self.delete_session(window).await
    }

    /// Tear down the window's session. Returns `false` if there was none.
    #[instrument(skip(self), fields(window = %window))]
    pub async fn delete_session(&self, window: WindowId) -> bool {
        let Some((_, session)) = self.sessions.remove(&window) else {
            return false;
        };
        session.delete(&self.ctx).await;
        true
    }

    /// A tab became active; it joins the window's session if there is one.
    #[instrument(skip(self), fields(tab = %tab, window = %window))]
    pub async fn tab_activated(&self, tab: TabId, window: WindowId) -> Result<bool> {
        match self.session(window) {
            Some(session) => session.track_tab(&self.ctx, tab).await,
            None => Ok(false),
        }
    }

    /// A tab was closed.
    #[instrument(skip(self), fields(tab = %tab, window = %window))]
    pub async fn tab_removed(&self, tab: TabId, window: WindowId) -> Result<bool> {
        match self.session(window) {
            Some(session) => session.untrack_tab(&self.ctx, tab).await,
            None => Ok(false),
        }
    }

    /// A tab started loading a new page.
    pub async fn tab_updated_to_loading(&self, tab: TabId, window: WindowId) -> bool {
        match self.session(window) {
            Some(session) => session.tab_reloading(&self.ctx, tab).await,
            None => false,
        }
    }

    /// Forward one outgoing request to the endpoint tracker.
    pub async fn observe_request(
        &self,
        tab: TabId,
        url: &str,
        method: &str,
        body: Option<&[u8]>,
    ) -> Option<ChainId> {
        self.ctx.tracker.observe(tab, url, method, body).await
    }

    /// Attach a fork to the window's session.
    #[instrument(skip(self, rpc_url), fields(window = %window))]
    pub async fn create_fork(&self, window: WindowId, chain_id: ChainId, rpc_url: String) -> Result<()> {
        self.require(window)?
            .create_fork(&self.ctx, chain_id, rpc_url)
            .await
    }

    /// Replace the fork's rpc url.
    #[instrument(skip(self, rpc_url), fields(window = %window))]
    pub async fn update_fork(&self, window: WindowId, rpc_url: String) -> Result<()> {
        self.require(window)?.update_fork(&self.ctx, rpc_url).await
    }

    /// Detach the fork. No-op without one.
    #[instrument(skip(self), fields(window = %window))]
    pub async fn clear_fork(&self, window: WindowId) -> Result<()> {
        self.require(window)?.clear_fork(&self.ctx).await
    }

    /// The window's fork.
    pub async fn get_fork(&self, window: WindowId) -> Result<Fork> {
        self.require(window)?
            .fork()
            .await
            .ok_or(SessionError::NotForked(window))
    }

    /// Windows with a live session, ascending.
    pub fn session_ids(&self) -> Vec<WindowId> {
        let mut ids: Vec<WindowId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Tabs tracked by the window's session.
    pub async fn tracked_tabs(&self, window: WindowId) -> Result<BTreeSet<TabId>> {
        Ok(self.require(window)?.tabs().await)
    }

    /// Rules installed for the window.
    pub async fn installed_rules(&self, window: WindowId) -> Result<Vec<RedirectRule>> {
        Ok(self.require(window)?.installed_rules().await)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pilot_core::{Classify, ErrorKind};
    use pilot_settings::ProbeSettings;

    use super::*;
    use crate::probe::MockChainProber;
    use crate::sink::{MemoryRuleSink, TracingNotifications};

    fn registry() -> (SessionRegistry, Arc<MemoryRuleSink>) {
        let mut prober = MockChainProber::new();
        let _ = prober.expect_chain_id().returning(|_| Ok(1));
        let rules = Arc::new(MemoryRuleSink::new());
        let registry = SessionRegistry::new(
            EndpointTracker::new(Arc::new(prober), ProbeSettings::default()),
            rules.clone(),
            Arc::new(TracingNotifications),
        );
        (registry, rules)
    }

    #[tokio::test]
    async fn start_session_is_reused() {
        let (registry, _) = registry();
        let window = WindowId::new(1);
        registry.start_session(window, Some(TabId::new(1))).await.unwrap();
        registry.start_session(window, Some(TabId::new(2))).await.unwrap();
        assert_eq!(registry.session_ids(), vec![window]);
        assert_eq!(registry.tracked_tabs(window).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn tab_events_without_session_are_ignored() {
        let (registry, _) = registry();
        let window = WindowId::new(5);
        assert!(!registry.tab_activated(TabId::new(1), window).await.unwrap());
        assert!(!registry.tab_removed(TabId::new(1), window).await.unwrap());
        assert!(!registry.tab_updated_to_loading(TabId::new(1), window).await);
        assert!(!registry.tracker().is_tracked(TabId::new(1)));
    }

    #[tokio::test]
    async fn fork_ops_on_unknown_window_are_invariant_violations() {
        let (registry, _) = registry();
        let err = registry
            .create_fork(WindowId::new(3), 1, "https://fork.local".into())
            .await
            .unwrap_err();
        assert_matches!(err, SessionError::SessionNotFound(_));
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }

    #[tokio::test]
    async fn get_fork_requires_fork() {
        let (registry, _) = registry();
        let window = WindowId::new(1);
        registry.start_session(window, None).await.unwrap();
        assert_matches!(registry.get_fork(window).await, Err(SessionError::NotForked(_)));

        registry.create_fork(window, 1, "https://fork.local".into()).await.unwrap();
        assert_eq!(
            registry.get_fork(window).await.unwrap(),
            Fork {
                chain_id: 1,
                rpc_url: "https://fork.local".into()
            }
        );
    }

    #[tokio::test]
    async fn delete_session_is_safe_after_tabs_left() {
        let (registry, rules) = registry();
        let window = WindowId::new(1);
        let tab = TabId::new(1);
        registry.start_session(window, Some(tab)).await.unwrap();
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"eth_call"}"#;
        let _ = registry
            .observe_request(tab, "https://rpc.example/1", "POST", Some(body))
            .await;
        registry.create_fork(window, 1, "https://fork.local".into()).await.unwrap();
        assert_eq!(rules.len(), 1);

        assert!(registry.tab_removed(tab, window).await.unwrap());
        assert!(rules.is_empty());

        assert!(registry.delete_session(window).await);
        assert!(!registry.delete_session(window).await);
        assert!(registry.session_ids().is_empty());
        assert_matches!(
            registry.tracked_tabs(window).await,
            Err(SessionError::SessionNotFound(_))
        );
    }
}
