//! RPC endpoint tracker.
//!
//! Watches outgoing requests of tracked tabs and classifies every distinct
//! JSON-RPC url by the chain id it serves. Classification is process-wide
//! and permanent: a url is probed at most once while it resolves, and its
//! chain id is never overwritten. Concurrent observations of an unresolved
//! url share one in-flight probe.
//!
//! Probes run as their own tasks, so they finish and populate the cache even
//! when the observer that started them goes away.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use pilot_core::{EventBus, Subscription, SubscriptionId, TabId};
use pilot_settings::ProbeSettings;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::errors::ProbeError;
use crate::probe::{ChainId, ChainProber};

/// Endpoint classification events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndpointEvent {
    /// A url was classified for the first time.
    NewEndpoint {
        /// Endpoint url.
        url: String,
        /// Chain it serves.
        chain_id: ChainId,
    },
    /// An already classified url was observed in a tab for the first time.
    TabLinked {
        /// Observing tab.
        tab_id: TabId,
        /// Endpoint url.
        url: String,
        /// Chain it serves.
        chain_id: ChainId,
    },
}

impl EndpointEvent {
    /// Chain id carried by the event.
    pub fn chain_id(&self) -> ChainId {
        match self {
            Self::NewEndpoint { chain_id, .. } | Self::TabLinked { chain_id, .. } => *chain_id,
        }
    }
}

type ProbeFuture = Shared<BoxFuture<'static, Option<ChainId>>>;

/// Process-wide endpoint tracker.
pub struct EndpointTracker {
    prober: Arc<dyn ChainProber>,
    settings: ProbeSettings,
    tracked_tabs: DashSet<TabId>,
    fork_urls: DashMap<String, usize>,
    chain_ids: DashMap<String, ChainId>,
    unclassifiable: DashSet<String>,
    in_flight: DashMap<String, ProbeFuture>,
    tab_urls: DashMap<TabId, BTreeSet<String>>,
    events: EventBus<EndpointEvent>,
}

impl EndpointTracker {
    /// Create a tracker.
    pub fn new(prober: Arc<dyn ChainProber>, settings: ProbeSettings) -> Arc<Self> {
        Arc::new(Self {
            prober,
            settings,
            tracked_tabs: DashSet::new(),
            fork_urls: DashMap::new(),
            chain_ids: DashMap::new(),
            unclassifiable: DashSet::new(),
            in_flight: DashMap::new(),
            tab_urls: DashMap::new(),
            events: EventBus::new(),
        })
    }

    /// Start observing a tab. Returns `false` if it was already tracked.
    pub fn track_tab(&self, tab: TabId) -> bool {
        self.tracked_tabs.insert(tab)
    }

    /// Stop observing a tab and forget the urls it used.
    pub fn untrack_tab(&self, tab: TabId) -> bool {
        let _ = self.tab_urls.remove(&tab);
        self.tracked_tabs.remove(&tab).is_some()
    }

    /// Whether the tab is observed.
    pub fn is_tracked(&self, tab: TabId) -> bool {
        self.tracked_tabs.contains(&tab)
    }

    /// Exclude a fork's own url from observation.
    pub fn register_fork_url(&self, url: &str) {
        *self.fork_urls.entry(url.to_owned()).or_insert(0) += 1;
    }

    /// Undo one [`register_fork_url`](Self::register_fork_url).
    pub fn unregister_fork_url(&self, url: &str) {
        if let Entry::Occupied(mut entry) = self.fork_urls.entry(url.to_owned()) {
            *entry.get_mut() -= 1;
            if *entry.get() == 0 {
                let _ = entry.remove();
            }
        }
    }

    fn is_fork_url(&self, url: &str) -> bool {
        self.fork_urls.contains_key(url)
    }

    /// Subscribe to classification events.
    pub fn subscribe(&self) -> Subscription<EndpointEvent> {
        self.events.subscribe()
    }

    /// Drop a subscription by identity.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Number of event subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }

    /// Cached chain id of `url`.
    pub fn chain_id_of(&self, url: &str) -> Option<ChainId> {
        self.chain_ids.get(url).map(|entry| *entry)
    }

    /// Whether `url` failed to classify and will not be probed again.
    pub fn is_unclassifiable(&self, url: &str) -> bool {
        self.unclassifiable.contains(url)
    }

    /// Observe one outgoing request.
    ///
    /// Ignored unless the tab is tracked, the method is POST, the body is a
    /// JSON-RPC request and the url is not a fork url. Returns the url's chain
    /// id once known.
    pub async fn observe(
        self: &Arc<Self>,
        tab: TabId,
        url: &str,
        method: &str,
        body: Option<&[u8]>,
    ) -> Option<ChainId> {
        if !self.is_tracked(tab)
            || !method.eq_ignore_ascii_case("POST")
            || !body.is_some_and(is_json_rpc_body)
            || self.is_fork_url(url)
        {
            return None;
        }

        let newly_linked = self
            .tab_urls
            .entry(tab)
            .or_default()
            .insert(url.to_owned());

        if let Some(chain_id) = self.chain_id_of(url) {
            if newly_linked {
                debug!(%tab, %url, chain_id, "known endpoint linked to tab");
                let _ = self.events.emit(&EndpointEvent::TabLinked {
                    tab_id: tab,
                    url: url.to_owned(),
                    chain_id,
                });
            }
            return Some(chain_id);
        }
        if self.is_unclassifiable(url) {
            return None;
        }

        self.resolve(url).await
    }

    async fn resolve(self: &Arc<Self>, url: &str) -> Option<ChainId> {
        let probe = match self.in_flight.entry(url.to_owned()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                // A probe may have settled between the cache check and here.
                if let Some(chain_id) = self.chain_id_of(url) {
                    return Some(chain_id);
                }
                if self.is_unclassifiable(url) {
                    return None;
                }
                let probe = self.spawn_probe(url.to_owned());
                let _ = entry.insert(probe.clone());
                probe
            }
        };
        probe.await
    }

    fn spawn_probe(self: &Arc<Self>, url: String) -> ProbeFuture {
        debug!(%url, "probing endpoint");
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let outcome = tokio::time::timeout(this.settings.timeout(), this.prober.chain_id(&url))
                .await
                .unwrap_or(Err(ProbeError::Timeout(this.settings.timeout_ms)));
            let result = match outcome {
                Ok(chain_id) => {
                    this.classify(&url, chain_id);
                    Some(chain_id)
                }
                Err(error) => {
                    warn!(%url, %error, "endpoint probe failed");
                    if !this.settings.retry_unclassified {
                        let _ = this.unclassifiable.insert(url.clone());
                    }
                    None
                }
            };
            let _ = this.in_flight.remove(&url);
            result
        });
        async move { task.await.ok().flatten() }.boxed().shared()
    }

    fn classify(&self, url: &str, chain_id: ChainId) {
        let first = match self.chain_ids.entry(url.to_owned()) {
            Entry::Vacant(entry) => {
                let _ = entry.insert(chain_id);
                true
            }
            Entry::Occupied(_) => false,
        };
        if first {
            info!(%url, chain_id, "endpoint classified");
            let _ = self.events.emit(&EndpointEvent::NewEndpoint {
                url: url.to_owned(),
                chain_id,
            });
        }
    }

    /// Per tracked tab, the observed urls classified as `chain_id`.
    pub fn tracked_urls_for_chain_id(&self, chain_id: ChainId) -> BTreeMap<TabId, BTreeSet<String>> {
        self.tab_urls
            .iter()
            .filter_map(|entry| {
                let urls: BTreeSet<String> = entry
                    .value()
                    .iter()
                    .filter(|url| self.chain_id_of(url) == Some(chain_id))
                    .cloned()
                    .collect();
                (!urls.is_empty()).then(|| (*entry.key(), urls))
            })
            .collect()
    }
}

/// Whether a request body is a JSON-RPC request or a non-empty batch of them.
pub fn is_json_rpc_body(body: &[u8]) -> bool {
    fn is_request(object: &Map<String, Value>) -> bool {
        object.get("method").is_some_and(Value::is_string) && object.contains_key("jsonrpc")
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => is_request(&object),
        Ok(Value::Array(items)) => {
            !items.is_empty() && items.iter().all(|item| item.as_object().is_some_and(is_request))
        }
        _ => false,
    }
}
