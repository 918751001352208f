//! End-to-end tests: tab traffic → JSON-RPC probe over HTTP → rule
//! compilation → host rule installation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pilot_core::{TabId, WindowId};
use pilot_session::{
    EndpointTracker, JsonRpcProber, MemoryRuleSink, Notification, NotificationSink, RedirectRule,
    SessionRegistry, rule_id,
};
use pilot_settings::ProbeSettings;

const FORK_URL: &str = "https://fork.local";
const CALL: &[u8] = br#"{"jsonrpc":"2.0","id":7,"method":"eth_call","params":[]}"#;

#[derive(Default)]
struct Notifications(Mutex<Vec<Notification>>);

impl NotificationSink for Notifications {
    fn notify(&self, notification: Notification) {
        self.0.lock().push(notification);
    }
}

struct World {
    server: MockServer,
    registry: SessionRegistry,
    rules: Arc<MemoryRuleSink>,
    notifications: Arc<Notifications>,
}

impl World {
    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.server.uri())
    }

    async fn observe(&self, tab: TabId, endpoint: &str) -> Option<u64> {
        self.registry
            .observe_request(tab, &self.url(endpoint), "POST", Some(CALL))
            .await
    }
}

async fn chain(server: &MockServer, endpoint: &str, chain_id: &str) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": chain_id })),
        )
        .mount(server)
        .await;
}

async fn world_with(settings: ProbeSettings) -> World {
    let server = MockServer::start().await;
    chain(&server, "/1", "0x1").await;
    chain(&server, "/gnosis", "0x64").await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x1" }))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let prober = JsonRpcProber::new(&settings).unwrap();
    let rules = Arc::new(MemoryRuleSink::new());
    let notifications = Arc::new(Notifications::default());
    let registry = SessionRegistry::new(
        EndpointTracker::new(Arc::new(prober), settings),
        rules.clone(),
        notifications.clone(),
    );
    World {
        server,
        registry,
        rules,
        notifications,
    }
}

async fn world() -> World {
    world_with(ProbeSettings::default()).await
}

async fn wait_for_rules(world: &World, window: WindowId, count: usize) -> Vec<RedirectRule> {
    for _ in 0..200 {
        let rules = world.registry.installed_rules(window).await.unwrap();
        if rules.len() == count {
            return rules;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("window {window} never reached {count} rules");
}

#[tokio::test]
async fn endpoint_seen_before_fork_is_redirected() {
    let world = world().await;
    let window = WindowId::new(1);
    let tab = TabId::new(11);

    world.registry.start_session(window, Some(tab)).await.unwrap();
    assert_eq!(world.observe(tab, "/1").await, Some(1));
    world
        .registry
        .create_fork(window, 1, FORK_URL.into())
        .await
        .unwrap();

    let url = world.url("/1");
    assert_eq!(
        world.registry.installed_rules(window).await.unwrap(),
        vec![RedirectRule {
            id: rule_id(&url),
            match_url: url.clone(),
            target_url: FORK_URL.into(),
            scope_tab_ids: vec![tab],
        }]
    );
    assert_eq!(world.rules.rules(), world.registry.installed_rules(window).await.unwrap());
}

#[tokio::test]
async fn endpoint_seen_after_fork_is_redirected_live() {
    let world = world().await;
    let window = WindowId::new(1);
    let tab = TabId::new(11);

    world.registry.start_session(window, Some(tab)).await.unwrap();
    world
        .registry
        .create_fork(window, 1, FORK_URL.into())
        .await
        .unwrap();
    assert!(world.rules.is_empty());

    let _ = world.observe(tab, "/1").await;
    let _ = world.observe(tab, "/gnosis").await;
    let rules = wait_for_rules(&world, window, 1).await;
    assert_eq!(rules[0].match_url, world.url("/1"));

    // a second tab joining later extends the scope
    let other = TabId::new(12);
    assert!(world.registry.tab_activated(other, window).await.unwrap());
    let _ = world.observe(other, "/1").await;
    for _ in 0..200 {
        let rules = world.registry.installed_rules(window).await.unwrap();
        if rules[0].scope_tab_ids == vec![tab, other] {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scope never extended to the second tab");
}

#[tokio::test]
async fn recompiling_unchanged_state_is_stable() {
    let world = world().await;
    let window = WindowId::new(1);
    let tab = TabId::new(1);
    world.registry.start_session(window, Some(tab)).await.unwrap();
    let _ = world.observe(tab, "/1").await;
    world.registry.create_fork(window, 1, FORK_URL.into()).await.unwrap();
    let before = world.registry.installed_rules(window).await.unwrap();

    world.registry.clear_fork(window).await.unwrap();
    assert!(world.rules.is_empty());
    world.registry.create_fork(window, 1, FORK_URL.into()).await.unwrap();
    assert_eq!(world.registry.installed_rules(window).await.unwrap(), before);
}

#[tokio::test]
async fn unclassifiable_endpoint_does_not_block_others() {
    let world = world().await;
    let window = WindowId::new(1);
    let tab = TabId::new(1);
    world.registry.start_session(window, Some(tab)).await.unwrap();
    assert_eq!(world.observe(tab, "/broken").await, None);
    assert_eq!(world.observe(tab, "/1").await, Some(1));
    world.registry.create_fork(window, 1, FORK_URL.into()).await.unwrap();

    let rules = world.registry.installed_rules(window).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].match_url, world.url("/1"));
    assert!(world.registry.tracker().is_unclassifiable(&world.url("/broken")));
}

#[tokio::test]
async fn sessions_are_isolated() {
    let world = world().await;
    let (w1, w2) = (WindowId::new(1), WindowId::new(2));
    let (t1, t2) = (TabId::new(1), TabId::new(2));
    world.registry.start_session(w1, Some(t1)).await.unwrap();
    world.registry.start_session(w2, Some(t2)).await.unwrap();
    let _ = world.observe(t1, "/1").await;
    let _ = world.observe(t2, "/1").await;

    world.registry.create_fork(w1, 1, FORK_URL.into()).await.unwrap();
    let rules = world.registry.installed_rules(w1).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].scope_tab_ids, vec![t1]);
    assert!(world.registry.installed_rules(w2).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_session_mid_probe_still_fills_cache() {
    let world = world().await;
    let window = WindowId::new(1);
    let tab = TabId::new(1);
    world.registry.start_session(window, Some(tab)).await.unwrap();
    world.registry.create_fork(window, 1, FORK_URL.into()).await.unwrap();

    let url = world.url("/slow");
    let tracker = Arc::clone(world.registry.tracker());
    let observer = {
        let url = url.clone();
        tokio::spawn(async move { tracker.observe(tab, &url, "POST", Some(CALL)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    world.notifications.0.lock().clear();
    assert!(world.registry.delete_session(window).await);
    assert_eq!(
        *world.notifications.0.lock(),
        vec![Notification::Disconnected { tab_id: tab }]
    );

    assert_eq!(observer.await.unwrap(), Some(1));
    assert_eq!(world.registry.tracker().chain_id_of(&url), Some(1));
    assert!(world.rules.is_empty());
    assert!(world.registry.session_ids().is_empty());
}

#[tokio::test]
async fn probe_timeout_leaves_endpoint_unclassified() {
    let world = world_with(ProbeSettings {
        timeout_ms: 50,
        ..ProbeSettings::default()
    })
    .await;
    let tab = TabId::new(1);
    world.registry.start_session(WindowId::new(1), Some(tab)).await.unwrap();
    assert_eq!(world.observe(tab, "/slow").await, None);
    assert_eq!(world.registry.tracker().chain_id_of(&world.url("/slow")), None);
}

#[tokio::test]
async fn tab_lifecycle_notifications() {
    let world = world().await;
    let window = WindowId::new(1);
    let tab = TabId::new(5);
    world.registry.start_session(window, None).await.unwrap();
    assert!(world.registry.tab_activated(tab, window).await.unwrap());
    assert!(world.registry.tab_updated_to_loading(tab, window).await);
    assert!(world.registry.tab_removed(tab, window).await.unwrap());

    assert_eq!(
        *world.notifications.0.lock(),
        vec![
            Notification::Connected { tab_id: tab },
            Notification::Connected { tab_id: tab },
            Notification::Disconnected { tab_id: tab },
        ]
    );
}
