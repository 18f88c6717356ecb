use lodestar_browser::{
    BrowserEngine, BrowserError, BrowsingSession, EgressRotator, EgressRoute, PoolSettings,
    SessionFactory, SessionPool,
};
use lodestar_core::{BrowserConfig, EgressConfig, IdentityConfig};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct NullSession;

#[async_trait::async_trait]
impl BrowsingSession for NullSession {
    async fn close(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}

struct NullFactory;

#[async_trait::async_trait]
impl SessionFactory<NullSession> for NullFactory {
    async fn create(&self, _route: &EgressRoute) -> Result<NullSession, BrowserError> {
        Ok(NullSession)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_leases_are_exclusive() {
    let pool = SessionPool::new(
        Arc::new(NullFactory),
        PoolSettings {
            max_sessions: 3,
            retirement_ceiling: 5,
            acquire_timeout: Duration::from_secs(5),
            creation_attempts: 1,
            creation_backoff: Duration::from_millis(1),
        },
    );
    let egress = EgressRotator::from_config(&EgressConfig {
        max_sessions_per_identity: 1,
        identities: ["a", "b", "c", "d"]
            .iter()
            .map(|id| IdentityConfig {
                id: (*id).to_string(),
                endpoint: String::new(),
                class: "datacenter".to_string(),
            })
            .collect(),
        ..EgressConfig::default()
    });

    let in_flight: Arc<Mutex<(HashSet<uuid::Uuid>, HashSet<String>)>> = Arc::default();
    let mut tasks = Vec::new();
    for _ in 0..12 {
        let pool = pool.clone();
        let egress = egress.clone();
        let in_flight = Arc::clone(&in_flight);
        tasks.push(tokio::spawn(async move {
            for _ in 0..10 {
                // Identity first, then a session bound to its route.
                let identity = loop {
                    match egress.select() {
                        Ok(identity) => break identity,
                        Err(_) => tokio::task::yield_now().await,
                    }
                };
                let lease = pool.acquire(&identity.route()).await.expect("session");
                assert_eq!(lease.route().identity_id, identity.id());
                {
                    let mut guard = in_flight.lock().expect("lock");
                    assert!(guard.0.insert(lease.id()), "session leased twice");
                    assert!(guard.1.insert(identity.id().to_string()), "identity over cap");
                }
                tokio::task::yield_now().await;
                {
                    let mut guard = in_flight.lock().expect("lock");
                    guard.0.remove(&lease.id());
                    guard.1.remove(identity.id());
                }
                egress.report_outcome(identity, true);
                pool.release(lease);
            }
        }));
    }
    for task in tasks {
        task.await.expect("task");
    }

    let stats = pool.stats();
    assert_eq!(stats.leased, 0);
    assert!(stats.live <= 3);
    assert!(egress.snapshot().iter().all(|i| i.in_use == 0));
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_browser_engine_launch() {
    let engine = BrowserEngine::launch(&BrowserConfig::default()).await;
    assert!(engine.is_ok(), "Failed to launch browser engine");
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_pooled_chromium_session_renders() {
    let engine = BrowserEngine::launch(&BrowserConfig::default())
        .await
        .expect("launch");
    let pool = SessionPool::new(Arc::new(engine.session_factory()), PoolSettings::default());

    let lease = pool.acquire(&EgressRoute::direct()).await.expect("lease");
    let html = lease
        .handle()
        .content("data:text/html,<p>lodestar</p>")
        .await
        .expect("content");
    assert!(html.contains("lodestar"));

    pool.release(lease);
    pool.shutdown().await;
    assert_eq!(pool.stats().live, 0);
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_proxied_session_opens_in_own_context() {
    let engine = BrowserEngine::launch(&BrowserConfig::default())
        .await
        .expect("launch");
    let factory = engine.session_factory();
    let route = EgressRoute {
        identity_id: "local".to_string(),
        endpoint: "http://127.0.0.1:9".to_string(),
    };

    let session = factory.create(&route).await.expect("proxied session");
    // data: URLs never touch the network, so they render behind a dead proxy.
    let html = session
        .content("data:text/html,<p>proxied</p>")
        .await
        .expect("content");
    assert!(html.contains("proxied"));

    // Real navigation goes through the unreachable proxy and fails.
    assert!(session.content("http://example.com/").await.is_err());
    session.close().await.expect("close");
}
