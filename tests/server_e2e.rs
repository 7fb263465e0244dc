//! End-to-end tests over real sockets: gateway listener plus admin API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use policy_gateway::admin::{setup_admin_router, AdminState};
use policy_gateway::lifecycle::shutdown::wait;
use policy_gateway::{GatewayRouter, HttpServer, PolicyRegistry, Shutdown};
use tokio::net::TcpListener;

mod common;
use common::{MockRequest, MockResponse};

const ADMIN_KEY: &str = "test-admin-key";

fn yaml(backend: std::net::SocketAddr, body_route: &str) -> String {
    format!(
        r#"
environment: test
health_check: {{enabled: false}}
backend_groups:
  - name: web
    targets: ["http://{backend}"]
routes:
  - id: {body_route}
    patterns: [{{path: "/api/*"}}, {{path: "/v1/:thing"}}]
    policies:
      - name: logging
      - name: header-transform
        params: {{request: {{set: {{x-route: {body_route}}}}}}}
    backend_group: web
"#
    )
}

struct Running {
    proxy: String,
    admin: String,
    shutdown: Arc<Shutdown>,
    server: tokio::task::JoinHandle<()>,
}

async fn start(config_yaml: &str, config_path: Option<std::path::PathBuf>) -> (Running, Arc<GatewayRouter>) {
    let config = common::config(config_yaml);
    let router = Arc::new(GatewayRouter::new(config.clone(), PolicyRegistry::with_builtins()).unwrap());
    let shutdown = Arc::new(Shutdown::new());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy = format!("http://{}", listener.local_addr().unwrap());
    let server = HttpServer::new(router.clone(), &config, shutdown.clone());
    let server = tokio::spawn(async move {
        server.run(listener, None).await.unwrap();
    });

    let admin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let admin = format!("http://{}", admin_listener.local_addr().unwrap());
    let app = setup_admin_router(AdminState {
        router: router.clone(),
        api_key: ADMIN_KEY.into(),
        config_path,
    });
    let stop = shutdown.subscribe();
    tokio::spawn(async move {
        axum::serve(admin_listener, app)
            .with_graceful_shutdown(wait(stop))
            .await
            .unwrap();
    });

    common::settle().await;
    (
        Running {
            proxy,
            admin,
            shutdown,
            server,
        },
        router,
    )
}

#[tokio::test]
async fn test_proxy_end_to_end() {
    let seen: Arc<Mutex<Vec<MockRequest>>> = Arc::default();
    let log = seen.clone();
    let backend = common::start_programmable_backend(move |req| {
        let log = log.clone();
        async move {
            log.lock().unwrap().push(req);
            MockResponse::ok("hello")
        }
    })
    .await;

    let (running, _router) = start(&yaml(backend, "api"), None).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/api/greeting", running.proxy))
        .header("x-request-id", "req-123")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-request-id"], "req-123");
    assert_eq!(resp.text().await.unwrap(), "hello");

    // A request id is generated when the client sends none.
    let resp = client.get(format!("{}/v1/thing", running.proxy)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let generated = resp.headers()["x-request-id"].to_str().unwrap().to_string();
    assert!(!generated.is_empty());

    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].header("x-request-id"), Some("req-123"));
        assert_eq!(seen[0].header("x-route"), Some("api"));
        assert_eq!(seen[0].header("x-forwarded-for"), Some("127.0.0.1"));
        assert!(seen[0].header("x-forwarded-host").is_some());
        assert_eq!(seen[1].header("x-request-id"), Some(generated.as_str()));
    }

    let missing = client.get(format!("{}/nope", running.proxy)).send().await.unwrap();
    assert_eq!(missing.status(), 404);
    let body: serde_json::Value = missing.json().await.unwrap();
    assert_eq!(body["error"]["code"], "ROUTE_NOT_FOUND");

    running.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), running.server)
        .await
        .expect("server stops after shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_status_surface_and_admin_api() {
    let (backend, _) = common::start_counting_backend("ok").await;
    let path = std::env::temp_dir().join(format!("policy-gateway-e2e-{}.yaml", std::process::id()));
    std::fs::write(&path, yaml(backend, "first")).unwrap();

    let (running, router) = start(&yaml(backend, "first"), Some(path.clone())).await;
    let client = reqwest::Client::new();

    for endpoint in ["/", "/health", "/status"] {
        let status: serde_json::Value = client
            .get(format!("{}{}", running.admin, endpoint))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["status"], "ok");
        assert_eq!(status["service"], "policy-gateway");
        assert_eq!(status["environment"], "test");
        assert_eq!(status["routes"]["first"][0], "/api/*");
        assert_eq!(status["routes"]["first"][1], "/v1/:thing");
        assert!(status["timestamp"].is_string());
    }

    let unauthorized = client.get(format!("{}/admin/routes", running.admin)).send().await.unwrap();
    assert_eq!(unauthorized.status(), 401);

    let routes: serde_json::Value = client
        .get(format!("{}/admin/routes", running.admin))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(routes["generation"], 1);
    assert_eq!(routes["routes"][0]["id"], "first");
    assert_eq!(routes["routes"][0]["enabled"], true);

    let backends: serde_json::Value = client
        .get(format!("{}/admin/backends", running.admin))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(backends["targets"][0]["group"], "web");
    assert_eq!(backends["targets"][0]["alive"], true);

    // Reload picks up the edited file.
    std::fs::write(&path, yaml(backend, "second")).unwrap();
    let reloaded = client
        .post(format!("{}/admin/reload", running.admin))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(reloaded.status(), 200);
    let body: serde_json::Value = reloaded.json().await.unwrap();
    assert_eq!(body["generation"], 2);
    assert_eq!(router.current().routes()[0].id, "second");

    // A broken file is rejected and generation 2 stays.
    std::fs::write(&path, "routes: [{id: x, patterns: [], backend_group: none}]").unwrap();
    let rejected = client
        .post(format!("{}/admin/reload", running.admin))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), 422);
    assert_eq!(router.generation_id(), 2);

    let _ = std::fs::remove_file(&path);
    running.shutdown.trigger();
}
