//! Shared wiring for the API tests: an in-memory store on a manual clock, a
//! store that can be switched off, a recording business service and an
//! ephemeral warp server standing in for the real one.
#![allow(dead_code)]

use bytes::Bytes;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tollgate::api;
use tollgate::application_impl::FakeUserDirectory;
use tollgate::domain_model::*;
use tollgate::domain_port::*;
use tollgate::infra_kv::MemoryKvStore;
use tollgate::server::Server;
use tollgate::settings::{Settings, parse_settings_from_str};
use warp::Filter;
use warp::http::{Response, StatusCode};

pub const T0: i64 = 1_700_000_000;

pub const SETTINGS: &str = r#"
    [http]
    address = "127.0.0.1:0"

    [log]
    filter = "debug"

    [jwt]
    issuer = "tollgate.test"
    access_secret = "test-access-secret"
    refresh_secret = "test-refresh-secret"
    access_ttl_secs = 900
    refresh_ttl_secs = 86400

    [store]
    backend = "memory"
    host = "localhost"
    port = 6379
    op_timeout_ms = 1000

    [rate_limit.policies.login]
    max_requests = 5
    window_secs = 60

    [rate_limit.policies.sms-send]
    max_requests = 2
    window_secs = 60

    [business_api]
    base_url = "http://127.0.0.1:1"
    timeout_secs = 2

    [directory]
    backend = "fake"
"#;

pub fn settings() -> Settings {
    parse_settings_from_str(SETTINGS, Default::default()).unwrap()
}

pub fn alice_directory() -> Arc<dyn UserDirectory> {
    Arc::new(
        FakeUserDirectory::new()
            .with_user(42, "alice", "wonderland")
            .with_phone("alice", "13800000000"),
    )
}

/// Memory store that can be taken offline mid-test.
pub struct SwitchableKv {
    inner: MemoryKvStore,
    down: AtomicBool,
}

impl SwitchableKv {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: MemoryKvStore::new(clock),
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Backend("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl KvStore for SwitchableKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        self.inner.get(key).await
    }
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.check()?;
        self.inner.set_ex(key, value, ttl_secs).await
    }
    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.del(key).await
    }
    async fn incr_ex(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError> {
        self.check()?;
        self.inner.incr_ex(key, ttl_secs).await
    }
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        self.check()?;
        self.inner.zadd(key, member, score).await
    }
    async fn zrembyscore(&self, key: &str, min: f64, max: f64) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.zrembyscore(key, min, max).await
    }
    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.zcard(key).await
    }
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.expire(key, ttl_secs).await
    }
}

/// In-process business service that remembers what it was sent.
#[derive(Default)]
pub struct RecordingUpstream {
    pub seen: Mutex<Vec<RelayRequest>>,
}

#[async_trait::async_trait]
impl Upstream for RecordingUpstream {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse, UpstreamError> {
        self.seen.lock().unwrap().push(request);
        Ok(RelayResponse {
            status: 200,
            headers: vec![("content-type".into(), b"application/json".to_vec())],
            body: Bytes::from_static(b"{\"ok\":true}"),
        })
    }
}

pub struct Harness {
    pub server: Arc<Server>,
    pub clock: Arc<ManualClock>,
    pub kv: Arc<SwitchableKv>,
}

pub fn harness_with(directory: Arc<dyn UserDirectory>, upstream: Arc<dyn Upstream>) -> Harness {
    harness_rewired(directory, upstream, |server| server)
}

/// Like [`harness_with`], with a chance to swap services on the assembled server.
pub fn harness_rewired(
    directory: Arc<dyn UserDirectory>,
    upstream: Arc<dyn Upstream>,
    rewire: impl FnOnce(Server) -> Server,
) -> Harness {
    let clock = Arc::new(ManualClock::at_secs(T0));
    let kv = Arc::new(SwitchableKv::new(clock.clone()));
    let server = Server::assemble(&settings(), kv.clone(), clock.clone(), directory, upstream)
        .unwrap();
    Harness {
        server: Arc::new(rewire(server)),
        clock,
        kv,
    }
}

pub fn harness() -> Harness {
    harness_with(alice_directory(), Arc::new(RecordingUpstream::default()))
}

pub fn api(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone + 'static {
    warp::path("api")
        .and(api::v1::routes(server))
        .recover(api::v1::recover_error)
}

pub fn body_json(response: &Response<Bytes>) -> Value {
    serde_json::from_slice(response.body()).unwrap()
}

pub fn assert_error(response: &Response<Bytes>, status: StatusCode, code: &str) {
    assert_eq!(response.status(), status, "body: {:?}", response.body());
    assert_eq!(body_json(response)["code"], code);
}

pub async fn login(harness: &Harness, username: &str, password: &str) -> Response<Bytes> {
    warp::test::request()
        .method("POST")
        .path("/api/auth/login")
        .json(&json!({ "username": username, "password": password }))
        .reply(&api(harness.server.clone()))
        .await
}

/// Logs alice in and returns `(access_token, refresh_token)`.
pub async fn login_alice(harness: &Harness) -> (String, String) {
    let response = login(harness, "alice", "wonderland").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(&response);
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["refresh_token"].as_str().unwrap().to_string(),
    )
}

/// Starts a warp server on an ephemeral port that plays the business service:
/// `POST /api/auth/login` and `POST /api/sms/login` check credentials; every
/// other request is echoed back as JSON with status 201.
pub async fn spawn_business_service() -> SocketAddr {
    let login = warp::post()
        .and(warp::path!("api" / "auth" / "login"))
        .and(warp::body::json())
        .map(|body: Value| {
            if body["password"] == "wonderland" {
                warp::reply::with_status(
                    warp::reply::json(&json!({
                        "message": "ok",
                        "data": { "user": { "id": 42, "username": body["username"] } }
                    })),
                    StatusCode::OK,
                )
            } else {
                warp::reply::with_status(
                    warp::reply::json(&json!({ "message": "wrong password" })),
                    StatusCode::UNAUTHORIZED,
                )
            }
        });

    let sms_login = warp::post()
        .and(warp::path!("api" / "sms" / "login"))
        .map(|| {
            warp::reply::with_status(
                warp::reply::json(&json!({ "error": "sms backend down" })),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        });

    let echo = warp::method()
        .and(warp::path::full())
        .and(
            warp::query::raw()
                .or(warp::any().map(String::new))
                .unify(),
        )
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .map(
            |method: warp::http::Method,
             path: warp::path::FullPath,
             query: String,
             headers: warp::http::HeaderMap,
             body: Bytes| {
                let header = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                };
                let reply = warp::reply::json(&json!({
                    "method": method.as_str(),
                    "path": path.as_str(),
                    "query": query,
                    "user_id": header("x-user-id"),
                    "username": header("x-username"),
                    "authorization": header("authorization"),
                    "body": String::from_utf8_lossy(&body),
                }));
                warp::reply::with_header(
                    warp::reply::with_status(reply, StatusCode::CREATED),
                    "x-served-by",
                    "business",
                )
            },
        );

    let (addr, serving) =
        warp::serve(login.or(sms_login).or(echo)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(serving);
    addr
}

/// An address nothing listens on.
pub fn dead_address() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
