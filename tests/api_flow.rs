mod common;

use common::*;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tollgate::domain_model::*;
use tollgate::application_port::*;
use tollgate::domain_port::*;
use tollgate::server::Server;
use warp::http::StatusCode;

async fn post_json(
    harness: &Harness,
    path: &str,
    body: serde_json::Value,
) -> warp::http::Response<bytes::Bytes> {
    warp::test::request()
        .method("POST")
        .path(path)
        .json(&body)
        .reply(&api(harness.server.clone()))
        .await
}

async fn with_bearer(
    harness: &Harness,
    method: &str,
    path: &str,
    token: &str,
) -> warp::http::Response<bytes::Bytes> {
    warp::test::request()
        .method(method)
        .path(path)
        .header("authorization", format!("Bearer {token}"))
        .reply(&api(harness.server.clone()))
        .await
}

#[tokio::test]
async fn health_is_public() {
    let h = harness();
    let response = warp::test::request()
        .path("/api/health")
        .reply(&api(h.server.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(&response);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["timestamp"], T0);
}

#[tokio::test]
async fn login_issues_a_pair_for_the_directory_identity() {
    let h = harness();
    let response = login(&h, "alice", "wonderland").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(&response);
    assert_eq!(body["expires_in"], 900);
    assert_eq!(body["user"], json!({ "id": 42, "username": "alice" }));

    let access = body["access_token"].as_str().unwrap();
    let claims = h
        .server
        .session_manager
        .verify_access(&AccessToken(access.to_string()))
        .await
        .unwrap();
    assert_eq!(claims.identity(), Identity::new(SubjectId(42), "alice"));
    assert_eq!(claims.expires_at, T0 + 900);
}

#[tokio::test]
async fn bad_password_is_401() {
    let h = harness();
    let response = login(&h, "alice", "guess").await;
    assert_error(&response, StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn malformed_body_is_400() {
    let h = harness();
    let response = warp::test::request()
        .method("POST")
        .path("/api/auth/login")
        .header("content-type", "application/json")
        .body("{\"username\":")
        .reply(&api(h.server.clone()))
        .await;
    assert_error(&response, StatusCode::BAD_REQUEST, "BAD_REQUEST");
}

#[tokio::test]
async fn refresh_rotates_and_the_old_token_goes_stale() {
    let h = harness();
    let (_, refresh) = login_alice(&h).await;
    h.clock.advance(Duration::from_secs(1));

    let rotated = post_json(&h, "/api/auth/refresh", json!({ "refresh_token": refresh })).await;
    assert_eq!(rotated.status(), StatusCode::OK);
    let body = body_json(&rotated);
    assert!(body.get("user").is_none());
    assert_ne!(body["refresh_token"], refresh.as_str());

    let replay = post_json(&h, "/api/auth/refresh", json!({ "refresh_token": refresh })).await;
    assert_error(&replay, StatusCode::UNAUTHORIZED, "STALE_TOKEN");

    let next = body["refresh_token"].as_str().unwrap();
    let again = post_json(&h, "/api/auth/refresh", json!({ "refresh_token": next })).await;
    assert_eq!(again.status(), StatusCode::OK);
}

#[tokio::test]
async fn access_token_is_not_a_refresh_token() {
    let h = harness();
    let (access, _) = login_alice(&h).await;
    let response = post_json(&h, "/api/auth/refresh", json!({ "refresh_token": access })).await;
    assert_error(&response, StatusCode::UNAUTHORIZED, "INVALID_TOKEN");
}

#[tokio::test]
async fn business_routes_require_a_valid_access_token() {
    let h = harness();
    let (access, refresh) = login_alice(&h).await;

    let missing = warp::test::request()
        .path("/api/business/orders")
        .reply(&api(h.server.clone()))
        .await;
    assert_error(&missing, StatusCode::UNAUTHORIZED, "MISSING_TOKEN");

    let not_bearer = warp::test::request()
        .path("/api/business/orders")
        .header("authorization", format!("Token {access}"))
        .reply(&api(h.server.clone()))
        .await;
    assert_error(&not_bearer, StatusCode::UNAUTHORIZED, "INVALID_TOKEN");

    let wrong_class = with_bearer(&h, "GET", "/api/business/orders", &refresh).await;
    assert_error(&wrong_class, StatusCode::UNAUTHORIZED, "INVALID_TOKEN");

    let ok = with_bearer(&h, "GET", "/api/business/orders", &access).await;
    assert_eq!(ok.status(), StatusCode::OK);

    h.clock.advance(Duration::from_secs(900));
    let expired = with_bearer(&h, "GET", "/api/business/orders", &access).await;
    assert_error(&expired, StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED");
}

#[tokio::test]
async fn logout_revokes_both_tokens() {
    let h = harness();
    let (access, refresh) = login_alice(&h).await;

    let response = with_bearer(&h, "POST", "/api/auth/logout", &access).await;
    assert_eq!(response.status(), StatusCode::OK);

    let after = with_bearer(&h, "GET", "/api/business/orders", &access).await;
    assert_error(&after, StatusCode::UNAUTHORIZED, "TOKEN_REVOKED");

    let refreshed = post_json(&h, "/api/auth/refresh", json!({ "refresh_token": refresh })).await;
    assert_error(&refreshed, StatusCode::UNAUTHORIZED, "STALE_TOKEN");
}

#[tokio::test]
async fn logout_needs_an_authenticated_caller() {
    let h = harness();
    let response = warp::test::request()
        .method("POST")
        .path("/api/auth/logout")
        .reply(&api(h.server.clone()))
        .await;
    assert_error(&response, StatusCode::UNAUTHORIZED, "MISSING_TOKEN");
}

async fn attempt(harness: &Harness, addr: SocketAddr) -> warp::http::Response<bytes::Bytes> {
    warp::test::request()
        .method("POST")
        .path("/api/auth/login")
        .remote_addr(addr)
        .json(&json!({ "username": "alice", "password": "guess" }))
        .reply(&api(harness.server.clone()))
        .await
}

#[tokio::test]
async fn login_attempts_are_rate_limited_per_client() {
    let h = harness();
    let client: SocketAddr = "192.0.2.10:40000".parse().unwrap();
    let other: SocketAddr = "192.0.2.11:40000".parse().unwrap();

    for _ in 0..5 {
        assert_eq!(attempt(&h, client).await.status(), StatusCode::UNAUTHORIZED);
    }
    assert_error(&attempt(&h, client).await, StatusCode::TOO_MANY_REQUESTS, "RATE_EXCEEDED");
    assert_eq!(attempt(&h, other).await.status(), StatusCode::UNAUTHORIZED);

    h.clock.advance(Duration::from_secs(61));
    assert_eq!(attempt(&h, client).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sms_login_issues_tokens() {
    let h = harness();
    let response = post_json(
        &h,
        "/api/auth/sms/login",
        json!({ "phone": "13800000000", "code": "123456" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(&response)["user"]["id"], 42);

    let wrong = post_json(
        &h,
        "/api/auth/sms/login",
        json!({ "phone": "13800000000", "code": "999999" }),
    )
    .await;
    assert_error(&wrong, StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn store_outage_fails_sessions_closed_and_limits_open() {
    let h = harness();
    let (access, refresh) = login_alice(&h).await;
    h.kv.set_down(true);

    // The limiter admits; the session store refuses, except for logout.
    let refreshed = post_json(&h, "/api/auth/refresh", json!({ "refresh_token": refresh })).await;
    assert_error(&refreshed, StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE");

    let business = with_bearer(&h, "GET", "/api/business/orders", &access).await;
    assert_error(&business, StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE");

    let logout = with_bearer(&h, "POST", "/api/auth/logout", &access).await;
    assert_eq!(logout.status(), StatusCode::OK);
    assert_eq!(body_json(&logout)["message"], "logged out");

    h.kv.set_down(false);
    let business = with_bearer(&h, "GET", "/api/business/orders", &access).await;
    assert_eq!(business.status(), StatusCode::OK);
}

struct PanickingDirectory;

#[async_trait::async_trait]
impl UserDirectory for PanickingDirectory {
    async fn authenticate(&self, _: &PasswordCredentials) -> Result<Identity, DirectoryError> {
        panic!("directory exploded");
    }

    async fn authenticate_sms(&self, _: &SmsCredentials) -> Result<Identity, DirectoryError> {
        Err(DirectoryError::Unavailable("sms gateway down".into()))
    }
}

#[tokio::test]
async fn a_panicking_request_becomes_a_500_and_the_server_keeps_serving() {
    let h = harness_with(
        Arc::new(PanickingDirectory),
        Arc::new(RecordingUpstream::default()),
    );

    let response = login(&h, "alice", "wonderland").await;
    assert_error(&response, StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR");

    let sms = post_json(
        &h,
        "/api/auth/sms/login",
        json!({ "phone": "13800000000", "code": "123456" }),
    )
    .await;
    assert_error(&sms, StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE");
}

#[tokio::test]
async fn logout_during_an_outage_still_checks_the_token() {
    let h = harness();
    let (access, refresh) = login_alice(&h).await;
    h.kv.set_down(true);

    let wrong_class = with_bearer(&h, "POST", "/api/auth/logout", &refresh).await;
    assert_error(&wrong_class, StatusCode::UNAUTHORIZED, "INVALID_TOKEN");

    h.clock.advance(Duration::from_secs(900));
    let expired = with_bearer(&h, "POST", "/api/auth/logout", &access).await;
    assert_error(&expired, StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED");
}

struct PanickingLimiter;

#[async_trait::async_trait]
impl RateLimiter for PanickingLimiter {
    async fn admit(&self, _: &str, _: &str) -> Result<Admission, RateLimitError> {
        panic!("limiter exploded");
    }
}

struct PanickingSessions;

#[async_trait::async_trait]
impl SessionManager for PanickingSessions {
    async fn login(&self, _: &Identity) -> Result<TokenPair, AuthError> {
        panic!("sessions exploded");
    }
    async fn refresh(&self, _: &RefreshToken) -> Result<TokenPair, AuthError> {
        panic!("sessions exploded");
    }
    async fn verify_access(&self, _: &AccessToken) -> Result<Claims, AuthError> {
        panic!("sessions exploded");
    }
    fn decode_access(&self, _: &AccessToken) -> Result<Claims, AuthError> {
        panic!("sessions exploded");
    }
    async fn logout(&self, _: SubjectId, _: &TokenId, _: i64) -> Result<(), AuthError> {
        panic!("sessions exploded");
    }
}

#[tokio::test]
async fn a_panicking_rate_limiter_becomes_a_500() {
    let h = harness_rewired(
        alice_directory(),
        Arc::new(RecordingUpstream::default()),
        |server| Server {
            rate_limiter: Arc::new(PanickingLimiter),
            ..server
        },
    );

    let response = login(&h, "alice", "wonderland").await;
    assert_error(&response, StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR");

    let health = warp::test::request()
        .path("/api/health")
        .reply(&api(h.server.clone()))
        .await;
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn a_panicking_token_check_becomes_a_500() {
    let h = harness_rewired(
        alice_directory(),
        Arc::new(RecordingUpstream::default()),
        |server| Server {
            session_manager: Arc::new(PanickingSessions),
            ..server
        },
    );

    let business = with_bearer(&h, "GET", "/api/business/orders", "any.token.at-all").await;
    assert_error(&business, StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR");

    let logout = with_bearer(&h, "POST", "/api/auth/logout", "any.token.at-all").await;
    assert_error(&logout, StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR");
}

#[tokio::test]
async fn oversized_bodies_are_refused_and_business_checks_the_token_first() {
    let h = harness();
    let (access, _) = login_alice(&h).await;
    let oversized = vec![b'x'; 1024 * 1024 + 1];

    let anonymous = warp::test::request()
        .method("POST")
        .path("/api/business/upload")
        .body(oversized.clone())
        .reply(&api(h.server.clone()))
        .await;
    assert_error(&anonymous, StatusCode::UNAUTHORIZED, "MISSING_TOKEN");

    let authenticated = warp::test::request()
        .method("POST")
        .path("/api/business/upload")
        .header("authorization", format!("Bearer {access}"))
        .body(oversized.clone())
        .reply(&api(h.server.clone()))
        .await;
    assert_error(&authenticated, StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE");

    let register = warp::test::request()
        .method("POST")
        .path("/api/auth/register")
        .body(oversized)
        .reply(&api(h.server.clone()))
        .await;
    assert_error(&register, StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn unknown_routes_are_404() {
    let h = harness();
    let response = warp::test::request()
        .path("/api/nowhere")
        .reply(&api(h.server.clone()))
        .await;
    assert_error(&response, StatusCode::NOT_FOUND, "NOT_FOUND");
}
