use super::error::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use bytes::Bytes;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use warp::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use warp::{Rejection, reject};

pub const SERVICE_NAME: &str = "tollgate";

/// Runs one step of a request (a handler or a guarding filter), turning a
/// panic into an `InternalError` answer for that request alone.
pub(super) async fn supervised<F, T>(handler: F) -> Result<T, Rejection>
where
    F: Future<Output = Result<T, Rejection>>,
{
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!("request panicked: {}", reason);
            Err(reject::custom(ApiErrorCode::InternalError))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: SubjectId,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserView>,
}

impl TokenResponse {
    fn new(pair: TokenPair, identity: Option<Identity>) -> Self {
        TokenResponse {
            expires_in: pair.expires_in(),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user: identity.map(|i| UserView {
                id: i.subject_id,
                username: i.subject_name,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: i64,
}

pub async fn health(clock: Arc<dyn Clock>) -> Result<impl warp::Reply, Rejection> {
    Ok(warp::reply::json(&HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        timestamp: clock.now_secs(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(
    body: LoginRequest,
    directory: Arc<dyn UserDirectory>,
    session_manager: Arc<dyn SessionManager>,
) -> Result<impl warp::Reply, Rejection> {
    supervised(async move {
        let credentials = PasswordCredentials {
            username: body.username,
            password: body.password,
        };
        let identity = directory
            .authenticate(&credentials)
            .await
            .map_err(AuthError::from)
            .map_err(ApiErrorCode::from)
            .map_err(reject::custom)?;

        open_session(identity, session_manager).await
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct SmsLoginRequest {
    pub phone: String,
    pub code: String,
}

pub async fn sms_login(
    body: SmsLoginRequest,
    directory: Arc<dyn UserDirectory>,
    session_manager: Arc<dyn SessionManager>,
) -> Result<impl warp::Reply, Rejection> {
    supervised(async move {
        let credentials = SmsCredentials {
            phone: body.phone,
            code: body.code,
        };
        let identity = directory
            .authenticate_sms(&credentials)
            .await
            .map_err(AuthError::from)
            .map_err(ApiErrorCode::from)
            .map_err(reject::custom)?;

        open_session(identity, session_manager).await
    })
    .await
}

async fn open_session(
    identity: Identity,
    session_manager: Arc<dyn SessionManager>,
) -> Result<warp::reply::Json, Rejection> {
    let pair = session_manager
        .login(&identity)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    Ok(warp::reply::json(&TokenResponse::new(pair, Some(identity))))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    body: RefreshRequest,
    session_manager: Arc<dyn SessionManager>,
) -> Result<impl warp::Reply, Rejection> {
    supervised(async move {
        let pair = session_manager
            .refresh(&RefreshToken(body.refresh_token))
            .await
            .map_err(ApiErrorCode::from)
            .map_err(reject::custom)?;
        Ok(warp::reply::json(&TokenResponse::new(pair, None)))
    })
    .await
}

/// Always answers 200 once the caller is authenticated; revocation is best-effort.
pub async fn logout(
    claims: Claims,
    session_manager: Arc<dyn SessionManager>,
) -> Result<impl warp::Reply, Rejection> {
    supervised(async move {
        if let Err(e) = session_manager
            .logout(claims.subject_id, &claims.token_id, claims.expires_at)
            .await
        {
            warn!(subject = %claims.subject_id, "logout incomplete: {}", e);
        }
        Ok(warp::reply::json(&MessageResponse {
            message: "logged out".into(),
        }))
    })
    .await
}

/// Everything needed to replay an inbound request downstream.
#[derive(Debug)]
pub struct Inbound {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Inbound {
    fn into_relay(self, path: String) -> RelayRequest {
        RelayRequest {
            method: self.method.as_str().to_string(),
            path,
            query: self.query,
            headers: self
                .headers
                .iter()
                .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
                .collect(),
            body: self.body,
        }
    }
}

/// Anonymous pass-through to a fixed business endpoint.
pub async fn relay(
    target: &'static str,
    inbound: Inbound,
    forwarder: Arc<dyn Forwarder>,
) -> Result<warp::reply::Response, Rejection> {
    supervised(async move {
        let response = forwarder
            .relay(inbound.into_relay(target.to_string()))
            .await
            .map_err(ApiErrorCode::from)
            .map_err(reject::custom)?;
        into_reply(response)
    })
    .await
}

pub async fn business(
    claims: Claims,
    inbound: Inbound,
    forwarder: Arc<dyn Forwarder>,
) -> Result<warp::reply::Response, Rejection> {
    supervised(async move {
        let path = inbound.path.clone();
        let response = forwarder
            .forward(&claims.identity(), inbound.into_relay(path))
            .await
            .map_err(ApiErrorCode::from)
            .map_err(reject::custom)?;
        into_reply(response)
    })
    .await
}

fn into_reply(relayed: RelayResponse) -> Result<warp::reply::Response, Rejection> {
    let status = StatusCode::from_u16(relayed.status)
        .map_err(ApiErrorCode::internal)
        .map_err(reject::custom)?;

    let mut response = warp::reply::Response::new(relayed.body.into());
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in relayed.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => debug!(%name, "dropping unrepresentable response header"),
        }
    }
    Ok(response)
}
