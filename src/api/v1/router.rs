use super::error::*;
use super::handler::{self, Inbound, supervised};
use crate::application_port::*;
use crate::domain_model::*;
use crate::logger::*;
use crate::server::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::{Filter, Rejection, http, reject};

pub const REGISTER_TARGET: &str = "/api/auth/register";
pub const SMS_SEND_TARGET: &str = "/api/sms/send";

/// The gateway's filter tree, to be mounted under `/api`.
pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let trust_xff = server.trust_forwarded_for;
    let max_body = server.max_body_bytes;
    let login_limit = with_rate_limit(server.rate_limiter.clone(), LOGIN_POLICY, trust_xff);
    let sms_send_limit = with_rate_limit(server.rate_limiter.clone(), SMS_SEND_POLICY, trust_xff);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with(server.clock.clone()))
        .and_then(handler::health);

    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(login_limit.clone())
        .and(json_body(max_body))
        .and(with(server.directory.clone()))
        .and(with(server.session_manager.clone()))
        .and_then(handler::login);

    let sms_login = warp::path!("auth" / "sms" / "login")
        .and(warp::post())
        .and(login_limit.clone())
        .and(json_body(max_body))
        .and(with(server.directory.clone()))
        .and(with(server.session_manager.clone()))
        .and_then(handler::sms_login);

    let refresh = warp::path!("auth" / "refresh")
        .and(warp::post())
        .and(login_limit.clone())
        .and(json_body(max_body))
        .and(with(server.session_manager.clone()))
        .and_then(handler::refresh);

    let logout = warp::path!("auth" / "logout")
        .and(warp::post())
        .and(with_logout_verification(server.session_manager.clone()))
        .and(with(server.session_manager.clone()))
        .and_then(handler::logout);

    let register = warp::path!("auth" / "register")
        .and(warp::post())
        .and(login_limit.clone())
        .and(inbound(max_body))
        .and(with(server.forwarder.clone()))
        .and_then(|inbound: Inbound, forwarder: Arc<dyn Forwarder>| {
            handler::relay(REGISTER_TARGET, inbound, forwarder)
        });

    let sms_send = warp::path!("auth" / "sms" / "send")
        .and(warp::post())
        .and(login_limit)
        .and(sms_send_limit)
        .and(inbound(max_body))
        .and(with(server.forwarder.clone()))
        .and_then(|inbound: Inbound, forwarder: Arc<dyn Forwarder>| {
            handler::relay(SMS_SEND_TARGET, inbound, forwarder)
        });

    let business = warp::path("business")
        .and(with_verification(server.session_manager.clone()))
        .and(inbound(max_body))
        .and(with(server.forwarder.clone()))
        .and_then(handler::business);

    health
        .or(login)
        .or(sms_login)
        .or(refresh)
        .or(logout)
        .or(register)
        .or(sms_send)
        .or(business)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn bearer_token() -> impl Filter<Extract = (AccessToken,), Error = Rejection> + Clone {
    warp::header::optional::<String>(http::header::AUTHORIZATION.as_ref()).and_then(
        |header: Option<String>| async move {
            let header = header.ok_or_else(|| reject::custom(ApiErrorCode::MissingToken))?;
            header
                .strip_prefix("Bearer ")
                .map(|token| AccessToken(token.to_string()))
                .ok_or_else(|| reject::custom(ApiErrorCode::InvalidToken))
        },
    )
}

fn with_verification(
    session_manager: Arc<dyn SessionManager>,
) -> impl Filter<Extract = (Claims,), Error = warp::Rejection> + Clone {
    bearer_token().and_then(move |token: AccessToken| {
        let session_manager = session_manager.clone();
        supervised(async move {
            session_manager
                .verify_access(&token)
                .await
                .map_err(ApiErrorCode::from)
                .map_err(reject::custom)
        })
    })
}

/// Same checks as [`with_verification`], except that an unreachable blacklist
/// does not stop a caller with an otherwise valid token from logging out.
fn with_logout_verification(
    session_manager: Arc<dyn SessionManager>,
) -> impl Filter<Extract = (Claims,), Error = warp::Rejection> + Clone {
    bearer_token().and_then(move |token: AccessToken| {
        let session_manager = session_manager.clone();
        supervised(async move {
            let verified = match session_manager.verify_access(&token).await {
                Err(AuthError::StoreUnavailable(e)) => {
                    warn!("blacklist unreachable during logout: {}", e);
                    session_manager.decode_access(&token)
                }
                verified => verified,
            };
            verified
                .map_err(ApiErrorCode::from)
                .map_err(reject::custom)
        })
    })
}

/// Consumes one slot of `policy` for the calling client or rejects with
/// `RateExceeded`.
fn with_rate_limit(
    limiter: Arc<dyn RateLimiter>,
    policy: &'static str,
    trust_forwarded_for: bool,
) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    client_key(trust_forwarded_for)
        .and_then(move |client: String| {
            let limiter = limiter.clone();
            supervised(async move {
                limiter
                    .admit(policy, &client)
                    .await
                    .map(|_| ())
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)
            })
        })
        .untuple_one()
}

fn client_key(
    trust_forwarded_for: bool,
) -> impl Filter<Extract = (String,), Error = Infallible> + Clone {
    warp::header::optional::<String>("x-forwarded-for")
        .or(warp::any().map(|| None))
        .unify()
        .and(warp::addr::remote())
        .map(move |forwarded: Option<String>, remote: Option<SocketAddr>| {
            resolve_client_key(trust_forwarded_for, forwarded.as_deref(), remote)
        })
}

pub fn resolve_client_key(
    trust_forwarded_for: bool,
    forwarded: Option<&str>,
    remote: Option<SocketAddr>,
) -> String {
    let first_hop = forwarded
        .filter(|_| trust_forwarded_for)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    match (first_hop, remote) {
        (Some(hop), _) => hop.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

/// Buffers the body, refusing more than `limit` bytes whether or not the
/// client declared a `content-length`.
fn bounded_body(limit: u64) -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
    warp::header::optional::<u64>("content-length")
        .and_then(move |declared: Option<u64>| async move {
            match declared {
                Some(length) if length > limit => {
                    Err(reject::custom(ApiErrorCode::PayloadTooLarge))
                }
                _ => Ok(()),
            }
        })
        .untuple_one()
        .and(warp::body::stream())
        .and(warp::any().map(move || limit))
        .and_then(read_bounded)
}

async fn read_bounded<S, B>(body: S, limit: u64) -> Result<Bytes, Rejection>
where
    S: Stream<Item = Result<B, warp::Error>>,
    B: Buf,
{
    let mut body = std::pin::pin!(body);
    let mut buffered = BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| {
            debug!("reading request body failed: {}", e);
            reject::custom(ApiErrorCode::BadRequest)
        })?;
        if (buffered.len() + chunk.remaining()) as u64 > limit {
            return Err(reject::custom(ApiErrorCode::PayloadTooLarge));
        }
        buffered.put(chunk);
    }
    Ok(buffered.freeze())
}

fn json_body<T>(limit: u64) -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: DeserializeOwned + Send + 'static,
{
    bounded_body(limit).and_then(|body: Bytes| async move {
        serde_json::from_slice::<T>(&body).map_err(|e| {
            debug!("request body rejected: {}", e);
            reject::custom(ApiErrorCode::BadRequest)
        })
    })
}

fn optional_raw_query() -> impl Filter<Extract = (Option<String>,), Error = Infallible> + Clone {
    warp::query::raw()
        .map(Some)
        .or(warp::any().map(|| None))
        .unify()
}

fn inbound(max_body: u64) -> impl Filter<Extract = (Inbound,), Error = Rejection> + Clone {
    warp::method()
        .and(warp::path::full())
        .and(optional_raw_query())
        .and(warp::header::headers_cloned())
        .and(bounded_body(max_body))
        .map(
            |method: http::Method,
             path: warp::path::FullPath,
             query: Option<String>,
             headers: http::HeaderMap,
             body: Bytes| Inbound {
                method,
                path: path.as_str().to_string(),
                query,
                headers,
                body,
            },
        )
}
