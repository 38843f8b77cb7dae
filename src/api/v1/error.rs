use crate::application_port::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::{Rejection, reject};

/// Error body for every non-2xx answer the gateway itself produces.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: ApiErrorCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    #[error("Malformed request")]
    BadRequest,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Missing bearer token")]
    MissingToken,
    #[error("Token is not valid")]
    InvalidToken,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Refresh token is no longer valid")]
    StaleToken,
    #[error("Token has been revoked")]
    TokenRevoked,
    #[error("Not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Request body too large")]
    PayloadTooLarge,
    #[error("Too many requests")]
    RateExceeded,
    #[error("Business service unavailable")]
    UpstreamUnavailable,
    #[error("Session store unavailable")]
    StoreUnavailable,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        error!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ApiErrorCode::InvalidCredentials
            | ApiErrorCode::MissingToken
            | ApiErrorCode::InvalidToken
            | ApiErrorCode::TokenExpired
            | ApiErrorCode::StaleToken
            | ApiErrorCode::TokenRevoked => StatusCode::UNAUTHORIZED,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiErrorCode::RateExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiErrorCode::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ApiErrorCode::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<AuthError> for ApiErrorCode {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::MalformedToken | AuthError::WrongClass { .. } => ApiErrorCode::InvalidToken,
            AuthError::Expired => ApiErrorCode::TokenExpired,
            AuthError::StaleToken => ApiErrorCode::StaleToken,
            AuthError::Revoked => ApiErrorCode::TokenRevoked,
            AuthError::InvalidCredentials(_) => ApiErrorCode::InvalidCredentials,
            AuthError::StoreUnavailable(e) => {
                warn!("Session store unavailable: {}", e);
                ApiErrorCode::StoreUnavailable
            }
            AuthError::UpstreamUnavailable(e) => {
                warn!("User directory unavailable: {}", e);
                ApiErrorCode::UpstreamUnavailable
            }
            AuthError::InternalError(e) => ApiErrorCode::internal(e),
        }
    }
}

impl From<RateLimitError> for ApiErrorCode {
    fn from(error: RateLimitError) -> Self {
        match error {
            RateLimitError::RateExceeded { .. } => ApiErrorCode::RateExceeded,
            RateLimitError::UnknownPolicy(_) => ApiErrorCode::internal(error),
        }
    }
}

impl From<ForwardError> for ApiErrorCode {
    fn from(error: ForwardError) -> Self {
        match error {
            ForwardError::UpstreamUnavailable(_) => ApiErrorCode::UpstreamUnavailable,
            ForwardError::BadRequest(_) => ApiErrorCode::BadRequest,
        }
    }
}

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let code = if let Some(code) = err.find::<ApiErrorCode>() {
        *code
    } else if err.is_not_found() {
        ApiErrorCode::NotFound
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        ApiErrorCode::MethodNotAllowed
    } else if err.find::<reject::PayloadTooLarge>().is_some() {
        ApiErrorCode::PayloadTooLarge
    } else if err.find::<warp::body::BodyDeserializeError>().is_some()
        || err.find::<reject::UnsupportedMediaType>().is_some()
        || err.find::<reject::LengthRequired>().is_some()
        || err.find::<reject::InvalidHeader>().is_some()
        || err.find::<reject::InvalidQuery>().is_some()
    {
        ApiErrorCode::BadRequest
    } else {
        ApiErrorCode::internal(format!("Unhandled rejection: {:?}", err))
    };

    let json = warp::reply::json(&ApiError {
        error: code.to_string(),
        code,
    });
    Ok(warp::reply::with_status(json, code.status()))
}
