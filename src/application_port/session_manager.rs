use crate::domain_model::*;
use crate::domain_port::{DirectoryError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token is malformed or its signature does not verify")]
    MalformedToken,
    #[error("token expired")]
    Expired,
    #[error("expected a {expected} token")]
    WrongClass { expected: TokenClass },
    #[error("refresh token is no longer valid")]
    StaleToken,
    #[error("token has been revoked")]
    Revoked,
    #[error("{0}")]
    InvalidCredentials(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::StoreUnavailable(err.to_string())
    }
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Rejected(message) => AuthError::InvalidCredentials(message),
            DirectoryError::Unavailable(e) => AuthError::UpstreamUnavailable(e),
        }
    }
}

pub trait TokenCodec: Send + Sync {
    fn issue(&self, identity: &Identity, class: TokenClass) -> Result<IssuedToken, AuthError>;

    /// Check signature, then expiry, then class.
    fn verify(&self, token: &str, expected: TokenClass) -> Result<Claims, AuthError>;
}

#[async_trait::async_trait]
pub trait SessionManager: Send + Sync {
    async fn login(&self, identity: &Identity) -> Result<TokenPair, AuthError>;

    async fn refresh(&self, presented: &RefreshToken) -> Result<TokenPair, AuthError>;

    async fn verify_access(&self, token: &AccessToken) -> Result<Claims, AuthError>;

    /// Signature, expiry and class only; the blacklist is not consulted.
    fn decode_access(&self, token: &AccessToken) -> Result<Claims, AuthError>;

    /// Drop the subject's refresh session and revoke one access token until
    /// it would have expired on its own (`access_expires_at`, unix seconds).
    async fn logout(
        &self,
        subject: SubjectId,
        token_id: &TokenId,
        access_expires_at: i64,
    ) -> Result<(), AuthError>;
}
