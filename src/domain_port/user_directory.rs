use crate::domain_model::Identity;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PasswordCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SmsCredentials {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("{0}")]
    Rejected(String),
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

/// Owner of user records. Answers "who is this" for a credential check.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn authenticate(&self, credentials: &PasswordCredentials)
    -> Result<Identity, DirectoryError>;

    async fn authenticate_sms(&self, credentials: &SmsCredentials)
    -> Result<Identity, DirectoryError>;
}
