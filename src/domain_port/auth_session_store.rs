use super::StoreError;
use crate::domain_model::*;

#[async_trait::async_trait]
pub trait AuthSessionStore: Send + Sync {
    /// Record `token` as the only redeemable refresh token for `subject`.
    async fn save_refresh_token(
        &self,
        subject: SubjectId,
        token: &str,
        ttl_secs: u64,
    ) -> Result<(), StoreError>;

    async fn get_refresh_token(&self, subject: SubjectId) -> Result<Option<String>, StoreError>;

    async fn delete_refresh_token(&self, subject: SubjectId) -> Result<(), StoreError>;

    async fn blacklist_token(&self, token_id: &TokenId, ttl_secs: u64) -> Result<(), StoreError>;

    async fn is_blacklisted(&self, token_id: &TokenId) -> Result<bool, StoreError>;
}
