use crate::domain_model::*;
use crate::domain_port::*;
use std::sync::Arc;

const REFRESH_PREFIX: &str = "refresh_token";
const BLACKLIST_PREFIX: &str = "blacklist";
const BLACKLIST_SENTINEL: &str = "1";

/// Refresh sessions and the revocation list, laid out on a [`KvStore`]:
///
/// | key                          | value                | ttl                       |
/// |------------------------------|----------------------|---------------------------|
/// | `refresh_token:{subject_id}` | refresh token string | refresh lifetime          |
/// | `blacklist:{token_id}`       | `"1"`                | remaining access lifetime |
pub struct KvAuthSessionStore {
    kv: Arc<dyn KvStore>,
}

impl KvAuthSessionStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        KvAuthSessionStore { kv }
    }

    fn refresh_key(subject: SubjectId) -> String {
        format!("{}:{}", REFRESH_PREFIX, subject)
    }

    fn blacklist_key(token_id: &TokenId) -> String {
        format!("{}:{}", BLACKLIST_PREFIX, token_id)
    }
}

#[async_trait::async_trait]
impl AuthSessionStore for KvAuthSessionStore {
    async fn save_refresh_token(
        &self,
        subject: SubjectId,
        token: &str,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        self.kv
            .set_ex(&Self::refresh_key(subject), token, ttl_secs)
            .await
    }

    async fn get_refresh_token(&self, subject: SubjectId) -> Result<Option<String>, StoreError> {
        self.kv.get(&Self::refresh_key(subject)).await
    }

    async fn delete_refresh_token(&self, subject: SubjectId) -> Result<(), StoreError> {
        self.kv.del(&Self::refresh_key(subject)).await?;
        Ok(())
    }

    async fn blacklist_token(&self, token_id: &TokenId, ttl_secs: u64) -> Result<(), StoreError> {
        self.kv
            .set_ex(&Self::blacklist_key(token_id), BLACKLIST_SENTINEL, ttl_secs)
            .await
    }

    async fn is_blacklisted(&self, token_id: &TokenId) -> Result<bool, StoreError> {
        let value = self.kv.get(&Self::blacklist_key(token_id)).await?;
        Ok(value.is_some())
    }
}
