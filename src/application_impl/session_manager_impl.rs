use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use std::sync::Arc;

pub struct RealSessionManager {
    token_codec: Arc<dyn TokenCodec>,
    session_store: Arc<dyn AuthSessionStore>,
    clock: Arc<dyn Clock>,
    check_blacklist: bool,
}

impl RealSessionManager {
    pub fn new(
        token_codec: Arc<dyn TokenCodec>,
        session_store: Arc<dyn AuthSessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            token_codec,
            session_store,
            clock,
            check_blacklist: true,
        }
    }

    pub fn with_blacklist_check(mut self, enabled: bool) -> Self {
        self.check_blacklist = enabled;
        self
    }

    fn ttl_secs(&self, until: i64) -> u64 {
        let secs = until - self.clock.now_secs();
        if secs <= 0 { 1 } else { secs as u64 }
    }

    /// Mint a pair and make its refresh half the subject's only live session.
    async fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        let access = self.token_codec.issue(identity, TokenClass::Access)?;
        let refresh = self.token_codec.issue(identity, TokenClass::Refresh)?;

        let ttl_secs = self.ttl_secs(refresh.claims.expires_at);
        self.session_store
            .save_refresh_token(identity.subject_id, &refresh.token, ttl_secs)
            .await?;

        Ok(TokenPair {
            access_token: AccessToken(access.token),
            refresh_token: RefreshToken(refresh.token),
            access_claims: access.claims,
            refresh_claims: refresh.claims,
        })
    }
}

#[async_trait::async_trait]
impl SessionManager for RealSessionManager {
    async fn login(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        let pair = self.issue_pair(identity).await?;
        info!(subject = %identity.subject_id, "session opened");
        Ok(pair)
    }

    async fn refresh(&self, presented: &RefreshToken) -> Result<TokenPair, AuthError> {
        let claims = self.token_codec.verify(&presented.0, TokenClass::Refresh)?;

        // Rotation: only the most recently stored token is redeemable.
        // Read-then-overwrite is not transactional; two concurrent refreshes
        // of the same token may both pass, and the last write wins.
        let stored = self
            .session_store
            .get_refresh_token(claims.subject_id)
            .await?;
        match stored {
            Some(stored) if stored == presented.0 => {}
            _ => {
                debug!(subject = %claims.subject_id, "stale refresh token presented");
                return Err(AuthError::StaleToken);
            }
        }

        self.issue_pair(&claims.identity()).await
    }

    async fn verify_access(&self, token: &AccessToken) -> Result<Claims, AuthError> {
        let claims = self.token_codec.verify(&token.0, TokenClass::Access)?;

        if self.check_blacklist && self.session_store.is_blacklisted(&claims.token_id).await? {
            return Err(AuthError::Revoked);
        }

        Ok(claims)
    }

    fn decode_access(&self, token: &AccessToken) -> Result<Claims, AuthError> {
        self.token_codec.verify(&token.0, TokenClass::Access)
    }

    async fn logout(
        &self,
        subject: SubjectId,
        token_id: &TokenId,
        access_expires_at: i64,
    ) -> Result<(), AuthError> {
        let deleted = self.session_store.delete_refresh_token(subject).await;
        let blacklisted = self
            .session_store
            .blacklist_token(token_id, self.ttl_secs(access_expires_at))
            .await;

        if let Err(e) = &deleted {
            warn!(%subject, "dropping refresh session failed: {}", e);
        }
        if let Err(e) = &blacklisted {
            warn!(%subject, "blacklisting access token failed: {}", e);
        }
        deleted?;
        blacklisted?;

        info!(%subject, "session closed");
        Ok(())
    }
}
