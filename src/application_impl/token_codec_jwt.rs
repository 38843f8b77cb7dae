use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::Clock;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub access_secret: Vec<u8>,
    pub refresh_secret: Vec<u8>,
}

impl JwtConfig {
    pub fn secret(&self, class: TokenClass) -> &[u8] {
        match class {
            TokenClass::Access => &self.access_secret,
            TokenClass::Refresh => &self.refresh_secret,
        }
    }

    pub fn ttl(&self, class: TokenClass) -> Duration {
        match class {
            TokenClass::Access => self.access_ttl,
            TokenClass::Refresh => self.refresh_ttl,
        }
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

/// Sign a claim set. Identical claims and secret always give the same token.
pub fn encode_claims(claims: &Claims, secret: &[u8]) -> Result<String, AuthError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::InternalError(e.to_string()))
}

pub fn issue_token(
    identity: &Identity,
    class: TokenClass,
    secret: &[u8],
    ttl: Duration,
    issuer: &str,
    now: DateTime<Utc>,
) -> Result<IssuedToken, AuthError> {
    let issued_at = now.timestamp();
    let expires_at = i64::try_from(ttl.as_secs())
        .ok()
        .and_then(|ttl| issued_at.checked_add(ttl))
        .ok_or_else(|| AuthError::InternalError(format!("token lifetime out of range: {ttl:?}")))?;
    let claims = Claims {
        subject_id: identity.subject_id,
        subject_name: identity.subject_name.clone(),
        class,
        token_id: TokenId::generate(),
        issued_at,
        not_before: issued_at,
        expires_at,
        issuer: issuer.to_string(),
    };
    let token = encode_claims(&claims, secret)?;
    Ok(IssuedToken { token, claims })
}

/// Signature first, then `exp > now`, then the class marker. Nothing in the
/// payload is looked at until the signature has verified.
pub fn verify_token(
    token: &str,
    expected: TokenClass,
    secret: &[u8],
    issuer: &str,
    now: DateTime<Utc>,
) -> Result<Claims, AuthError> {
    let mut v = Validation::new(Algorithm::HS256);
    // exp is judged against the injected clock below, with no leeway
    v.validate_exp = false;
    v.validate_aud = false;
    v.leeway = 0;
    v.set_issuer(&[issuer]);
    v.validate_nbf = false;
    v.set_required_spec_claims(&["exp", "iss"]);

    let claims = decode::<Claims>(token, &DecodingKey::from_secret(secret), &v)
        .map_err(|_| AuthError::MalformedToken)?
        .claims;

    if claims.expires_at <= now.timestamp() {
        return Err(AuthError::Expired);
    }
    if claims.not_before > now.timestamp() {
        return Err(AuthError::MalformedToken);
    }
    if claims.class != expected {
        return Err(AuthError::WrongClass { expected });
    }
    Ok(claims)
}

pub struct JwtHs256Codec {
    cfg: JwtConfig,
    clock: Arc<dyn Clock>,
}

impl JwtHs256Codec {
    pub fn try_new(cfg: JwtConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        if cfg.access_secret.is_empty() || cfg.refresh_secret.is_empty() {
            anyhow::bail!("token secrets must not be empty");
        }
        if cfg.access_secret == cfg.refresh_secret {
            anyhow::bail!("access and refresh token secrets must differ");
        }
        Ok(JwtHs256Codec { cfg, clock })
    }
}

impl TokenCodec for JwtHs256Codec {
    fn issue(&self, identity: &Identity, class: TokenClass) -> Result<IssuedToken, AuthError> {
        issue_token(
            identity,
            class,
            self.cfg.secret(class),
            self.cfg.ttl(class),
            &self.cfg.issuer,
            self.clock.now(),
        )
    }

    fn verify(&self, token: &str, expected: TokenClass) -> Result<Claims, AuthError> {
        verify_token(
            token,
            expected,
            self.cfg.secret(expected),
            &self.cfg.issuer,
            self.clock.now(),
        )
    }
}
