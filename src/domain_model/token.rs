use super::{Identity, SubjectId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    Access,
    Refresh,
}

impl TokenClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenClass::Access => "access",
            TokenClass::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique per issued token. Doubles as the blacklist key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub String);

impl TokenId {
    pub fn generate() -> Self {
        TokenId(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Flat claim set carried in the token payload.
///
/// Field names on the wire follow the gateway's established format
/// (`user_id`, `username`, `token_type`, ...), so tokens minted by older
/// gateway instances stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "user_id")]
    pub subject_id: SubjectId,
    #[serde(rename = "username")]
    pub subject_name: String,
    #[serde(rename = "token_type")]
    pub class: TokenClass,
    #[serde(rename = "jti")]
    pub token_id: TokenId,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "nbf")]
    pub not_before: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
    #[serde(rename = "iss")]
    pub issuer: String,
}

impl Claims {
    pub fn identity(&self) -> Identity {
        Identity::new(self.subject_id, self.subject_name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RefreshToken(pub String);

/// A freshly minted token together with the claims it encodes.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_claims: Claims,
    pub refresh_claims: Claims,
}

impl TokenPair {
    /// Lifetime of the access token in seconds, as reported to clients.
    pub fn expires_in(&self) -> u64 {
        (self.access_claims.expires_at - self.access_claims.issued_at).max(0) as u64
    }
}
