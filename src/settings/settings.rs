use anyhow::{Result, anyhow, bail};
use config::{Config, Environment, File, FileFormat, Map};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

pub const ENV_PREFIX: &str = "TOLLGATE";
pub const ENV_SEPARATOR: &str = "__";

/// Upper bound for every lifetime and window, in seconds (ten years).
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub http: Http,
    pub log: Log,
    pub jwt: Jwt,
    pub store: Store,
    pub rate_limit: RateLimit,
    pub business_api: BusinessApi,
    pub directory: Directory,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    // TLS is served only when both are set
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    /// Largest request body the gateway buffers before relaying.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Deserialize)]
pub struct Jwt {
    pub issuer: String,
    pub access_secret: Secret,
    pub refresh_secret: Secret,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    #[serde(default = "enabled")]
    pub check_blacklist: bool,
}

#[derive(Debug, Deserialize)]
pub struct Store {
    pub backend: String, // "redis" or "memory"
    pub host: String,
    pub port: u16,
    pub password: Option<Secret>,
    #[serde(default)]
    pub db: i64,
    pub op_timeout_ms: u64,
}

impl Store {
    pub fn redis_url(&self) -> String {
        match &self.password {
            Some(p) => format!("redis://:{}@{}:{}/{}", p.expose(), self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RateLimit {
    /// Use the first `X-Forwarded-For` hop as the client key. Only sound
    /// behind a proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
    pub policies: HashMap<String, Policy>,
}

#[derive(Debug, Deserialize)]
pub struct Policy {
    pub max_requests: u64,
    pub window_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct BusinessApi {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Directory {
    pub backend: String, // "http" or "fake"
}

fn enabled() -> bool {
    true
}

fn default_max_body_bytes() -> u64 {
    1024 * 1024
}

/// A string that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);
    build(File::with_name(path), None)
}

/// Same as [`parse_settings`], from an in-memory TOML document and an explicit
/// environment instead of the process one.
pub fn parse_settings_from_str(toml: &str, env: Map<String, String>) -> Result<Settings> {
    build(File::from_str(toml, FileFormat::Toml), Some(env))
}

fn build<S>(file: S, env: Option<Map<String, String>>) -> Result<Settings>
where
    S: config::Source + Send + Sync + 'static,
{
    let settings: Settings = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(env),
        )
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    settings.validate()?;
    Ok(settings)
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.jwt.access_secret.expose().is_empty() || self.jwt.refresh_secret.expose().is_empty()
        {
            bail!("jwt.access_secret and jwt.refresh_secret must be set");
        }
        if self.jwt.access_secret == self.jwt.refresh_secret {
            bail!("jwt.access_secret and jwt.refresh_secret must differ");
        }
        if self.jwt.access_ttl_secs == 0 || self.jwt.refresh_ttl_secs == 0 {
            bail!("token lifetimes must be positive");
        }
        if self.jwt.access_ttl_secs > MAX_TTL_SECS || self.jwt.refresh_ttl_secs > MAX_TTL_SECS {
            bail!("token lifetimes must not exceed {MAX_TTL_SECS} seconds");
        }
        if self.http.max_body_bytes == 0 {
            bail!("http.max_body_bytes must be positive");
        }
        if self.store.op_timeout_ms == 0 {
            bail!("store.op_timeout_ms must be positive");
        }
        for (name, policy) in &self.rate_limit.policies {
            if policy.max_requests == 0 || policy.window_secs == 0 {
                bail!("rate_limit.policies.{name}: limit and window must be positive");
            }
            if policy.window_secs > MAX_TTL_SECS {
                bail!("rate_limit.policies.{name}: window must not exceed {MAX_TTL_SECS} seconds");
            }
        }
        if self.business_api.timeout_secs == 0 {
            bail!("business_api.timeout_secs must be positive");
        }
        match self.store.backend.as_str() {
            "redis" | "memory" => {}
            other => bail!("unknown store backend: {other}"),
        }
        match self.directory.backend.as_str() {
            "http" | "fake" => {}
            other => bail!("unknown directory backend: {other}"),
        }
        Ok(())
    }
}
