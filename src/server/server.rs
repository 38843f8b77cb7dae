use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_http::*;
use crate::infra_kv::*;
use crate::logger::*;
use crate::settings::Settings;
use std::sync::Arc;
use std::time::Duration;

pub const BUSINESS_PREFIX: &str = "/api/business";
pub const UPSTREAM_PREFIX: &str = "/api";

/// Everything a request handler may reach for, wired once at startup.
pub struct Server {
    pub session_manager: Arc<dyn SessionManager>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub directory: Arc<dyn UserDirectory>,
    pub forwarder: Arc<dyn Forwarder>,
    pub clock: Arc<dyn Clock>,
    pub trust_forwarded_for: bool,
    pub max_body_bytes: u64,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let kv: Arc<dyn KvStore> = match settings.store.backend.as_str() {
            "memory" => {
                warn!("using the in-process store; sessions do not survive a restart");
                Arc::new(MemoryKvStore::new(clock.clone()))
            }
            "redis" => {
                let op_timeout = Duration::from_millis(settings.store.op_timeout_ms);
                let store = RedisKvStore::connect(&settings.store.redis_url(), op_timeout).await?;
                info!(host = %settings.store.host, port = settings.store.port, "redis connected");
                Arc::new(store)
            }
            other => return Err(anyhow::anyhow!("Unknown store backend: {}", other)),
        };

        let business_timeout = Duration::from_secs(settings.business_api.timeout_secs);
        let directory: Arc<dyn UserDirectory> = match settings.directory.backend.as_str() {
            "fake" => Arc::new(
                FakeUserDirectory::new()
                    .with_user(1, "demo", "demo")
                    .with_phone("demo", "13800000000"),
            ),
            "http" => Arc::new(HttpUserDirectory::try_new(
                &settings.business_api.base_url,
                business_timeout,
            )?),
            other => return Err(anyhow::anyhow!("Unknown directory backend: {}", other)),
        };

        let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::try_new(
            &settings.business_api.base_url,
            business_timeout,
        )?);

        let server = Self::assemble(settings, kv, clock, directory, upstream)?;
        info!(business = %settings.business_api.base_url, "server started");
        Ok(server)
    }

    /// Wires the services on top of already-built infrastructure.
    pub fn assemble(
        settings: &Settings,
        kv: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        directory: Arc<dyn UserDirectory>,
        upstream: Arc<dyn Upstream>,
    ) -> anyhow::Result<Self> {
        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::try_new(
            JwtConfig {
                issuer: settings.jwt.issuer.clone(),
                access_ttl: Duration::from_secs(settings.jwt.access_ttl_secs),
                refresh_ttl: Duration::from_secs(settings.jwt.refresh_ttl_secs),
                access_secret: settings.jwt.access_secret.expose().as_bytes().to_vec(),
                refresh_secret: settings.jwt.refresh_secret.expose().as_bytes().to_vec(),
            },
            clock.clone(),
        )?);

        let session_store: Arc<dyn AuthSessionStore> = Arc::new(KvAuthSessionStore::new(kv.clone()));
        let session_manager: Arc<dyn SessionManager> = Arc::new(
            RealSessionManager::new(token_codec, session_store, clock.clone())
                .with_blacklist_check(settings.jwt.check_blacklist),
        );

        let policies: Vec<RatePolicy> = settings
            .rate_limit
            .policies
            .iter()
            .map(|(name, p)| {
                RatePolicy::new(name.clone(), p.max_requests, Duration::from_secs(p.window_secs))
            })
            .collect();
        for required in [LOGIN_POLICY, SMS_SEND_POLICY] {
            if !policies.iter().any(|p| p.name == required) {
                return Err(anyhow::anyhow!(
                    "rate_limit.policies.{} is not configured",
                    required
                ));
            }
        }
        let rate_limiter: Arc<dyn RateLimiter> =
            Arc::new(SlidingWindowRateLimiter::new(kv, clock.clone(), policies));

        let forwarder: Arc<dyn Forwarder> =
            Arc::new(IdentityForwarder::new(upstream, BUSINESS_PREFIX, UPSTREAM_PREFIX));

        Ok(Self {
            session_manager,
            rate_limiter,
            directory,
            forwarder,
            clock,
            trust_forwarded_for: settings.rate_limit.trust_forwarded_for,
            max_body_bytes: settings.http.max_body_bytes,
        })
    }
}
