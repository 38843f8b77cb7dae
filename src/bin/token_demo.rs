use std::sync::Arc;
use std::time::Duration;
use tollgate::application_impl::*;
use tollgate::application_port::*;
use tollgate::domain_model::*;
use tollgate::domain_port::*;
use tollgate::infra_kv::*;
use tollgate::logger::*;

/// Walks a session through login, refresh and logout against the in-process store.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logger = Logger::new_bootstrap();
    debug!("not shown at the bootstrap level");
    logger.reload_from_config(&LogConfig {
        filter: "debug".to_string(),
    })?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new(clock.clone()));
    let codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::try_new(
        JwtConfig {
            issuer: "tollgate.demo".into(),
            access_ttl: Duration::from_secs(900),
            refresh_ttl: Duration::from_secs(86400),
            access_secret: b"demo-access".to_vec(),
            refresh_secret: b"demo-refresh".to_vec(),
        },
        clock.clone(),
    )?);
    let sessions = RealSessionManager::new(codec, Arc::new(KvAuthSessionStore::new(kv)), clock);

    let alice = Identity::new(SubjectId(42), "alice");
    let pair = sessions.login(&alice).await?;
    info!(expires_in = pair.expires_in(), "access token: {}", pair.access_token.0);

    let claims = sessions.verify_access(&pair.access_token).await?;
    info!(?claims, "verified");

    let rotated = sessions.refresh(&pair.refresh_token).await?;
    let replay = sessions.refresh(&pair.refresh_token).await;
    info!(replay_rejected = replay.is_err(), "rotated");

    sessions
        .logout(claims.subject_id, &claims.token_id, claims.expires_at)
        .await?;
    let revoked = sessions.verify_access(&pair.access_token).await;
    let after_logout = sessions.refresh(&rotated.refresh_token).await;
    info!(
        access_revoked = revoked.is_err(),
        refresh_dead = after_logout.is_err(),
        "logged out"
    );
    Ok(())
}
