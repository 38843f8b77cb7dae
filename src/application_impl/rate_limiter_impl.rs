use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use nanoid::nanoid;
use std::collections::HashMap;
use std::sync::Arc;

/// Sliding-window limiter over sorted sets: one member per admitted request,
/// scored by its unix second.
///
/// If the store cannot be reached the request is admitted (fail-open).
/// Limiting is defence in depth here; availability of login wins over it.
pub struct SlidingWindowRateLimiter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    policies: HashMap<String, RatePolicy>,
}

impl SlidingWindowRateLimiter {
    pub fn new(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        policies: impl IntoIterator<Item = RatePolicy>,
    ) -> Self {
        let policies = policies
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Self {
            store,
            clock,
            policies,
        }
    }

    pub fn policy(&self, name: &str) -> Option<&RatePolicy> {
        self.policies.get(name)
    }

    /// `Some(remaining)` when admitted, `None` when the window is full.
    async fn slide(&self, policy: &RatePolicy, key: &str, now: i64) -> Result<Option<u64>, StoreError> {
        let window_start = now - policy.window_secs() as i64;

        self.store
            .zrembyscore(key, 0.0, window_start as f64)
            .await?;

        let count = self.store.zcard(key).await?;
        if count >= policy.max_requests {
            return Ok(None);
        }

        let member = format!("{}-{}", now, nanoid!(10));
        self.store.zadd(key, &member, now as f64).await?;
        self.store.expire(key, policy.window_secs()).await?;

        Ok(Some(policy.max_requests - count - 1))
    }
}

#[async_trait::async_trait]
impl RateLimiter for SlidingWindowRateLimiter {
    async fn admit(&self, policy: &str, client_key: &str) -> Result<Admission, RateLimitError> {
        let policy = self
            .policies
            .get(policy)
            .ok_or_else(|| RateLimitError::UnknownPolicy(policy.to_string()))?;
        let key = policy.key(client_key);
        let now = self.clock.now_secs();

        match self.slide(policy, &key, now).await {
            Ok(Some(remaining)) => Ok(Admission {
                remaining,
                degraded: false,
            }),
            Ok(None) => {
                debug!(policy = %policy.name, client = %client_key, "rate limit exceeded");
                Err(RateLimitError::RateExceeded {
                    policy: policy.name.clone(),
                })
            }
            Err(e) => {
                warn!(policy = %policy.name, "rate limit store unavailable, admitting: {}", e);
                Ok(Admission {
                    remaining: policy.max_requests,
                    degraded: true,
                })
            }
        }
    }
}
