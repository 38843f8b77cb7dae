use crate::domain_port::*;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::sync::Arc;

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

enum Slot {
    Str(String),
    ZSet(HashMap<String, f64>),
}

struct Record {
    slot: Slot,
    expires_at: Option<i64>,
}

impl Record {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Single-process stand-in for Redis with the same expiry and sorted-set
/// semantics, driven by an injected [`Clock`]. Suitable for development
/// and tests; state is not shared between gateway instances.
pub struct MemoryKvStore {
    records: DashMap<String, Record>,
    clock: Arc<dyn Clock>,
}

impl MemoryKvStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        MemoryKvStore {
            records: DashMap::new(),
            clock,
        }
    }

    fn now(&self) -> i64 {
        self.clock.now_secs()
    }

    fn purge_expired(&self, key: &str, now: i64) {
        self.records.remove_if(key, |_, record| !record.is_live(now));
    }

    fn wrong_type() -> StoreError {
        StoreError::Backend(WRONG_TYPE.to_string())
    }

    fn deadline(now: i64, ttl_secs: u64) -> Result<i64, StoreError> {
        i64::try_from(ttl_secs)
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| StoreError::Backend(format!("invalid expire time: {ttl_secs}")))
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.now();
        self.purge_expired(key, now);
        match self.records.get(key) {
            None => Ok(None),
            Some(record) => match &record.slot {
                Slot::Str(value) => Ok(Some(value.clone())),
                Slot::ZSet(_) => Err(Self::wrong_type()),
            },
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let expires_at = Self::deadline(self.now(), ttl_secs)?;
        self.records.insert(
            key.to_string(),
            Record {
                slot: Slot::Str(value.to_string()),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.now();
        self.purge_expired(key, now);
        Ok(self.records.remove(key).is_some())
    }

    async fn incr_ex(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError> {
        let now = self.now();
        let expires_at = Self::deadline(now, ttl_secs)?;
        self.purge_expired(key, now);
        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => match &mut occupied.get_mut().slot {
                Slot::Str(value) => {
                    let n = value
                        .parse::<i64>()
                        .map_err(|_| StoreError::Backend("value is not an integer".into()))?
                        + 1;
                    *value = n.to_string();
                    Ok(n)
                }
                Slot::ZSet(_) => Err(Self::wrong_type()),
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Record {
                    slot: Slot::Str("1".to_string()),
                    expires_at: Some(expires_at),
                });
                Ok(1)
            }
        }
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let now = self.now();
        self.purge_expired(key, now);
        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => match &mut occupied.get_mut().slot {
                Slot::ZSet(members) => {
                    members.insert(member.to_string(), score);
                    Ok(())
                }
                Slot::Str(_) => Err(Self::wrong_type()),
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Record {
                    slot: Slot::ZSet(HashMap::from([(member.to_string(), score)])),
                    expires_at: None,
                });
                Ok(())
            }
        }
    }

    async fn zrembyscore(&self, key: &str, min: f64, max: f64) -> Result<u64, StoreError> {
        let now = self.now();
        self.purge_expired(key, now);
        let removed = match self.records.get_mut(key) {
            None => return Ok(0),
            Some(mut record) => match &mut record.slot {
                Slot::ZSet(members) => {
                    let before = members.len();
                    members.retain(|_, score| *score < min || *score > max);
                    (before - members.len()) as u64
                }
                Slot::Str(_) => return Err(Self::wrong_type()),
            },
        };
        // Redis drops a sorted set once its last member is gone.
        self.records
            .remove_if(key, |_, record| matches!(&record.slot, Slot::ZSet(m) if m.is_empty()));
        Ok(removed)
    }

    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        let now = self.now();
        self.purge_expired(key, now);
        match self.records.get(key) {
            None => Ok(0),
            Some(record) => match &record.slot {
                Slot::ZSet(members) => Ok(members.len() as u64),
                Slot::Str(_) => Err(Self::wrong_type()),
            },
        }
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let now = self.now();
        let expires_at = Self::deadline(now, ttl_secs)?;
        self.purge_expired(key, now);
        match self.records.get_mut(key) {
            None => Ok(false),
            Some(mut record) => {
                record.expires_at = Some(expires_at);
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store() -> (Arc<ManualClock>, MemoryKvStore) {
        let clock = Arc::new(ManualClock::at_secs(1_700_000_000));
        let store = MemoryKvStore::new(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn values_vanish_when_ttl_elapses() {
        let (clock, store) = store();
        store.set_ex("refresh_token:1", "abc", 10).await.unwrap();
        assert_eq!(store.get("refresh_token:1").await.unwrap().as_deref(), Some("abc"));

        clock.advance(Duration::from_secs(9));
        assert!(store.get("refresh_token:1").await.unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("refresh_token:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn del_reports_whether_anything_was_removed() {
        let (_, store) = store();
        store.set_ex("k", "v", 60).await.unwrap();
        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());
    }

    #[tokio::test]
    async fn incr_ex_keeps_the_expiry_of_the_first_increment() {
        let (clock, store) = store();
        assert_eq!(store.incr_ex("otp:1", 10).await.unwrap(), 1);
        clock.advance(Duration::from_secs(6));
        assert_eq!(store.incr_ex("otp:1", 10).await.unwrap(), 2);

        // Still anchored to the first call, so it is gone 10s after that.
        clock.advance(Duration::from_secs(4));
        assert_eq!(store.incr_ex("otp:1", 10).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sorted_set_prune_count_and_expire() {
        let (clock, store) = store();
        store.zadd("login:1.2.3.4", "100-a", 100.0).await.unwrap();
        store.zadd("login:1.2.3.4", "150-b", 150.0).await.unwrap();
        store.zadd("login:1.2.3.4", "200-c", 200.0).await.unwrap();
        assert_eq!(store.zcard("login:1.2.3.4").await.unwrap(), 3);

        // Inclusive on both ends, like ZREMRANGEBYSCORE.
        let removed = store.zrembyscore("login:1.2.3.4", 0.0, 150.0).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.zcard("login:1.2.3.4").await.unwrap(), 1);

        assert!(store.expire("login:1.2.3.4", 5).await.unwrap());
        clock.advance(Duration::from_secs(5));
        assert_eq!(store.zcard("login:1.2.3.4").await.unwrap(), 0);
        assert!(!store.expire("login:1.2.3.4", 5).await.unwrap());
    }

    #[tokio::test]
    async fn type_mismatch_is_a_store_error() {
        let (_, store) = store();
        store.set_ex("k", "v", 60).await.unwrap();
        assert!(matches!(
            store.zadd("k", "m", 1.0).await,
            Err(StoreError::Backend(_))
        ));
        store.zadd("z", "m", 1.0).await.unwrap();
        assert!(matches!(store.get("z").await, Err(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn out_of_range_ttl_is_refused_without_touching_the_key() {
        let (_, store) = store();
        store.set_ex("k", "v", 60).await.unwrap();

        assert!(matches!(
            store.set_ex("k", "w", u64::MAX).await,
            Err(StoreError::Backend(_))
        ));
        assert!(store.incr_ex("n", u64::MAX).await.is_err());
        assert!(store.expire("k", i64::MAX as u64).await.is_err());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.get("n").await.unwrap(), None);
    }
}
