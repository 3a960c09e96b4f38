//! Redis-backed sequence (optional).
//!
//! `INCR` + `EXPIRE` in a `MULTI` block, so every till sharing the Redis
//! instance draws from the same daily counter.

use std::time::Duration;

use super::{SequenceError, SequenceGenerator};

#[derive(Debug, Clone)]
pub struct RedisSequence {
    client: redis::Client,
}

impl RedisSequence {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, SequenceError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| SequenceError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl SequenceGenerator for RedisSequence {
    async fn next(&self, key: &str, ttl: Duration) -> Result<u64, SequenceError> {
        let client = self.client.clone();
        let key = key.to_string();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

        tokio::task::spawn_blocking(move || {
            let mut conn = client
                .get_connection()
                .map_err(|e| SequenceError::Unavailable(e.to_string()))?;

            let (value,): (u64,) = redis::pipe()
                .atomic()
                .incr(&key, 1)
                .expire(&key, ttl_secs)
                .ignore()
                .query(&mut conn)
                .map_err(|e| SequenceError::Unavailable(e.to_string()))?;

            Ok(value)
        })
        .await
        .map_err(|e| SequenceError::Unavailable(format!("sequence task failed: {e}")))?
    }
}
