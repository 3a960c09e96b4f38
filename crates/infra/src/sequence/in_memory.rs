use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{SequenceError, SequenceGenerator};

/// Process-local counters. Single-node deployments and tests only.
#[derive(Debug, Default)]
pub struct InMemorySequence {
    counters: Mutex<HashMap<String, (u64, Instant)>>,
}

impl InMemorySequence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SequenceGenerator for InMemorySequence {
    async fn next(&self, key: &str, ttl: Duration) -> Result<u64, SequenceError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| SequenceError::Unavailable("sequence lock poisoned".to_string()))?;

        let now = Instant::now();
        counters.retain(|_, (_, expires_at)| *expires_at > now);

        let entry = counters.entry(key.to_string()).or_insert((0, now));
        entry.0 += 1;
        entry.1 = now + ttl;
        Ok(entry.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn counters_are_independent_per_key() {
        let seq = InMemorySequence::new();
        let ttl = Duration::from_secs(60);
        assert_eq!(seq.next("a", ttl).await.unwrap(), 1);
        assert_eq!(seq.next("a", ttl).await.unwrap(), 2);
        assert_eq!(seq.next("b", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_counters_start_over() {
        let seq = InMemorySequence::new();
        assert_eq!(seq.next("a", Duration::ZERO).await.unwrap(), 1);
        assert_eq!(seq.next("a", Duration::ZERO).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_never_share_a_value() {
        let seq = Arc::new(InMemorySequence::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let seq = seq.clone();
            handles.push(tokio::spawn(async move {
                seq.next("k", Duration::from_secs(60)).await.unwrap()
            }));
        }

        let mut values = Vec::new();
        for h in handles {
            values.push(h.await.unwrap());
        }
        values.sort_unstable();
        assert_eq!(values, (1..=50).collect::<Vec<u64>>());
    }
}
