//! Daily receipt sequence allocation.
//!
//! Sequence numbers are allocated outside the sale transaction, so a retried or
//! failed checkout burns its number. Receipt numbers are unique and increasing
//! within a business date, but gaps are expected.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use vevurn_sales::{BusinessClock, ReceiptNumber, receipt_sequence_key};

pub use in_memory::InMemorySequence;
#[cfg(feature = "redis")]
pub use self::redis::RedisSequence;

/// How long a day's counter is kept after its last use.
pub const RECEIPT_SEQUENCE_TTL: Duration = Duration::from_secs(48 * 60 * 60);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("sequence backend unavailable: {0}")]
    Unavailable(String),
}

/// Atomic per-key counter.
#[async_trait::async_trait]
pub trait SequenceGenerator: Send + Sync {
    /// Increment `key` and return the new value (first call returns 1).
    /// `ttl` is refreshed on every call.
    async fn next(&self, key: &str, ttl: Duration) -> Result<u64, SequenceError>;
}

/// Formats receipt numbers from the counter for the current business date.
#[derive(Clone)]
pub struct ReceiptNumberAllocator {
    generator: Arc<dyn SequenceGenerator>,
    clock: BusinessClock,
}

impl ReceiptNumberAllocator {
    pub fn new(generator: Arc<dyn SequenceGenerator>, clock: BusinessClock) -> Self {
        Self { generator, clock }
    }

    pub async fn allocate(&self, now: DateTime<Utc>) -> Result<ReceiptNumber, SequenceError> {
        let date = self.clock.date(now);
        let key = receipt_sequence_key(date);
        let sequence = self.generator.next(&key, RECEIPT_SEQUENCE_TTL).await?;
        Ok(ReceiptNumber::format(date, sequence))
    }
}

impl core::fmt::Debug for ReceiptNumberAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReceiptNumberAllocator")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
