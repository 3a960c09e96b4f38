use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Timelike, Utc};

use vevurn_core::DomainError;

/// Maps instants to the shop's calendar (receipt dates, metric buckets).
///
/// Timestamps are stored in UTC; the business day is whatever the shop's wall
/// clock says, so a sale at 23:30 UTC in Kigali (UTC+2) belongs to the next day.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BusinessClock {
    offset: FixedOffset,
}

impl BusinessClock {
    pub fn from_offset_minutes(minutes: i32) -> Result<Self, DomainError> {
        let offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| DomainError::validation(format!("invalid UTC offset: {minutes} minutes")))?;
        Ok(Self { offset })
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    pub fn hour(&self, at: DateTime<Utc>) -> u32 {
        at.with_timezone(&self.offset).hour()
    }
}

impl Default for BusinessClock {
    fn default() -> Self {
        Self::utc()
    }
}
