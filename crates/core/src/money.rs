//! Money in the smallest currency unit.
//!
//! Amounts are plain integers (RWF has no minor unit; other currencies use
//! cents). All arithmetic is checked: an overflow is a `DomainError::Overflow`, not
//! a panic.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Basis points in one whole (100%).
pub const BPS_SCALE: i64 = 10_000;

#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn new(amount: i64) -> Self {
        Self(amount)
    }

    pub const fn amount(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::overflow("amount"))
    }

    pub fn checked_sub(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::overflow("amount"))
    }

    /// Multiply a unit price by a quantity.
    pub fn checked_mul(self, quantity: i64) -> DomainResult<Money> {
        self.0
            .checked_mul(quantity)
            .map(Money)
            .ok_or_else(|| DomainError::overflow("amount"))
    }

    /// Share of this amount expressed in basis points, rounded half away from zero.
    pub fn percent_bps(self, bps: u32) -> DomainResult<Money> {
        let raw = i128::from(self.0) * i128::from(bps);
        let scale = i128::from(BPS_SCALE);
        let half = scale / 2;
        let rounded = if raw >= 0 {
            (raw + half) / scale
        } else {
            (raw - half) / scale
        };
        i64::try_from(rounded)
            .map(Money)
            .map_err(|_| DomainError::overflow("amount"))
    }

    pub fn negate(self) -> Money {
        Money(-self.0)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(Money::new(1000).percent_bps(1800).unwrap(), Money::new(180));
        // 25 * 18% = 4.5 -> 5
        assert_eq!(Money::new(25).percent_bps(1800).unwrap(), Money::new(5));
        // 24 * 18% = 4.32 -> 4
        assert_eq!(Money::new(24).percent_bps(1800).unwrap(), Money::new(4));
        assert_eq!(Money::new(-25).percent_bps(1800).unwrap(), Money::new(-5));
    }

    #[test]
    fn overflow_is_reported_not_wrapped() {
        let err = Money::new(i64::MAX).checked_add(Money::new(1)).unwrap_err();
        assert_eq!(err, DomainError::Overflow("amount"));

        let err = Money::new(i64::MAX / 2).checked_mul(3).unwrap_err();
        assert_eq!(err, DomainError::Overflow("amount"));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 500,
            ..ProptestConfig::default()
        })]

        /// A share never exceeds the whole for rates up to 100%.
        #[test]
        fn share_is_bounded(amount in 0i64..1_000_000_000, bps in 0u32..=10_000) {
            let share = Money::new(amount).percent_bps(bps).unwrap();
            prop_assert!(share >= Money::ZERO);
            prop_assert!(share <= Money::new(amount));
        }

        #[test]
        fn add_then_sub_is_identity(a in -1_000_000_000i64..1_000_000_000, b in -1_000_000_000i64..1_000_000_000) {
            let sum = Money::new(a).checked_add(Money::new(b)).unwrap();
            prop_assert_eq!(sum.checked_sub(Money::new(b)).unwrap(), Money::new(a));
        }
    }
}
