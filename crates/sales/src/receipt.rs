//! Receipt numbering and the tamper-evident transaction hash.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use vevurn_core::{DomainError, Money, SaleId, UserId};

use crate::sale::SaleItem;

const RECEIPT_PREFIX: &str = "RCP";
const SEQUENCE_KEY_PREFIX: &str = "vevurn:seq:receipt";

/// Human-facing sale number, `RCP-YYYYMMDD-NNNNNN`.
///
/// The counter is zero-padded to six digits and widens past 999 999.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptNumber(String);

impl ReceiptNumber {
    pub fn format(date: NaiveDate, sequence: u64) -> Self {
        Self(format!(
            "{RECEIPT_PREFIX}-{}-{sequence:06}",
            date.format("%Y%m%d")
        ))
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let invalid = || DomainError::validation(format!("invalid receipt number '{raw}'"));

        let mut parts = raw.splitn(3, '-');
        let (Some(prefix), Some(date), Some(seq)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if prefix != RECEIPT_PREFIX
            || seq.len() < 6
            || !seq.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| invalid())?;
        seq.parse::<u64>().map_err(|_| invalid())?;

        Ok(Self(raw.to_string()))
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.0
            .get(4..12)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl core::fmt::Display for ReceiptNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counter key for a business date's receipt sequence.
pub fn receipt_sequence_key(date: NaiveDate) -> String {
    format!("{SEQUENCE_KEY_PREFIX}:{}", date.format("%Y%m%d"))
}

/// Lowercase hex SHA-256 over the sale's canonical form:
/// `sale_id|receipt|cashier|created_at|total|pid:qty:price,pid:qty:price`.
pub fn compute_transaction_hash(
    sale_id: SaleId,
    receipt_number: &ReceiptNumber,
    cashier_id: UserId,
    created_at: DateTime<Utc>,
    total: Money,
    items: &[SaleItem],
) -> String {
    let lines = items
        .iter()
        .map(|i| format!("{}:{}:{}", i.product_id, i.quantity, i.unit_price))
        .collect::<Vec<_>>()
        .join(",");

    let canonical = format!(
        "{sale_id}|{receipt_number}|{cashier_id}|{}|{total}|{lines}",
        created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );

    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use vevurn_core::{ProductId, SaleItemId};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
    }

    #[test]
    fn receipt_number_layout() {
        let r = ReceiptNumber::format(date(), 42);
        assert_eq!(r.as_str(), "RCP-20260315-000042");
        assert_eq!(r.date(), Some(date()));
        assert_eq!(receipt_sequence_key(date()), "vevurn:seq:receipt:20260315");
    }

    #[test]
    fn counter_widens_instead_of_wrapping() {
        let r = ReceiptNumber::format(date(), 1_000_000);
        assert_eq!(r.as_str(), "RCP-20260315-1000000");
        assert!(ReceiptNumber::parse(r.as_str()).is_ok());
    }

    #[test]
    fn parse_rejects_garbage() {
        for raw in ["", "RCP-20260315", "INV-20260315-000001", "RCP-20261315-000001", "RCP-20260315-12a456", "RCP-20260315-123"] {
            assert!(ReceiptNumber::parse(raw).is_err(), "input {raw}");
        }
    }

    fn item(sale_id: SaleId, qty: i64, price: i64) -> SaleItem {
        SaleItem {
            id: SaleItemId::new(),
            sale_id,
            product_id: ProductId::new(),
            sku: "SKU".to_string(),
            name: "Item".to_string(),
            quantity: qty,
            unit_price: Money::new(price),
            line_total: Money::new(qty * price),
        }
    }

    #[test]
    fn hash_is_deterministic_and_sensitive_to_lines() {
        let sale_id = SaleId::new();
        let cashier = UserId::new();
        let receipt = ReceiptNumber::format(date(), 1);
        let at = Utc.with_ymd_and_hms(2026, 3, 15, 9, 0, 0).unwrap();
        let items = vec![item(sale_id, 2, 1_000), item(sale_id, 1, 500)];

        let a = compute_transaction_hash(sale_id, &receipt, cashier, at, Money::new(2_500), &items);
        let b = compute_transaction_hash(sale_id, &receipt, cashier, at, Money::new(2_500), &items);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let mut tampered = items.clone();
        tampered[0].quantity = 3;
        let c = compute_transaction_hash(sale_id, &receipt, cashier, at, Money::new(2_500), &tampered);
        assert_ne!(a, c);
    }

    proptest! {
        #[test]
        fn formatted_numbers_parse_back(seq in 1u64..100_000_000) {
            let r = ReceiptNumber::format(date(), seq);
            prop_assert_eq!(ReceiptNumber::parse(r.as_str()).unwrap(), r);
        }
    }
}
