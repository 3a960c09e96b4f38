//! Low-stock alerting.
//!
//! A product has at most one open alert. Each stock change re-evaluates it:
//! a low reading raises or refreshes the alert, recovering above the minimum
//! resolves it.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vevurn_core::{AlertId, DomainError, ProductId};

use crate::stock::ProductStock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Critical,
    OutOfStock,
}

impl AlertSeverity {
    /// Severity for a stock reading, or `None` when stock is healthy.
    pub fn classify(stock_quantity: i64, min_stock_level: i64) -> Option<Self> {
        if stock_quantity <= 0 {
            Some(AlertSeverity::OutOfStock)
        } else if stock_quantity <= min_stock_level / 2 {
            Some(AlertSeverity::Critical)
        } else if stock_quantity <= min_stock_level {
            Some(AlertSeverity::Low)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Critical => "critical",
            AlertSeverity::OutOfStock => "out_of_stock",
        }
    }
}

impl FromStr for AlertSeverity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(AlertSeverity::Low),
            "critical" => Ok(AlertSeverity::Critical),
            "out_of_stock" => Ok(AlertSeverity::OutOfStock),
            other => Err(DomainError::validation(format!("unknown alert severity '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Open,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(AlertStatus::Open),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(DomainError::validation(format!("unknown alert status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub id: AlertId,
    pub product_id: ProductId,
    pub sku: String,
    pub severity: AlertSeverity,
    pub stock_quantity: i64,
    pub min_stock_level: i64,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// What the store should do with the product's alert after a stock change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDecision {
    /// Insert a new open alert.
    Raise(StockAlert),
    /// Update the existing open alert in place.
    Refresh(StockAlert),
    /// Close the existing open alert.
    Resolve(StockAlert),
    Unchanged,
}

impl AlertDecision {
    /// The alert to announce, if this decision raised or worsened one.
    pub fn notifiable(&self, previous: Option<&StockAlert>) -> Option<&StockAlert> {
        match self {
            AlertDecision::Raise(alert) => Some(alert),
            AlertDecision::Refresh(alert) => match previous {
                Some(prev) if alert.severity > prev.severity => Some(alert),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Decide the alert transition for `product`'s current stock.
pub fn evaluate_alert(
    product: &ProductStock,
    open: Option<&StockAlert>,
    now: DateTime<Utc>,
) -> AlertDecision {
    let severity = AlertSeverity::classify(product.stock_quantity, product.min_stock_level);

    match (severity, open) {
        (Some(severity), None) => AlertDecision::Raise(StockAlert {
            id: AlertId::new(),
            product_id: product.id,
            sku: product.sku.clone(),
            severity,
            stock_quantity: product.stock_quantity,
            min_stock_level: product.min_stock_level,
            status: AlertStatus::Open,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }),
        (Some(severity), Some(existing)) => {
            if existing.severity == severity
                && existing.stock_quantity == product.stock_quantity
                && existing.min_stock_level == product.min_stock_level
            {
                return AlertDecision::Unchanged;
            }
            let mut refreshed = existing.clone();
            refreshed.severity = severity;
            refreshed.stock_quantity = product.stock_quantity;
            refreshed.min_stock_level = product.min_stock_level;
            refreshed.updated_at = now;
            AlertDecision::Refresh(refreshed)
        }
        (None, Some(existing)) => {
            let mut resolved = existing.clone();
            resolved.status = AlertStatus::Resolved;
            resolved.stock_quantity = product.stock_quantity;
            resolved.updated_at = now;
            resolved.resolved_at = Some(now);
            AlertDecision::Resolve(resolved)
        }
        (None, None) => AlertDecision::Unchanged,
    }
}
