use core::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use vevurn_core::{CustomerId, DomainError, Money, PaymentId, SaleId};

/// Mobile-money operators supported at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MobileMoneyProvider {
    Mtn,
    Airtel,
}

impl MobileMoneyProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            MobileMoneyProvider::Mtn => "mtn",
            MobileMoneyProvider::Airtel => "airtel",
        }
    }

    /// Network prefixes, matched right after `250` in the normalised form.
    fn prefixes(&self) -> &'static [&'static str] {
        match self {
            MobileMoneyProvider::Mtn => &["78", "79"],
            MobileMoneyProvider::Airtel => &["72", "73"],
        }
    }

    pub fn owns(&self, msisdn: &str) -> bool {
        msisdn
            .get(3..5)
            .map(|p| self.prefixes().contains(&p))
            .unwrap_or(false)
    }
}

impl FromStr for MobileMoneyProvider {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mtn" => Ok(MobileMoneyProvider::Mtn),
            "airtel" => Ok(MobileMoneyProvider::Airtel),
            other => Err(DomainError::validation(format!("unknown mobile money provider '{other}'"))),
        }
    }
}

/// Normalise a Rwandan mobile number to `2507XXXXXXXX`.
///
/// Accepts `07XXXXXXXX`, `7XXXXXXXX`, `2507XXXXXXXX` and `+2507XXXXXXXX`;
/// spaces, dashes and parentheses are ignored.
pub fn normalize_msisdn(raw: &str) -> Result<String, DomainError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let cleaned = cleaned.strip_prefix('+').unwrap_or(cleaned.as_str());

    if !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(DomainError::validation("phone number must contain only digits"));
    }

    let local = if cleaned.len() == 12 && cleaned.starts_with("250") {
        &cleaned[3..]
    } else if cleaned.len() == 10 && cleaned.starts_with('0') {
        &cleaned[1..]
    } else {
        cleaned
    };

    if local.len() != 9 || !local.starts_with('7') {
        return Err(DomainError::validation(format!("invalid mobile number '{raw}'")));
    }

    Ok(format!("250{local}"))
}

/// Payment method chosen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash {
        tendered: Money,
    },
    MobileMoney {
        provider: MobileMoneyProvider,
        phone: String,
    },
    Card {
        reference: String,
    },
    BankTransfer {
        reference: String,
    },
    /// Sale on credit (customer loan), settled outside the checkout.
    Credit,
}

/// Storage-level discriminant of [`PaymentMethod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Cash,
    MobileMoney,
    Card,
    BankTransfer,
    Credit,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Cash => "cash",
            PaymentKind::MobileMoney => "mobile_money",
            PaymentKind::Card => "card",
            PaymentKind::BankTransfer => "bank_transfer",
            PaymentKind::Credit => "credit",
        }
    }
}

impl FromStr for PaymentKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentKind::Cash),
            "mobile_money" => Ok(PaymentKind::MobileMoney),
            "card" => Ok(PaymentKind::Card),
            "bank_transfer" => Ok(PaymentKind::BankTransfer),
            "credit" => Ok(PaymentKind::Credit),
            other => Err(DomainError::validation(format!("unknown payment method '{other}'"))),
        }
    }
}

impl PaymentMethod {
    pub fn kind(&self) -> PaymentKind {
        match self {
            PaymentMethod::Cash { .. } => PaymentKind::Cash,
            PaymentMethod::MobileMoney { .. } => PaymentKind::MobileMoney,
            PaymentMethod::Card { .. } => PaymentKind::Card,
            PaymentMethod::BankTransfer { .. } => PaymentKind::BankTransfer,
            PaymentMethod::Credit => PaymentKind::Credit,
        }
    }

    /// Reference stored alongside the sale (phone, card slip, transfer id).
    pub fn reference(&self) -> Option<&str> {
        match self {
            PaymentMethod::MobileMoney { phone, .. } => Some(phone.as_str()),
            PaymentMethod::Card { reference } | PaymentMethod::BankTransfer { reference } => {
                Some(reference.as_str())
            }
            PaymentMethod::Cash { .. } | PaymentMethod::Credit => None,
        }
    }

    /// Validate method-specific fields and return the canonical form.
    ///
    /// Cash tender is checked against the total later, once prices are known.
    pub fn normalized(&self, customer_id: Option<CustomerId>) -> Result<PaymentMethod, DomainError> {
        match self {
            PaymentMethod::Cash { tendered } => {
                if tendered.is_negative() {
                    return Err(DomainError::validation("tendered amount cannot be negative"));
                }
                Ok(self.clone())
            }
            PaymentMethod::MobileMoney { provider, phone } => {
                let msisdn = normalize_msisdn(phone)?;
                if !provider.owns(&msisdn) {
                    return Err(DomainError::validation(format!(
                        "phone number {msisdn} is not a {} number",
                        provider.as_str()
                    )));
                }
                Ok(PaymentMethod::MobileMoney {
                    provider: *provider,
                    phone: msisdn,
                })
            }
            PaymentMethod::Card { reference } | PaymentMethod::BankTransfer { reference } => {
                let reference = reference.trim();
                if reference.is_empty() {
                    return Err(DomainError::validation("payment reference is required"));
                }
                Ok(match self {
                    PaymentMethod::Card { .. } => PaymentMethod::Card {
                        reference: reference.to_string(),
                    },
                    _ => PaymentMethod::BankTransfer {
                        reference: reference.to_string(),
                    },
                })
            }
            PaymentMethod::Credit => {
                if customer_id.is_none() {
                    return Err(DomainError::validation("credit sales require a customer"));
                }
                Ok(PaymentMethod::Credit)
            }
        }
    }
}

/// Settlement state of a sale's payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Pending,
    /// Credit sale, collected later.
    Outstanding,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Outstanding => "outstanding",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid" => Ok(PaymentStatus::Paid),
            "pending" => Ok(PaymentStatus::Pending),
            "outstanding" => Ok(PaymentStatus::Outstanding),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(DomainError::validation(format!("unknown payment status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MobileMoneyStatus {
    Pending,
    Successful,
    Failed,
    Expired,
}

impl MobileMoneyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MobileMoneyStatus::Pending => "pending",
            MobileMoneyStatus::Successful => "successful",
            MobileMoneyStatus::Failed => "failed",
            MobileMoneyStatus::Expired => "expired",
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, MobileMoneyStatus::Pending)
    }
}

impl FromStr for MobileMoneyStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MobileMoneyStatus::Pending),
            "successful" => Ok(MobileMoneyStatus::Successful),
            "failed" => Ok(MobileMoneyStatus::Failed),
            "expired" => Ok(MobileMoneyStatus::Expired),
            other => Err(DomainError::validation(format!("unknown mobile money status '{other}'"))),
        }
    }
}

/// Provider verdict on a mobile-money request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Successful { provider_transaction_id: String },
    Failed { reason: String },
    Expired,
}

/// Pending mobile-money collection tied to a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileMoneyPayment {
    pub id: PaymentId,
    pub sale_id: SaleId,
    pub provider: MobileMoneyProvider,
    pub phone: String,
    pub amount: Money,
    pub currency: String,
    /// External reference shared with the provider (the receipt number).
    pub reference: String,
    pub status: MobileMoneyStatus,
    pub provider_transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the gateway needs to push a collection prompt to the customer's phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileMoneyCharge {
    pub payment_id: PaymentId,
    pub provider: MobileMoneyProvider,
    pub phone: String,
    pub amount: Money,
    pub currency: String,
    pub reference: String,
}

impl MobileMoneyPayment {
    #[allow(clippy::too_many_arguments)]
    pub fn request(
        sale_id: SaleId,
        provider: MobileMoneyProvider,
        phone: String,
        amount: Money,
        currency: impl Into<String>,
        reference: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            sale_id,
            provider,
            phone,
            amount,
            currency: currency.into(),
            reference: reference.into(),
            status: MobileMoneyStatus::Pending,
            provider_transaction_id: None,
            failure_reason: None,
            expires_at: now + ttl,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == MobileMoneyStatus::Pending && self.expires_at <= now
    }

    /// Apply a provider outcome. Returns `false` when the payment was already
    /// final, in which case nothing changes.
    pub fn settle(&mut self, outcome: &PaymentOutcome, now: DateTime<Utc>) -> bool {
        if self.status.is_final() {
            return false;
        }
        match outcome {
            PaymentOutcome::Successful {
                provider_transaction_id,
            } => {
                self.status = MobileMoneyStatus::Successful;
                self.provider_transaction_id = Some(provider_transaction_id.clone());
            }
            PaymentOutcome::Failed { reason } => {
                self.status = MobileMoneyStatus::Failed;
                self.failure_reason = Some(reason.clone());
            }
            PaymentOutcome::Expired => {
                self.status = MobileMoneyStatus::Expired;
                self.failure_reason = Some("payment request expired".to_string());
            }
        }
        self.updated_at = now;
        true
    }

    pub fn charge(&self) -> MobileMoneyCharge {
        MobileMoneyCharge {
            payment_id: self.id,
            provider: self.provider,
            phone: self.phone.clone(),
            amount: self.amount,
            currency: self.currency.clone(),
            reference: self.reference.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msisdn_forms_normalise_to_international() {
        for raw in ["0788123456", "788123456", "250788123456", "+250 788-123-456"] {
            assert_eq!(normalize_msisdn(raw).unwrap(), "250788123456", "input {raw}");
        }
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        for raw in ["", "0688123456", "07881234", "25078812345x", "+1 415 555 0100"] {
            assert!(normalize_msisdn(raw).is_err(), "input {raw}");
        }
    }

    #[test]
    fn provider_must_own_the_prefix() {
        let mtn = PaymentMethod::MobileMoney {
            provider: MobileMoneyProvider::Mtn,
            phone: "0788123456".to_string(),
        };
        assert!(mtn.normalized(None).is_ok());

        let wrong = PaymentMethod::MobileMoney {
            provider: MobileMoneyProvider::Airtel,
            phone: "0788123456".to_string(),
        };
        assert!(wrong.normalized(None).is_err());

        let airtel = PaymentMethod::MobileMoney {
            provider: MobileMoneyProvider::Airtel,
            phone: "0731234567".to_string(),
        };
        assert_eq!(
            airtel.normalized(None).unwrap().reference(),
            Some("250731234567")
        );
    }

    #[test]
    fn credit_requires_a_customer() {
        assert!(PaymentMethod::Credit.normalized(None).is_err());
        assert!(PaymentMethod::Credit.normalized(Some(CustomerId::new())).is_ok());
    }

    #[test]
    fn card_reference_is_trimmed_and_required() {
        let blank = PaymentMethod::Card {
            reference: "   ".to_string(),
        };
        assert!(blank.normalized(None).is_err());

        let card = PaymentMethod::Card {
            reference: " slip-42 ".to_string(),
        };
        assert_eq!(card.normalized(None).unwrap().reference(), Some("slip-42"));
    }

    #[test]
    fn payment_method_json_is_tagged() {
        let json = serde_json::json!({"type": "mobile_money", "provider": "mtn", "phone": "0788123456"});
        let method: PaymentMethod = serde_json::from_value(json).unwrap();
        assert_eq!(method.kind(), PaymentKind::MobileMoney);

        let credit: PaymentMethod = serde_json::from_value(serde_json::json!({"type": "credit"})).unwrap();
        assert_eq!(credit, PaymentMethod::Credit);
    }

    #[test]
    fn settling_a_final_payment_is_a_no_op() {
        let now = Utc::now();
        let mut payment = MobileMoneyPayment::request(
            SaleId::new(),
            MobileMoneyProvider::Mtn,
            "250788123456".to_string(),
            Money::new(10_000),
            "RWF",
            "RCP-20260101-000001",
            now,
            Duration::minutes(5),
        );
        assert!(!payment.is_expired(now));
        assert!(payment.is_expired(now + Duration::minutes(5)));

        assert!(payment.settle(
            &PaymentOutcome::Successful {
                provider_transaction_id: "MP123".to_string()
            },
            now
        ));
        assert!(!payment.settle(
            &PaymentOutcome::Failed {
                reason: "late failure".to_string()
            },
            now
        ));
        assert_eq!(payment.status, MobileMoneyStatus::Successful);
        assert_eq!(payment.failure_reason, None);
    }
}
