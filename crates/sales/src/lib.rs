//! Point-of-sale domain module.
//!
//! Everything a checkout *decides* lives here as deterministic logic: request
//! validation, payment-method rules, pricing and totals, the sale lifecycle,
//! receipt numbering, the transaction hash, and the metrics a sale contributes.
//! Persistence and transaction orchestration live in `vevurn-infra`.

pub mod cart;
pub mod clock;
pub mod events;
pub mod metrics;
pub mod payment;
pub mod pricing;
pub mod receipt;
pub mod sale;

pub use cart::{CartLine, CheckoutRequest, ValidatedCheckout, MAX_LINE_QUANTITY};
pub use clock::BusinessClock;
pub use events::{
    MobileMoneyRequested, PaymentSettled, PosEvent, SaleRecorded, SaleVoided, StockLow,
};
pub use metrics::{BusinessMetrics, DailyMetrics, HourlyMetrics};
pub use payment::{
    MobileMoneyCharge, MobileMoneyPayment, MobileMoneyProvider, MobileMoneyStatus, PaymentKind,
    PaymentMethod, PaymentOutcome, PaymentStatus, normalize_msisdn,
};
pub use pricing::{PricedLine, SaleTotals, Tender, compute_totals, price_line, settle_tender};
pub use receipt::{ReceiptNumber, compute_transaction_hash, receipt_sequence_key};
pub use sale::{NewSale, Sale, SaleItem, SaleStatus};
