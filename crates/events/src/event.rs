use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - only published after the transaction that produced them committed
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "sale.recorded").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Identifier of the record the event is about (sale, product, payment).
    fn subject_id(&self) -> Uuid;

    /// Kind of record `subject_id` refers to (e.g. "sale", "product").
    fn subject_type(&self) -> &'static str;
}
