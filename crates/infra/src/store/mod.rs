//! Transactional persistence boundary for sales, stock and metrics.
//!
//! The engine only ever talks to `PosStore`/`PosTransaction`; the backend
//! decides how serializability is achieved (one lock in memory, SERIALIZABLE
//! isolation in Postgres).

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryPosStore;
pub use postgres::PostgresPosStore;
pub use r#trait::{
    IDEMPOTENCY_KEY_CONSTRAINT, PRODUCT_SKU_CONSTRAINT, Pagination, PosStore, PosTransaction,
    RECEIPT_NUMBER_CONSTRAINT, SaleFilter, StoreError,
};
