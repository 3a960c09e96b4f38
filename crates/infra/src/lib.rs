//! Infrastructure layer: stores, sequence generation, the mobile-money
//! boundary, configuration and the sale transaction engine.

pub mod config;
pub mod engine;
pub mod mobile_money;
pub mod sequence;
pub mod store;

pub use config::{ConfigError, PosConfig};
pub use engine::{
    CheckoutReceipt, EngineConfig, EngineError, NewProduct, SaleEngine, Settlement, StockAdjustment,
    TxOperation,
};
pub use mobile_money::{GatewayAck, GatewayError, MobileMoneyGateway, RecordingGateway};
pub use sequence::{InMemorySequence, ReceiptNumberAllocator, SequenceError, SequenceGenerator};
#[cfg(feature = "redis")]
pub use sequence::RedisSequence;
pub use store::{
    InMemoryPosStore, PRODUCT_SKU_CONSTRAINT, Pagination, PosStore, PosTransaction, PostgresPosStore,
    SaleFilter, StoreError,
};

#[cfg(test)]
mod integration_tests;
