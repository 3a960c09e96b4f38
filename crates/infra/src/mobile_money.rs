//! Mobile-money provider boundary.
//!
//! The engine only needs to push a collection request; the provider reports
//! the outcome later through the payment callback.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use vevurn_sales::MobileMoneyCharge;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayAck {
    pub provider_request_id: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The provider refused the request outright; no prompt reached the phone.
    #[error("provider rejected the request: {0}")]
    Rejected(String),

    /// The provider could not be reached. The payment stays pending and is
    /// either confirmed by callback or expired.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait MobileMoneyGateway: Send + Sync {
    async fn request_payment(&self, charge: &MobileMoneyCharge) -> Result<GatewayAck, GatewayError>;
}

/// In-process gateway that records every request.
///
/// Used for local runs and tests. Can be told to reject requests to exercise
/// the compensation path.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    requests: Mutex<Vec<MobileMoneyCharge>>,
    reject_with: Mutex<Option<GatewayError>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every following request with `error` (or accept again with `None`).
    pub fn respond_with(&self, error: Option<GatewayError>) {
        if let Ok(mut slot) = self.reject_with.lock() {
            *slot = error;
        }
    }

    pub fn requests(&self) -> Vec<MobileMoneyCharge> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl MobileMoneyGateway for RecordingGateway {
    async fn request_payment(&self, charge: &MobileMoneyCharge) -> Result<GatewayAck, GatewayError> {
        let failure = self
            .reject_with
            .lock()
            .map_err(|_| GatewayError::Unavailable("gateway state poisoned".to_string()))?
            .clone();
        if let Some(err) = failure {
            return Err(err);
        }

        let mut requests = self
            .requests
            .lock()
            .map_err(|_| GatewayError::Unavailable("gateway state poisoned".to_string()))?;
        requests.push(charge.clone());

        Ok(GatewayAck {
            provider_request_id: format!("{}-{}", charge.provider.as_str(), charge.payment_id),
        })
    }
}
