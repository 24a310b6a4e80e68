//! Risk providers: one "risk at point" contract, two HTTP-backed implementations.

pub mod primary;
pub mod regional;

pub use primary::PrimaryProvider;
pub use regional::RegionalProvider;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wildfire_core::{NetworkError, ReqwestErrorExt};

use crate::types::{Coordinate, RiskAssessment, RiskError};

/// Client-level safety net; tier budgets in the pipeline are much tighter.
const CLIENT_TIMEOUT_SECS: u64 = 10;

/// Fetch a fire risk assessment at a single point.
///
/// Implementations return `NoCoverage` when the service answers but has no data
/// for the point, and must stop work promptly once `cancel` fires.
pub trait RiskProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch_risk(
        &self,
        coord: Coordinate,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<RiskAssessment, RiskError>> + Send;
}

/// Build the shared HTTP client used by both providers.
pub(crate) fn build_client(user_agent: &str) -> Result<Client, NetworkError> {
    Client::builder()
        .timeout(Duration::from_secs(CLIENT_TIMEOUT_SECS))
        .user_agent(user_agent)
        .build()
        .map_err(ReqwestErrorExt::into_network_error)
}

/// Send a request and decode a JSON body, abandoning the request if `cancel` fires.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> Result<T, RiskError> {
    let exchange = async {
        let response = request
            .send()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::ServerError {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| NetworkError::InvalidResponse(e.without_url().to_string()))
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RiskError::Timeout),
        result = exchange => result.map_err(|e| match e {
            NetworkError::Timeout => RiskError::Timeout,
            other => RiskError::Network(other),
        }),
    }
}
