//! Region-restricted fire danger service.
//!
//! `GET {base}/fire-danger/point?lat=..&lon=..` answers with
//! `{"coverage": bool, "index": f64?, "issued_at": rfc3339?}`.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use wildfire_core::NetworkError;

use super::{build_client, send_json, RiskProvider};
use crate::types::{Coordinate, Freshness, RiskAssessment, RiskError, RiskSource};

#[derive(Debug, Deserialize)]
struct PointResponse {
    #[serde(default = "default_coverage")]
    coverage: bool,
    index: Option<f64>,
    issued_at: Option<DateTime<Utc>>,
}

fn default_coverage() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct RegionalProvider {
    client: Client,
    base_url: String,
}

impl RegionalProvider {
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Result<Self, NetworkError> {
        Ok(Self {
            client: build_client(user_agent)?,
            base_url: base_url.into(),
        })
    }

    fn point_url(&self) -> String {
        format!("{}/fire-danger/point", self.base_url.trim_end_matches('/'))
    }
}

impl RiskProvider for RegionalProvider {
    fn name(&self) -> &'static str {
        "regional"
    }

    async fn fetch_risk(
        &self,
        coord: Coordinate,
        cancel: &CancellationToken,
    ) -> Result<RiskAssessment, RiskError> {
        coord.validate()?;

        let request = self.client.get(self.point_url()).query(&[
            ("lat", format!("{:.4}", coord.latitude)),
            ("lon", format!("{:.4}", coord.longitude)),
        ]);

        tracing::debug!("Regional danger query at {}", coord.redacted());
        let body: PointResponse = send_json(request, cancel).await?;
        parse_point(body)
    }
}

fn parse_point(body: PointResponse) -> Result<RiskAssessment, RiskError> {
    if !body.coverage {
        return Err(RiskError::NoCoverage);
    }
    let index = body.index.ok_or(RiskError::NoCoverage)?;
    let observed_at = body.issued_at.unwrap_or_else(Utc::now);

    RiskAssessment::new(index, observed_at, RiskSource::Regional, Freshness::Live)
        .map_err(|e| RiskError::Network(NetworkError::InvalidResponse(e.to_string())))
}
