//! Global fire weather index via a WMS `GetFeatureInfo` point query.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use wildfire_core::NetworkError;

use super::{build_client, send_json, RiskProvider};
use crate::types::{Coordinate, Freshness, RiskAssessment, RiskError, RiskSource};

const FWI_LAYER: &str = "ecmwf.fwi";
/// Half-width in degrees of the 3x3 pixel query box centred on the point.
const BBOX_HALF_WIDTH: f64 = 0.01;

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: FeatureProperties,
}

#[derive(Debug, Deserialize)]
struct FeatureProperties {
    /// GeoServer names single-band raster values `GRAY_INDEX`
    #[serde(alias = "GRAY_INDEX")]
    value: Option<f64>,
    time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct PrimaryProvider {
    client: Client,
    base_url: String,
}

impl PrimaryProvider {
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Result<Self, NetworkError> {
        Ok(Self {
            client: build_client(user_agent)?,
            base_url: base_url.into(),
        })
    }

    fn query(&self, coord: &Coordinate, date: &str) -> Vec<(&'static str, String)> {
        vec![
            ("SERVICE", "WMS".to_string()),
            ("VERSION", "1.3.0".to_string()),
            ("REQUEST", "GetFeatureInfo".to_string()),
            ("LAYERS", FWI_LAYER.to_string()),
            ("QUERY_LAYERS", FWI_LAYER.to_string()),
            ("INFO_FORMAT", "application/json".to_string()),
            ("CRS", "EPSG:4326".to_string()),
            ("BBOX", bbox(coord)),
            ("WIDTH", "3".to_string()),
            ("HEIGHT", "3".to_string()),
            ("I", "1".to_string()),
            ("J", "1".to_string()),
            ("TIME", date.to_string()),
        ]
    }
}

impl RiskProvider for PrimaryProvider {
    fn name(&self) -> &'static str {
        "primary"
    }

    async fn fetch_risk(
        &self,
        coord: Coordinate,
        cancel: &CancellationToken,
    ) -> Result<RiskAssessment, RiskError> {
        coord.validate()?;

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let request = self
            .client
            .get(&self.base_url)
            .query(&self.query(&coord, &today));

        tracing::debug!("Primary FWI query at {}", coord.redacted());
        let body: FeatureCollection = send_json(request, cancel).await?;
        parse_collection(body)
    }
}

/// Query box around `coord`, clamped to valid bounds. WMS 1.3.0 with EPSG:4326
/// uses lat,lon axis order.
fn bbox(coord: &Coordinate) -> String {
    format!(
        "{},{},{},{}",
        (coord.latitude - BBOX_HALF_WIDTH).max(-90.0),
        (coord.longitude - BBOX_HALF_WIDTH).max(-180.0),
        (coord.latitude + BBOX_HALF_WIDTH).min(90.0),
        (coord.longitude + BBOX_HALF_WIDTH).min(180.0)
    )
}

fn parse_collection(body: FeatureCollection) -> Result<RiskAssessment, RiskError> {
    let properties = match body.features.into_iter().next() {
        Some(feature) => feature.properties,
        None => return Err(RiskError::NoCoverage),
    };

    // Sea and out-of-domain pixels come back as null or a negative no-data value
    let value = match properties.value {
        Some(v) if v.is_finite() && v >= 0.0 => v,
        _ => return Err(RiskError::NoCoverage),
    };

    let observed_at = properties.time.unwrap_or_else(Utc::now);
    RiskAssessment::new(value, observed_at, RiskSource::Primary, Freshness::Live)
        .map_err(|e| RiskError::Network(NetworkError::InvalidResponse(e.to_string())))
}
