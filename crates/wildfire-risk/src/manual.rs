//! Persisted, user-entered location.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::store::KeyValueStore;
use crate::types::{Coordinate, LocationError};

pub const MANUAL_SCHEMA_VERSION: u32 = 1;

const MANUAL_LOCATION_KEY: &str = "manual_location";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualLocation {
    pub coordinate: Coordinate,
    pub place_name: Option<String>,
    pub saved_at: DateTime<Utc>,
    #[serde(rename = "version")]
    pub schema_version: u32,
}

/// Stores the single most recent manual location. Records never expire.
pub struct ManualLocationStore {
    store: Arc<dyn KeyValueStore>,
}

impl ManualLocationStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Save a location, replacing any previous one.
    pub fn save(
        &self,
        coordinate: Coordinate,
        place_name: Option<String>,
    ) -> Result<ManualLocation, LocationError> {
        coordinate.validate()?;

        let record = ManualLocation {
            coordinate,
            place_name: place_name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
            saved_at: Utc::now(),
            schema_version: MANUAL_SCHEMA_VERSION,
        };
        let json = serde_json::to_string(&record)
            .map_err(|e| LocationError::Other(format!("serialize manual location: {}", e)))?;

        self.store.set(MANUAL_LOCATION_KEY, &json)?;
        tracing::info!("Saved manual location {}", coordinate.redacted());
        Ok(record)
    }

    /// Load the saved location. Missing, unreadable, corrupt or out-of-date records
    /// all come back as `None`.
    pub fn load(&self) -> Option<ManualLocation> {
        let raw = match self.store.get(MANUAL_LOCATION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Manual location unreadable: {}", e);
                return None;
            }
        };

        match parse_record(&raw) {
            Ok(record) => Some(record),
            Err(reason) => {
                tracing::warn!("Ignoring stored manual location: {}", reason);
                None
            }
        }
    }

    /// Remove the saved location.
    pub fn clear(&self) -> Result<(), LocationError> {
        self.store.remove(MANUAL_LOCATION_KEY)?;
        tracing::info!("Cleared manual location");
        Ok(())
    }
}

fn parse_record(raw: &str) -> Result<ManualLocation, String> {
    // Check the version before the shape so that a future schema is reported as such
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let version = value.get("version").and_then(serde_json::Value::as_u64);
    if version != Some(u64::from(MANUAL_SCHEMA_VERSION)) {
        return Err(format!(
            "schema version {:?} (expected {})",
            version, MANUAL_SCHEMA_VERSION
        ));
    }

    let record: ManualLocation = serde_json::from_value(value).map_err(|e| e.to_string())?;
    record.coordinate.validate().map_err(|e| e.to_string())?;
    Ok(record)
}
