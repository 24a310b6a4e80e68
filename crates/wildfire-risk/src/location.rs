//! Location resolution with ordered fallbacks.
//!
//! Tiers: last known device position, fresh GPS fix, saved manual location, then
//! either a fixed default or a request for manual entry. Every tier failure is
//! logged and skipped; coordinates only ever reach the log rounded.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use wildfire_core::{LocationConfig, TimeoutConfig};

use crate::manual::ManualLocationStore;
use crate::types::{Coordinate, LocationError};

/// Aviemore, in the Cairngorms.
pub const DEFAULT_COORDINATE: Coordinate = Coordinate {
    latitude: 57.2,
    longitude: -3.8,
};

/// Platform positioning.
pub trait DeviceLocation: Send + Sync {
    /// Cached position, if the platform has one. Must not prompt for permission.
    fn last_known(&self) -> impl Future<Output = Result<Option<Coordinate>, LocationError>> + Send;

    /// Fresh fix. May prompt; denial surfaces as `PermissionDenied`.
    fn current_fix(&self) -> impl Future<Output = Result<Coordinate, LocationError>> + Send;
}

/// Device backend for hosts without positioning hardware or services.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDeviceLocation;

impl DeviceLocation for NoDeviceLocation {
    async fn last_known(&self) -> Result<Option<Coordinate>, LocationError> {
        Ok(None)
    }

    async fn current_fix(&self) -> Result<Coordinate, LocationError> {
        Err(LocationError::ServiceUnavailable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    LastKnown,
    GpsFix,
    Manual,
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub coordinate: Coordinate,
    pub source: LocationSource,
    pub place_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationBudgets {
    pub total: Duration,
    pub last_known: Duration,
    pub gps_fix: Duration,
    pub manual_read: Duration,
}

impl Default for LocationBudgets {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

impl From<&TimeoutConfig> for LocationBudgets {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            total: config.location_budget(),
            last_known: config.last_known(),
            gps_fix: config.gps_fix(),
            manual_read: config.manual_read(),
        }
    }
}

pub struct LocationResolver<D> {
    device: D,
    manual: Arc<ManualLocationStore>,
    budgets: LocationBudgets,
    default: Coordinate,
}

impl<D: DeviceLocation> LocationResolver<D> {
    pub fn new(device: D, manual: Arc<ManualLocationStore>) -> Self {
        Self {
            device,
            manual,
            budgets: LocationBudgets::default(),
            default: DEFAULT_COORDINATE,
        }
    }

    pub fn with_budgets(mut self, budgets: LocationBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    /// Use the configured fallback coordinate if it is valid.
    pub fn with_default(mut self, config: &LocationConfig) -> Self {
        match Coordinate::new(config.default_latitude, config.default_longitude) {
            Ok(coord) => self.default = coord,
            Err(e) => tracing::warn!("Ignoring configured default location: {}", e),
        }
        self
    }

    /// Resolve the user's position.
    ///
    /// With `allow_default = false` an exhausted chain returns
    /// `LocationError::NeedsManualEntry` so the caller can prompt.
    pub async fn resolve(&self, allow_default: bool) -> Result<Coordinate, LocationError> {
        self.resolve_detailed(allow_default)
            .await
            .map(|resolved| resolved.coordinate)
    }

    /// Like [`resolve`](Self::resolve), reporting which tier answered.
    pub async fn resolve_detailed(
        &self,
        allow_default: bool,
    ) -> Result<ResolvedLocation, LocationError> {
        let deadline = Instant::now() + self.budgets.total;

        // Tier 1: last known
        match with_deadline(self.budgets.last_known, deadline, self.device.last_known()).await {
            Ok(Some(coord)) => {
                if let Some(resolved) = accept(coord, LocationSource::LastKnown, None) {
                    return Ok(resolved);
                }
            }
            Ok(None) => tracing::debug!("No last known position"),
            Err(e) => tracing::debug!("Last known position unavailable: {}", e),
        }

        // Tier 2: fresh fix; denial and timeout are equivalent here
        match with_deadline(self.budgets.gps_fix, deadline, self.device.current_fix()).await {
            Ok(coord) => {
                if let Some(resolved) = accept(coord, LocationSource::GpsFix, None) {
                    return Ok(resolved);
                }
            }
            Err(e) => tracing::info!("GPS fix unavailable: {}", e),
        }

        // Tier 3: saved manual location
        let manual = Arc::clone(&self.manual);
        let read = async move {
            tokio::task::spawn_blocking(move || manual.load())
                .await
                .map_err(|e| LocationError::Other(format!("manual location read aborted: {}", e)))
        };
        match with_deadline(self.budgets.manual_read, deadline, read).await {
            Ok(Some(saved)) => {
                if let Some(resolved) =
                    accept(saved.coordinate, LocationSource::Manual, saved.place_name)
                {
                    return Ok(resolved);
                }
            }
            Ok(None) => tracing::debug!("No saved manual location"),
            Err(e) => tracing::info!("Manual location unavailable: {}", e),
        }

        // Tiers 4/5
        if allow_default {
            tracing::info!("Using default location {}", self.default.redacted());
            Ok(ResolvedLocation {
                coordinate: self.default,
                source: LocationSource::Default,
                place_name: None,
            })
        } else {
            tracing::info!("Location unresolved; manual entry needed");
            Err(LocationError::NeedsManualEntry)
        }
    }
}

fn accept(
    coord: Coordinate,
    source: LocationSource,
    place_name: Option<String>,
) -> Option<ResolvedLocation> {
    match coord.validate() {
        Ok(()) => {
            tracing::info!("Location from {:?}: {}", source, coord.redacted());
            Some(ResolvedLocation {
                coordinate: coord,
                source,
                place_name,
            })
        }
        Err(_) => {
            tracing::warn!("Discarding out-of-range position from {:?}", source);
            None
        }
    }
}

/// Run `fut` for at most `min(budget, time left before deadline)`.
async fn with_deadline<T, F>(
    budget: Duration,
    deadline: Instant,
    fut: F,
) -> Result<T, LocationError>
where
    F: Future<Output = Result<T, LocationError>>,
{
    let now = Instant::now();
    if now >= deadline {
        return Err(LocationError::Timeout);
    }
    let tier_deadline = (now + budget).min(deadline);
    tokio::time::timeout_at(tier_deadline, fut)
        .await
        .unwrap_or(Err(LocationError::Timeout))
}
