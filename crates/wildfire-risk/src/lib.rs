//! Wildfire risk for the user's position.
//!
//! Resolves a location through ordered fallbacks, then fetches a fire risk
//! assessment from a global provider, a regional provider, a spatial cache or a
//! deterministic mock, always answering within a fixed time budget.

pub mod cache;
mod error_mapping;
pub mod geo;
pub mod geocode;
pub mod location;
pub mod manual;
pub mod mock;
pub mod provider;
pub mod service;
pub mod store;
pub mod types;

pub use cache::SpatialCache;
pub use geo::is_in_region;
pub use geocode::reverse_geocode;
pub use location::{
    DeviceLocation, LocationBudgets, LocationResolver, LocationSource, NoDeviceLocation,
    ResolvedLocation,
};
pub use manual::{ManualLocation, ManualLocationStore};
pub use provider::{PrimaryProvider, RegionalProvider, RiskProvider};
pub use service::{FireRiskService, Resolution, ResolutionReport, TierBudgets, TierOutcome};
pub use store::{KeyValueStore, SqliteStore};
pub use types::*;
