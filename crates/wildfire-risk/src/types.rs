use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wildfire_core::{NetworkError, StorageError};

/// Geographic position in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting NaN, infinities and out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        let coord = Self {
            latitude,
            longitude,
        };
        coord.validate()?;
        Ok(coord)
    }

    pub fn validate(&self) -> Result<(), CoordinateError> {
        // Range checks are false for NaN, so NaN is rejected here too
        if (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude) {
            Ok(())
        } else {
            Err(CoordinateError {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }

    /// Display wrapper rounding to two decimals (~1.1 km) for log output.
    pub fn redacted(&self) -> Redacted {
        Redacted(*self)
    }
}

/// Log-safe rendering of a [`Coordinate`]. Never prints more than two decimals.
#[derive(Debug, Clone, Copy)]
pub struct Redacted(Coordinate);

impl std::fmt::Display for Redacted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}, {:.2}", self.0.latitude, self.0.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("Coordinate out of range: latitude {latitude}, longitude {longitude}")]
pub struct CoordinateError {
    pub latitude: f64,
    pub longitude: f64,
}

/// Fire danger classes, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    VeryLow,
    Low,
    Moderate,
    High,
    VeryHigh,
    Extreme,
}

impl RiskLevel {
    /// Map a fire weather index to its danger class.
    /// Boundaries follow the EFFIS FWI classes; each is inclusive at its lower end.
    pub fn from_index(index: f64) -> Self {
        match index {
            i if i >= 50.0 => Self::Extreme,
            i if i >= 38.0 => Self::VeryHigh,
            i if i >= 21.3 => Self::High,
            i if i >= 11.2 => Self::Moderate,
            i if i >= 5.2 => Self::Low,
            _ => Self::VeryLow,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::VeryLow => "Very Low",
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
            Self::VeryHigh => "Very High",
            Self::Extreme => "Extreme",
        }
    }
}

/// Where an assessment originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSource {
    Primary,
    Regional,
    Cache,
    Mock,
}

/// How current an assessment is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Live,
    Cached,
    Mock,
}

/// A fire risk reading at one point.
///
/// `level` is always derived from `numeric_index`; there is no way to set it directly,
/// including through deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AssessmentRecord")]
pub struct RiskAssessment {
    numeric_index: f64,
    level: RiskLevel,
    observed_at: DateTime<Utc>,
    source: RiskSource,
    freshness: Freshness,
}

impl RiskAssessment {
    /// Build an assessment from a provider index. Negative or non-finite indices are rejected.
    pub fn new(
        numeric_index: f64,
        observed_at: DateTime<Utc>,
        source: RiskSource,
        freshness: Freshness,
    ) -> Result<Self, InvalidIndex> {
        if !numeric_index.is_finite() || numeric_index < 0.0 {
            return Err(InvalidIndex(numeric_index));
        }
        Ok(Self::from_valid_index(
            numeric_index,
            observed_at,
            source,
            freshness,
        ))
    }

    pub(crate) fn from_valid_index(
        numeric_index: f64,
        observed_at: DateTime<Utc>,
        source: RiskSource,
        freshness: Freshness,
    ) -> Self {
        Self {
            numeric_index,
            level: RiskLevel::from_index(numeric_index),
            observed_at,
            source,
            freshness,
        }
    }

    /// Same reading, different freshness tag. Source is preserved.
    pub fn with_freshness(mut self, freshness: Freshness) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn numeric_index(&self) -> f64 {
        self.numeric_index
    }

    pub fn level(&self) -> RiskLevel {
        self.level
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn source(&self) -> RiskSource {
        self.source
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("Invalid risk index: {0}")]
pub struct InvalidIndex(pub f64);

/// Wire form of [`RiskAssessment`]. Any serialized `level` is ignored and recomputed.
#[derive(Deserialize)]
struct AssessmentRecord {
    numeric_index: f64,
    observed_at: DateTime<Utc>,
    source: RiskSource,
    freshness: Freshness,
}

impl TryFrom<AssessmentRecord> for RiskAssessment {
    type Error = InvalidIndex;

    fn try_from(record: AssessmentRecord) -> Result<Self, Self::Error> {
        Self::new(
            record.numeric_index,
            record.observed_at,
            record.source,
            record.freshness,
        )
    }
}

/// One step of the risk resolution chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    Regional,
    Cache,
    Mock,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Tier::Primary => "primary",
            Tier::Regional => "regional",
            Tier::Cache => "cache",
            Tier::Mock => "mock",
        };
        f.write_str(name)
    }
}

/// Location service errors
#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Location service unavailable")]
    ServiceUnavailable,
    #[error("Location request timed out")]
    Timeout,
    /// Every automatic tier came up empty and no default is allowed.
    /// The caller should prompt the user for coordinates.
    #[error("Location needs manual entry")]
    NeedsManualEntry,
    #[error(transparent)]
    Validation(#[from] CoordinateError),
    #[error("Location storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Location error: {0}")]
    Other(String),
}

/// Fire risk errors. Everything except `Validation` and `Exhausted` is a per-tier
/// failure that the pipeline absorbs by moving to the next tier.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RiskError {
    #[error(transparent)]
    Validation(#[from] CoordinateError),
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    #[error("Request timed out")]
    Timeout,
    #[error("No risk data at this point")]
    NoCoverage,
    #[error("Persisted data corrupt: {0}")]
    PersistenceCorruption(String),
    #[error("All tiers failed (attempted: {attempted:?}): {last}")]
    Exhausted {
        attempted: Vec<Tier>,
        last: Box<RiskError>,
    },
}

impl RiskError {
    /// Short machine-friendly name, used in tier reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RiskError::Validation(_) => "validation",
            RiskError::Network(_) => "network",
            RiskError::Timeout => "timeout",
            RiskError::NoCoverage => "no_coverage",
            RiskError::PersistenceCorruption(_) => "persistence_corruption",
            RiskError::Exhausted { .. } => "exhausted",
        }
    }
}
