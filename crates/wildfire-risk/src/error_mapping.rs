//! Maps pipeline errors to wildfire_core::AppError for consistent user-facing messages.

use wildfire_core::{AppError, RiskServiceError};

use crate::types::{LocationError, RiskError};

impl From<RiskError> for AppError {
    fn from(e: RiskError) -> Self {
        match e {
            RiskError::Validation(c) => {
                AppError::Risk(RiskServiceError::InvalidCoordinate(c.to_string()))
            }
            RiskError::Network(n) => AppError::Network(n),
            other => AppError::Risk(RiskServiceError::Unavailable(other.to_string())),
        }
    }
}

impl From<LocationError> for AppError {
    fn from(e: LocationError) -> Self {
        match e {
            LocationError::NeedsManualEntry => AppError::Risk(RiskServiceError::NeedsManualEntry),
            LocationError::Validation(c) => {
                AppError::Risk(RiskServiceError::InvalidCoordinate(c.to_string()))
            }
            LocationError::Storage(s) => AppError::Storage(s),
            other => AppError::Risk(RiskServiceError::LocationUnavailable(other.to_string())),
        }
    }
}
