use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application data directory (SQLite store lives here)
    pub config_dir: PathBuf,

    /// Risk and geocoding endpoints
    #[serde(default)]
    pub providers: ProviderConfig,

    /// Per-tier and global time budgets
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Spatial cache sizing
    #[serde(default)]
    pub cache: CacheConfig,

    /// Location fallback settings
    #[serde(default)]
    pub location: LocationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Global fire weather index service (WMS GetFeatureInfo endpoint)
    pub primary_url: String,

    /// Region-restricted fire danger service
    pub regional_url: String,

    /// Nominatim-compatible reverse geocoder
    pub geocode_url: String,

    /// User agent sent with every request; some providers reject anonymous clients
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            primary_url: "https://maps.effis.emergency.copernicus.eu/gwis".to_string(),
            regional_url: "https://firedanger.metoffice.gov.uk/api/v1".to_string(),
            geocode_url: "https://nominatim.openstreetmap.org/reverse".to_string(),
            user_agent: format!("WildFire/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_global_ms")]
    pub global_ms: u64,
    #[serde(default = "default_primary_ms")]
    pub primary_ms: u64,
    #[serde(default = "default_regional_ms")]
    pub regional_ms: u64,
    #[serde(default = "default_cache_ms")]
    pub cache_ms: u64,
    #[serde(default = "default_location_budget_ms")]
    pub location_budget_ms: u64,
    #[serde(default = "default_last_known_ms")]
    pub last_known_ms: u64,
    #[serde(default = "default_gps_fix_ms")]
    pub gps_fix_ms: u64,
    #[serde(default = "default_manual_read_ms")]
    pub manual_read_ms: u64,
}

fn default_global_ms() -> u64 {
    8000
}

fn default_primary_ms() -> u64 {
    3000
}

fn default_regional_ms() -> u64 {
    2000
}

fn default_cache_ms() -> u64 {
    1000
}

fn default_location_budget_ms() -> u64 {
    2500
}

fn default_last_known_ms() -> u64 {
    100
}

fn default_gps_fix_ms() -> u64 {
    2000
}

fn default_manual_read_ms() -> u64 {
    100
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            global_ms: default_global_ms(),
            primary_ms: default_primary_ms(),
            regional_ms: default_regional_ms(),
            cache_ms: default_cache_ms(),
            location_budget_ms: default_location_budget_ms(),
            last_known_ms: default_last_known_ms(),
            gps_fix_ms: default_gps_fix_ms(),
            manual_read_ms: default_manual_read_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn global(&self) -> Duration {
        Duration::from_millis(self.global_ms)
    }

    pub fn primary(&self) -> Duration {
        Duration::from_millis(self.primary_ms)
    }

    pub fn regional(&self) -> Duration {
        Duration::from_millis(self.regional_ms)
    }

    pub fn cache(&self) -> Duration {
        Duration::from_millis(self.cache_ms)
    }

    pub fn location_budget(&self) -> Duration {
        Duration::from_millis(self.location_budget_ms)
    }

    pub fn last_known(&self) -> Duration {
        Duration::from_millis(self.last_known_ms)
    }

    pub fn gps_fix(&self) -> Duration {
        Duration::from_millis(self.gps_fix_ms)
    }

    pub fn manual_read(&self) -> Duration {
        Duration::from_millis(self.manual_read_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of geohash cells kept
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Entries older than this read as absent
    #[serde(default = "default_cache_ttl_hours")]
    pub ttl_hours: u32,
}

fn default_cache_capacity() -> usize {
    100
}

fn default_cache_ttl_hours() -> u32 {
    6
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_hours: default_cache_ttl_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Safe default used when every other location tier is unavailable
    #[serde(default = "default_latitude")]
    pub default_latitude: f64,
    #[serde(default = "default_longitude")]
    pub default_longitude: f64,

    /// Fall back to the default instead of asking for manual entry
    #[serde(default = "default_allow_default")]
    pub allow_default: bool,
}

// Aviemore, Cairngorms
fn default_latitude() -> f64 {
    57.2
}

fn default_longitude() -> f64 {
    -3.8
}

fn default_allow_default() -> bool {
    true
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            default_latitude: default_latitude(),
            default_longitude: default_longitude(),
            allow_default: default_allow_default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wildfire");

        Self {
            config_dir,
            providers: ProviderConfig::default(),
            timeouts: TimeoutConfig::default(),
            cache: CacheConfig::default(),
            location: LocationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, creating defaults if it doesn't exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns an error if validation fails with critical errors; warnings are logged.
    pub fn load_validated(config_path: Option<&Path>) -> Result<(Self, ValidationResult)> {
        let config = match config_path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.providers.primary_url, "providers.primary_url", &mut result);
        self.validate_url(
            &self.providers.regional_url,
            "providers.regional_url",
            &mut result,
        );
        self.validate_url(&self.providers.geocode_url, "providers.geocode_url", &mut result);

        if self.providers.user_agent.trim().is_empty() {
            result.add_warning(
                "providers.user_agent",
                "Empty user agent; some providers reject anonymous requests",
            );
        }

        // Sub-timeouts must leave headroom for the mock tier
        let t = &self.timeouts;
        let tier_sum = t.primary_ms + t.regional_ms + t.cache_ms;
        if t.global_ms == 0 {
            result.add_error("timeouts.global_ms", "Global deadline must be greater than 0");
        } else if tier_sum >= t.global_ms {
            result.add_error(
                "timeouts",
                format!(
                    "Tier timeouts ({} ms) must sum to less than the global deadline ({} ms)",
                    tier_sum, t.global_ms
                ),
            );
        }

        let location_sum = t.last_known_ms + t.gps_fix_ms + t.manual_read_ms;
        if location_sum > t.location_budget_ms {
            result.add_warning(
                "timeouts.location_budget_ms",
                format!(
                    "Location tiers ({} ms) exceed the location budget ({} ms); \
                     later tiers may be skipped",
                    location_sum, t.location_budget_ms
                ),
            );
        }

        if self.cache.capacity == 0 {
            result.add_error("cache.capacity", "Cache capacity must be greater than 0");
        }
        if self.cache.ttl_hours == 0 {
            result.add_warning("cache.ttl_hours", "Cache TTL of 0 disables the cache tier");
        }

        let lat = self.location.default_latitude;
        let lon = self.location.default_longitude;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            result.add_error(
                "location",
                format!("Default coordinate out of range: {}, {}", lat, lon),
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if url.port() == Some(0) {
                    result.add_error(field_name, "Port cannot be 0");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Path of the SQLite store holding the risk cache and manual location
    pub fn store_path(&self) -> PathBuf {
        self.config_dir.join("wildfire.db")
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("wildfire");

        Ok(config_dir.join("config.toml"))
    }
}
