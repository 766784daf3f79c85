//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Live OSRM road routing
    Osrm,
    /// Pairwise distances from `[[routing.legs]]`
    Static,
}

/// Location matchers that can be put in `resolver.strategies`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Label,
    Gazetteer,
    SummarySuffix,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Remote .ics URL
    #[serde(default)]
    pub url: Option<String>,
    /// Local .ics file, used when no URL is set
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_feed_timeout_ms")]
    pub timeout_ms: u64,
    /// How long parsed visits are reused between queries (0 disables)
    #[serde(default = "default_feed_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: None,
            path: None,
            timeout_ms: default_feed_timeout_ms(),
            cache_ttl_secs: default_feed_cache_ttl_secs(),
        }
    }
}

fn default_feed_timeout_ms() -> u64 {
    10_000
}

fn default_feed_cache_ttl_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Substrings that must all appear in summary + description (case-insensitive)
    #[serde(default = "default_required_markers")]
    pub required_markers: Vec<String>,
    /// Events before this year are dropped
    #[serde(default = "default_min_year")]
    pub min_year: i32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self { required_markers: default_required_markers(), min_year: default_min_year() }
    }
}

fn default_required_markers() -> Vec<String> {
    vec!["nominativo".to_string(), "codice fiscale".to_string()]
}

fn default_min_year() -> i32 {
    2024
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeConfig {
    #[serde(default = "default_home_name")]
    pub name: String,
    /// Optional pinned coordinates, overriding the place table
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

impl Default for HomeConfig {
    fn default() -> Self {
        Self { name: default_home_name(), lat: None, lon: None }
    }
}

fn default_home_name() -> String {
    "BASILIANO".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlacesConfig {
    /// CSV files with `name,lat,lon` rows
    #[serde(default)]
    pub files: Vec<String>,
    /// Place used when no matcher finds one
    #[serde(default = "default_default_place")]
    pub default_place: String,
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self { files: Vec::new(), default_place: default_default_place() }
    }
}

fn default_default_place() -> String {
    "UDINE".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Field labels tried in order by the label matcher
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
    /// Matchers tried in order before falling back to the default place
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyKind>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { labels: default_labels(), strategies: default_strategies() }
    }
}

fn default_labels() -> Vec<String> {
    ["Frazione:", "Città:", "Citta:", "Località:", "Locality:", "City:"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_strategies() -> Vec<StrategyKind> {
    vec![StrategyKind::Label, StrategyKind::Gazetteer]
}

/// One pairwise road distance for static routing
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegConfig {
    pub from: String,
    pub to: String,
    pub km: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_routing_mode")]
    pub mode: RoutingMode,
    #[serde(default = "default_osrm_url")]
    pub osrm_url: String,
    #[serde(default = "default_routing_timeout_ms")]
    pub timeout_ms: u64,
    /// Distance cache TTL for live routing (0 keeps entries for the process lifetime)
    #[serde(default = "default_routing_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Routing requests in flight at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default)]
    pub legs: Vec<LegConfig>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: default_routing_mode(),
            osrm_url: default_osrm_url(),
            timeout_ms: default_routing_timeout_ms(),
            cache_ttl_secs: default_routing_cache_ttl_secs(),
            max_concurrent: default_max_concurrent(),
            legs: Vec::new(),
        }
    }
}

fn default_routing_mode() -> RoutingMode {
    RoutingMode::Osrm
}

fn default_osrm_url() -> String {
    "https://router.project-osrm.org".to_string()
}

fn default_routing_timeout_ms() -> u64 {
    8_000
}

fn default_routing_cache_ttl_secs() -> u64 {
    86_400
}

fn default_max_concurrent() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderConfig {
    /// Look up places missing from the table through Nominatim
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_geocoder_url")]
    pub url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Appended to each query, e.g. "UDINE, Italia"
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_geocoder_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_geocoder_url(),
            user_agent: default_user_agent(),
            country: default_country(),
            timeout_ms: default_geocoder_timeout_ms(),
        }
    }
}

fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org/search".to_string()
}

fn default_user_agent() -> String {
    concat!("visit-mileage/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_country() -> String {
    "Italia".to_string()
}

fn default_geocoder_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Log a metrics summary after each query
    #[serde(default = "default_log_summary")]
    pub log_summary: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { log_summary: default_log_summary() }
    }
}

fn default_log_summary() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub home: HomeConfig,
    #[serde(default)]
    pub places: PlacesConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    config_file: String,
    feed_url: Option<String>,
    feed_path: Option<String>,
    feed_timeout_ms: u64,
    feed_cache_ttl_secs: u64,
    required_markers: Vec<String>,
    min_year: i32,
    home_name: String,
    home_lat: Option<f64>,
    home_lon: Option<f64>,
    place_files: Vec<String>,
    default_place: String,
    labels: Vec<String>,
    strategies: Vec<StrategyKind>,
    routing_mode: RoutingMode,
    osrm_url: String,
    routing_timeout_ms: u64,
    routing_cache_ttl_secs: u64,
    max_concurrent_routes: usize,
    legs: Vec<LegConfig>,
    geocoder_enabled: bool,
    geocoder_url: String,
    geocoder_user_agent: String,
    geocoder_country: String,
    geocoder_timeout_ms: u64,
    log_metrics_summary: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml_config(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    /// Determine config file path from the CLI value or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        // Default to dev.toml
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml_config(toml_config, path.display().to_string()))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig =
            toml::from_str(content).context("Failed to parse config text")?;
        Ok(Self::from_toml_config(toml_config, "inline".to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    fn from_toml_config(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            config_file,
            feed_url: toml_config.feed.url.filter(|u| !u.trim().is_empty()),
            feed_path: toml_config.feed.path.filter(|p| !p.trim().is_empty()),
            feed_timeout_ms: toml_config.feed.timeout_ms,
            feed_cache_ttl_secs: toml_config.feed.cache_ttl_secs,
            required_markers: toml_config
                .filter
                .required_markers
                .into_iter()
                .map(|m| m.to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
            min_year: toml_config.filter.min_year,
            home_name: toml_config.home.name,
            home_lat: toml_config.home.lat,
            home_lon: toml_config.home.lon,
            place_files: toml_config.places.files,
            default_place: toml_config.places.default_place,
            labels: toml_config.resolver.labels,
            strategies: toml_config.resolver.strategies,
            routing_mode: toml_config.routing.mode,
            osrm_url: toml_config.routing.osrm_url.trim_end_matches('/').to_string(),
            routing_timeout_ms: toml_config.routing.timeout_ms,
            routing_cache_ttl_secs: toml_config.routing.cache_ttl_secs,
            max_concurrent_routes: toml_config.routing.max_concurrent.max(1),
            legs: toml_config.routing.legs,
            geocoder_enabled: toml_config.geocoder.enabled,
            geocoder_url: toml_config.geocoder.url,
            geocoder_user_agent: toml_config.geocoder.user_agent,
            geocoder_country: toml_config.geocoder.country,
            geocoder_timeout_ms: toml_config.geocoder.timeout_ms,
            log_metrics_summary: toml_config.metrics.log_summary,
        }
    }

    /// Distance cache TTL; `None` keeps entries for the process lifetime.
    /// Static tables never change, so they are always cached permanently.
    pub fn routing_cache_ttl(&self) -> Option<Duration> {
        match self.routing_mode {
            RoutingMode::Static => None,
            RoutingMode::Osrm if self.routing_cache_ttl_secs == 0 => None,
            RoutingMode::Osrm => Some(Duration::from_secs(self.routing_cache_ttl_secs)),
        }
    }

    // Getters for all config fields
    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn feed_url(&self) -> Option<&str> {
        self.feed_url.as_deref()
    }

    pub fn feed_path(&self) -> Option<&str> {
        self.feed_path.as_deref()
    }

    pub fn feed_timeout_ms(&self) -> u64 {
        self.feed_timeout_ms
    }

    pub fn feed_cache_ttl_secs(&self) -> u64 {
        self.feed_cache_ttl_secs
    }

    pub fn required_markers(&self) -> &[String] {
        &self.required_markers
    }

    pub fn min_year(&self) -> i32 {
        self.min_year
    }

    pub fn home_name(&self) -> &str {
        &self.home_name
    }

    pub fn home_coordinates(&self) -> Option<(f64, f64)> {
        self.home_lat.zip(self.home_lon)
    }

    pub fn place_files(&self) -> &[String] {
        &self.place_files
    }

    pub fn default_place(&self) -> &str {
        &self.default_place
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn strategies(&self) -> &[StrategyKind] {
        &self.strategies
    }

    pub fn routing_mode(&self) -> RoutingMode {
        self.routing_mode
    }

    pub fn osrm_url(&self) -> &str {
        &self.osrm_url
    }

    pub fn routing_timeout_ms(&self) -> u64 {
        self.routing_timeout_ms
    }

    pub fn max_concurrent_routes(&self) -> usize {
        self.max_concurrent_routes
    }

    pub fn legs(&self) -> &[LegConfig] {
        &self.legs
    }

    pub fn geocoder_enabled(&self) -> bool {
        self.geocoder_enabled
    }

    pub fn geocoder_url(&self) -> &str {
        &self.geocoder_url
    }

    pub fn geocoder_user_agent(&self) -> &str {
        &self.geocoder_user_agent
    }

    pub fn geocoder_country(&self) -> &str {
        &self.geocoder_country
    }

    pub fn geocoder_timeout_ms(&self) -> u64 {
        self.geocoder_timeout_ms
    }

    pub fn log_metrics_summary(&self) -> bool {
        self.log_metrics_summary
    }

    /// Builder method for tests to set the date floor
    #[cfg(test)]
    pub fn with_min_year(mut self, year: i32) -> Self {
        self.min_year = year;
        self
    }

    /// Builder method for tests to set matcher order
    #[cfg(test)]
    pub fn with_strategies(mut self, strategies: Vec<StrategyKind>) -> Self {
        self.strategies = strategies;
        self
    }
}
