//! Road distance backends
//!
//! - `OsrmRouter` - live OSRM `route` service over HTTP
//! - `StaticLegTable` - fixed pairwise distances from configuration
//!
//! Both return kilometers for an ordered list of waypoints. Failures are typed
//! so the distance engine can turn them into an explicit unknown distance.

use crate::domain::place::{Coordinates, PlaceName};
use crate::infra::config::{Config, LegConfig};
use crate::io::geocoder::GeocodeError;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("routing request timed out")]
    Timeout,
    #[error("routing transport error: {0}")]
    Transport(String),
    #[error("routing service returned HTTP {0}")]
    Status(u16),
    #[error("routing service answered {code}: {message}")]
    NoRoute { code: String, message: String },
    #[error("unparsable routing response: {0}")]
    Malformed(String),
    #[error("waypoint {0} has no coordinates")]
    MissingCoordinates(PlaceName),
    #[error("no static distance between {from} and {to}")]
    MissingLeg { from: PlaceName, to: PlaceName },
    #[error("could not locate waypoint {place}: {source}")]
    Geocode { place: PlaceName, source: GeocodeError },
}

impl From<reqwest::Error> for RoutingError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RoutingError::Timeout
        } else {
            RoutingError::Transport(e.to_string())
        }
    }
}

/// One stop handed to a backend
#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub place: PlaceName,
    pub coordinates: Option<Coordinates>,
}

/// Road distance over an ordered list of waypoints
#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Whether waypoints without coordinates must be dropped before routing
    fn requires_coordinates(&self) -> bool {
        true
    }

    /// Total distance in kilometers (unrounded)
    async fn route_km(&self, waypoints: &[Waypoint]) -> Result<f64, RoutingError>;
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    /// Meters
    distance: f64,
}

/// Extract the first route's distance in meters from an OSRM body
pub fn parse_osrm_body(body: &str) -> Result<f64, RoutingError> {
    let response: OsrmResponse =
        serde_json::from_str(body).map_err(|e| RoutingError::Malformed(e.to_string()))?;

    if response.code != "Ok" {
        return Err(RoutingError::NoRoute {
            code: response.code,
            message: response.message.unwrap_or_default(),
        });
    }

    let route = response
        .routes
        .first()
        .ok_or_else(|| RoutingError::Malformed("no routes in response".to_string()))?;

    if !route.distance.is_finite() || route.distance < 0.0 {
        return Err(RoutingError::Malformed(format!("bad distance {}", route.distance)));
    }
    Ok(route.distance)
}

/// OSRM HTTP client
pub struct OsrmRouter {
    base_url: String,
    client: reqwest::Client,
}

impl OsrmRouter {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        // Build the client once for connection reuse across days
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(config.osrm_url(), Duration::from_millis(config.routing_timeout_ms()))
    }

    /// `{base}/route/v1/driving/lon,lat;lon,lat?overview=false`
    pub fn route_url(&self, points: &[Coordinates]) -> String {
        let locs = points
            .iter()
            .map(|p| format!("{:.6},{:.6}", p.lon, p.lat))
            .collect::<Vec<_>>()
            .join(";");
        format!("{}/route/v1/driving/{}?overview=false", self.base_url, locs)
    }
}

#[async_trait]
impl RouteProvider for OsrmRouter {
    fn name(&self) -> &'static str {
        "osrm"
    }

    async fn route_km(&self, waypoints: &[Waypoint]) -> Result<f64, RoutingError> {
        let points = waypoints
            .iter()
            .map(|w| w.coordinates.ok_or_else(|| RoutingError::MissingCoordinates(w.place.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let url = self.route_url(&points);
        debug!(url = %url, waypoints = %points.len(), "osrm_request");

        let response = self.client.get(&url).header("Accept", "application/json").send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RoutingError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        Ok(parse_osrm_body(&body)? / 1000.0)
    }
}

/// Symmetric pairwise distance table
#[derive(Debug, Clone, Default)]
pub struct StaticLegTable {
    legs: FxHashMap<(PlaceName, PlaceName), f64>,
}

impl StaticLegTable {
    pub fn from_legs(legs: &[LegConfig]) -> Self {
        let mut table = Self::default();
        for leg in legs {
            match (PlaceName::new(&leg.from), PlaceName::new(&leg.to)) {
                (Some(from), Some(to)) if leg.km.is_finite() && leg.km >= 0.0 => {
                    table.insert(from, to, leg.km);
                }
                _ => warn!(from = %leg.from, to = %leg.to, km = %leg.km, "static_leg_invalid"),
            }
        }
        table
    }

    pub fn insert(&mut self, from: PlaceName, to: PlaceName, km: f64) {
        self.legs.insert(Self::key(from, to), km);
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Distance between two places in either direction; same place is 0
    pub fn leg_km(&self, from: &PlaceName, to: &PlaceName) -> Option<f64> {
        if from == to {
            return Some(0.0);
        }
        self.legs.get(&Self::key(from.clone(), to.clone())).copied()
    }

    fn key(a: PlaceName, b: PlaceName) -> (PlaceName, PlaceName) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

#[async_trait]
impl RouteProvider for StaticLegTable {
    fn name(&self) -> &'static str {
        "static"
    }

    fn requires_coordinates(&self) -> bool {
        false
    }

    async fn route_km(&self, waypoints: &[Waypoint]) -> Result<f64, RoutingError> {
        waypoints.windows(2).try_fold(0.0, |total, pair| {
            let (from, to) = (&pair[0].place, &pair[1].place);
            self.leg_km(from, to)
                .map(|km| total + km)
                .ok_or_else(|| RoutingError::MissingLeg { from: from.clone(), to: to.clone() })
        })
    }
}
