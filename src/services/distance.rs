//! Round-trip distance with a single-flight cache
//!
//! Each itinerary signature owns one `OnceCell`. Concurrent requests for the
//! same signature share the cell, so only one routing call runs; the others
//! wait for its result. A failed call leaves the cell empty and the next
//! request routes again.

use crate::domain::place::PlaceName;
use crate::domain::types::{round1, DistanceOutcome, Itinerary, ItinerarySignature};
use crate::infra::metrics::Metrics;
use crate::io::routing::{RouteProvider, RoutingError, Waypoint};
use crate::services::locator::PlaceLocator;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct CachedKm {
    km: f64,
    stored_at: Instant,
}

/// Signature to distance, with an optional time-to-live
pub struct DistanceCache {
    ttl: Option<Duration>,
    slots: Mutex<FxHashMap<ItinerarySignature, Arc<OnceCell<CachedKm>>>>,
}

impl DistanceCache {
    /// `ttl = None` keeps entries for the process lifetime
    pub fn new(ttl: Option<Duration>) -> Self {
        Self { ttl, slots: Mutex::new(FxHashMap::default()) }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Cell for `signature`. An expired filled cell is replaced; an empty one
    /// (in flight or failed) is shared as is.
    fn slot(&self, signature: ItinerarySignature) -> Arc<OnceCell<CachedKm>> {
        let mut slots = self.slots.lock();
        if let Some(cell) = slots.get(&signature) {
            let fresh = match (cell.get(), self.ttl) {
                (None, _) | (Some(_), None) => true,
                (Some(cached), Some(ttl)) => cached.stored_at.elapsed() < ttl,
            };
            if fresh {
                return cell.clone();
            }
        }
        let cell = Arc::new(OnceCell::new());
        slots.insert(signature, cell.clone());
        cell
    }
}

pub struct DistanceEngine {
    locator: Arc<PlaceLocator>,
    router: Arc<dyn RouteProvider>,
    cache: DistanceCache,
    metrics: Arc<Metrics>,
}

impl DistanceEngine {
    pub fn new(
        locator: Arc<PlaceLocator>,
        router: Arc<dyn RouteProvider>,
        cache_ttl: Option<Duration>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { locator, router, cache: DistanceCache::new(cache_ttl), metrics }
    }

    pub fn cache(&self) -> &DistanceCache {
        &self.cache
    }

    /// Distance of `home -> places... -> home`
    pub async fn compute_round_trip(&self, home: &PlaceName, places: &[PlaceName]) -> DistanceOutcome {
        self.distance_for(&Itinerary::round_trip(home, places)).await
    }

    pub async fn distance_for(&self, itinerary: &Itinerary) -> DistanceOutcome {
        if itinerary.visits().is_empty() {
            return DistanceOutcome::known(0.0);
        }

        let cell = self.cache.slot(itinerary.signature());
        let mut routed = false;
        let result = cell
            .get_or_try_init(|| {
                routed = true;
                self.route(itinerary)
            })
            .await;

        match result {
            Ok(cached) => {
                if !routed {
                    self.metrics.record_route_cache_hit();
                    debug!(itinerary = %itinerary, km = %cached.km, "route_cache_hit");
                }
                DistanceOutcome::Known { km: cached.km }
            }
            Err(e) => {
                warn!(itinerary = %itinerary, router = %self.router.name(), error = %e, "route_failed");
                DistanceOutcome::Unknown
            }
        }
    }

    async fn route(&self, itinerary: &Itinerary) -> Result<CachedKm, RoutingError> {
        let needs_coordinates = self.router.requires_coordinates();
        let mut waypoints: Vec<Waypoint> = Vec::with_capacity(itinerary.stops().len());

        for place in itinerary.stops() {
            let coordinates = if needs_coordinates {
                match self.locator.locate(place).await {
                    Ok(Some(coordinates)) => Some(coordinates),
                    Ok(None) => {
                        warn!(place = %place, "waypoint_skipped_no_coordinates");
                        continue;
                    }
                    Err(source) => return Err(RoutingError::Geocode { place: place.clone(), source }),
                }
            } else {
                None
            };
            // A skipped stop can leave the same place twice in a row
            if waypoints.last().is_some_and(|last| last.place == *place) {
                continue;
            }
            waypoints.push(Waypoint { place: place.clone(), coordinates });
        }

        if waypoints.len() < 2 {
            debug!(itinerary = %itinerary, points = %waypoints.len(), "route_too_short");
            return Ok(CachedKm { km: 0.0, stored_at: Instant::now() });
        }

        let start = Instant::now();
        let result = self.router.route_km(&waypoints).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        self.metrics.record_route_request(latency_ms, result.is_ok());

        let km = round1(result?);
        debug!(itinerary = %itinerary, km = %km, latency_ms = %latency_ms, "route_computed");
        Ok(CachedKm { km, stored_at: Instant::now() })
    }
}
