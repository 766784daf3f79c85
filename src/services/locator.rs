//! Place coordinates lookup
//!
//! The reference table answers first. Free-text labels that are not in the
//! table go to the geocoder when one is configured; its answers (including
//! "not found") are remembered for the process lifetime. Geocoder failures are
//! returned to the caller and not remembered, so a later query can retry.

use crate::domain::place::{Coordinates, PlaceName};
use crate::infra::metrics::Metrics;
use crate::infra::places::PlaceTable;
use crate::io::geocoder::{GeocodeError, Geocoder};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct PlaceLocator {
    table: Arc<PlaceTable>,
    geocoder: Option<Arc<dyn Geocoder>>,
    geocoded: Mutex<FxHashMap<PlaceName, Option<Coordinates>>>,
    metrics: Arc<Metrics>,
}

impl PlaceLocator {
    pub fn new(
        table: Arc<PlaceTable>,
        geocoder: Option<Arc<dyn Geocoder>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { table, geocoder, geocoded: Mutex::new(FxHashMap::default()), metrics }
    }

    /// Coordinates for `place`, `Ok(None)` when nobody knows it
    pub async fn locate(&self, place: &PlaceName) -> Result<Option<Coordinates>, GeocodeError> {
        if let Some(coordinates) = self.table.coordinates(place) {
            return Ok(Some(coordinates));
        }

        let Some(geocoder) = self.geocoder.as_ref() else {
            return Ok(None);
        };

        let cached = self.geocoded.lock().get(place).copied();
        if let Some(cached) = cached {
            return Ok(cached);
        }

        match geocoder.locate(place).await {
            Ok(found) => {
                self.metrics.record_geocode(true);
                match found {
                    Some(c) => info!(place = %place, lat = %c.lat, lon = %c.lon, "place_geocoded"),
                    None => warn!(place = %place, "place_not_found_by_geocoder"),
                }
                self.geocoded.lock().insert(place.clone(), found);
                Ok(found)
            }
            Err(e) => {
                self.metrics.record_geocode(false);
                warn!(place = %place, error = %e, "geocode_failed");
                Err(e)
            }
        }
    }
}
