//! Report queries over the calendar feed
//!
//! Feed text is fetched, parsed, filtered and resolved into visits once per
//! `feed.cache_ttl_secs`; every query then groups the cached visits by day,
//! routes the selected days and rolls them up. Only the distance cache is
//! shared between queries.

use crate::domain::place::{Coordinates, Place, PlaceName};
use crate::domain::report::{DayTotal, MonthReport, WeekReport, YearReport};
use crate::domain::types::ResolvedVisit;
use crate::infra::config::{Config, RoutingMode};
use crate::infra::metrics::Metrics;
use crate::infra::places::PlaceTable;
use crate::io::feed::{source_from_config, CalendarSource};
use crate::io::geocoder::{Geocoder, NominatimGeocoder};
use crate::io::ics::parse_event_blocks;
use crate::io::routing::{OsrmRouter, RouteProvider, StaticLegTable};
use crate::services::aggregator::{self, group_by_day, route_days, select_days, Period};
use crate::services::distance::DistanceEngine;
use crate::services::extractor::EventExtractor;
use crate::services::locator::PlaceLocator;
use crate::services::resolver::Resolver;
use anyhow::Context;
use chrono::{Datelike, Local};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const DEFAULT_MAX_CONCURRENT: usize = 4;
const DEFAULT_VISITS_TTL: Duration = Duration::from_secs(600);

type CachedVisits = Option<(Instant, Arc<Vec<ResolvedVisit>>)>;

pub struct ReportService {
    source: Arc<dyn CalendarSource>,
    extractor: EventExtractor,
    resolver: Resolver,
    engine: Arc<DistanceEngine>,
    home: PlaceName,
    max_concurrent: usize,
    visits_ttl: Duration,
    visits: Mutex<CachedVisits>,
    metrics: Arc<Metrics>,
}

impl ReportService {
    pub fn new(
        source: Arc<dyn CalendarSource>,
        extractor: EventExtractor,
        resolver: Resolver,
        engine: Arc<DistanceEngine>,
        home: PlaceName,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            source,
            extractor,
            resolver,
            engine,
            home,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            visits_ttl: DEFAULT_VISITS_TTL,
            visits: Mutex::new(None),
            metrics,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// How long a parsed visit list is reused; zero disables reuse
    pub fn with_visits_ttl(mut self, ttl: Duration) -> Self {
        self.visits_ttl = ttl;
        self
    }

    /// Wire the whole pipeline from configuration
    pub fn from_config(config: &Config, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let source = source_from_config(config)?;
        let home = PlaceName::new(config.home_name())
            .with_context(|| format!("Invalid home place {:?}", config.home_name()))?;

        let mut table = PlaceTable::load(config.place_files());
        if let Some((lat, lon)) = config.home_coordinates() {
            table = table.with_place(Place { name: home.clone(), coordinates: Coordinates::new(lat, lon) });
        }
        if table.get(&home).is_none() {
            warn!(home = %home, "home_not_in_place_table");
        }
        let table = Arc::new(table);

        let geocoder: Option<Arc<dyn Geocoder>> = if config.geocoder_enabled() {
            Some(Arc::new(NominatimGeocoder::from_config(config)?))
        } else {
            None
        };
        let locator = Arc::new(PlaceLocator::new(table.clone(), geocoder, metrics.clone()));

        let router: Arc<dyn RouteProvider> = match config.routing_mode() {
            RoutingMode::Osrm => Arc::new(OsrmRouter::from_config(config)?),
            RoutingMode::Static => {
                let legs = StaticLegTable::from_legs(config.legs());
                if legs.is_empty() {
                    warn!("static_routing_without_legs");
                }
                Arc::new(legs)
            }
        };

        info!(
            home = %home,
            places = %table.len(),
            router = %router.name(),
            geocoder = %config.geocoder_enabled(),
            max_concurrent = %config.max_concurrent_routes(),
            "report_service_ready"
        );

        let engine = Arc::new(DistanceEngine::new(
            locator,
            router,
            config.routing_cache_ttl(),
            metrics.clone(),
        ));
        let extractor = EventExtractor::from_config(config);
        let resolver = Resolver::from_config(config, table, metrics.clone())?;

        Ok(Self::new(source, extractor, resolver, engine, home, metrics)
            .with_max_concurrent(config.max_concurrent_routes())
            .with_visits_ttl(Duration::from_secs(config.feed_cache_ttl_secs())))
    }

    /// Today's ISO week, the default selection
    pub fn current_week() -> u32 {
        Local::now().date_naive().iso_week().week()
    }

    /// Resolved visits of the whole feed, reusing a recent parse
    ///
    /// A failed fetch yields no visits and is not remembered.
    pub async fn load_visits(&self) -> Arc<Vec<ResolvedVisit>> {
        if let Some(visits) = self.cached_visits() {
            return visits;
        }

        let raw = match self.source.fetch().await {
            Ok(raw) => {
                self.metrics.record_feed_fetch(true);
                raw
            }
            Err(e) => {
                self.metrics.record_feed_fetch(false);
                warn!(source = %self.source.describe(), error = %format!("{:#}", e), "feed_fetch_failed");
                return Arc::new(Vec::new());
            }
        };

        let blocks = parse_event_blocks(&raw);
        let events = self.extractor.extract(&blocks, &self.metrics);
        let visits = Arc::new(self.resolver.resolve_all(&events));
        info!(
            source = %self.source.describe(),
            blocks = %blocks.len(),
            visits = %visits.len(),
            "feed_parsed"
        );

        *self.visits.lock() = Some((Instant::now(), visits.clone()));
        visits
    }

    fn cached_visits(&self) -> Option<Arc<Vec<ResolvedVisit>>> {
        match self.visits.lock().as_ref() {
            Some((stored_at, visits)) if stored_at.elapsed() < self.visits_ttl => Some(visits.clone()),
            _ => None,
        }
    }

    async fn routed_days(&self, visits: &[ResolvedVisit], period: Period) -> Vec<DayTotal> {
        let days = select_days(&group_by_day(visits), period);
        route_days(&self.engine, &self.home, &days, self.max_concurrent).await
    }

    pub async fn get_week_report(&self, week: u32) -> WeekReport {
        if !(1..=53).contains(&week) {
            warn!(week = %week, "week_out_of_range");
            return WeekReport { week, ..Default::default() };
        }
        let visits = self.load_visits().await;
        let days = self.routed_days(&visits, Period::Week(week)).await;
        aggregator::week_report(week, &days)
    }

    pub async fn get_month_report(&self, month: u32) -> MonthReport {
        if !(1..=12).contains(&month) {
            warn!(month = %month, "month_out_of_range");
            return MonthReport { month, ..Default::default() };
        }
        let visits = self.load_visits().await;
        let days = self.routed_days(&visits, Period::Month(month)).await;
        aggregator::month_report(month, &days)
    }

    pub async fn get_year_report(&self) -> YearReport {
        let visits = self.load_visits().await;
        let days = self.routed_days(&visits, Period::All).await;
        aggregator::year_report(&days, &visits)
    }
}
