//! End-to-end tests: feed text through to week/month/year reports

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use visit_mileage::domain::{DistanceOutcome, MonthKey, PlaceName};
use visit_mileage::infra::{Config, Metrics, PlaceTable};
use visit_mileage::io::{CalendarSource, RouteProvider, RoutingError, StaticLegTable, Waypoint};
use visit_mileage::services::{
    DistanceEngine, EventExtractor, PlaceLocator, ReportService, Resolver,
};

const FEED: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
BEGIN:VEVENT\r
DTSTART:20240610T100000\r
SUMMARY:Nominativo Mario - Frazione: Udine\r
DESCRIPTION:Codice fiscale MRARSS80A01L483X\r
END:VEVENT\r
BEGIN:VEVENT\r
DTSTART:20240611T070000Z\r
SUMMARY:Nominativo Bianchi\r
DESCRIPTION:Codice fiscale BNCLRA\\, visita a\r
  Codroipo\r
BEGIN:VALARM\r
DESCRIPTION:Reminder Sedegliano\r
END:VALARM\r
END:VEVENT\r
BEGIN:VEVENT\r
DTSTART:20240611T140000Z\r
SUMMARY:Nominativo Verdi\r
DESCRIPTION:Codice fiscale VRDGPP Località: Codroipo\r
END:VEVENT\r
BEGIN:VEVENT\r
DTSTART:20240612T090000Z\r
SUMMARY:Riunione condominio\r
DESCRIPTION:Udine\r
END:VEVENT\r
BEGIN:VEVENT\r
DTSTART:20231010T090000Z\r
SUMMARY:Nominativo Vecchio\r
DESCRIPTION:Codice fiscale OLD Udine\r
END:VEVENT\r
END:VCALENDAR\r
";

struct MemorySource(String);

#[async_trait]
impl CalendarSource for MemorySource {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn fetch(&self) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

struct BrokenSource;

#[async_trait]
impl CalendarSource for BrokenSource {
    fn describe(&self) -> String {
        "broken".to_string()
    }

    async fn fetch(&self) -> anyhow::Result<String> {
        anyhow::bail!("HTTP 503")
    }
}

/// Records every itinerary it is asked to route
struct CountingRouter {
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<String>>>,
}

impl CountingRouter {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0), seen: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl RouteProvider for CountingRouter {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn route_km(&self, waypoints: &[Waypoint]) -> Result<f64, RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .push(waypoints.iter().map(|w| w.place.as_str().to_string()).collect());
        Ok(12.34 * (waypoints.len() - 1) as f64)
    }
}

fn name(s: &str) -> PlaceName {
    PlaceName::new(s).unwrap()
}

fn service(source: Arc<dyn CalendarSource>, router: Arc<dyn RouteProvider>) -> ReportService {
    let config = Config::default();
    let metrics = Arc::new(Metrics::new());
    let table = Arc::new(PlaceTable::builtin());
    let locator = Arc::new(PlaceLocator::new(table.clone(), None, metrics.clone()));
    let engine = Arc::new(DistanceEngine::new(locator, router, None, metrics.clone()));
    let resolver = Resolver::from_config(&config, table, metrics.clone()).unwrap();
    let extractor = EventExtractor::from_config(&config);
    ReportService::new(source, extractor, resolver, engine, name("Basiliano"), metrics)
}

#[tokio::test]
async fn test_week_report_end_to_end() {
    let router = Arc::new(CountingRouter::new());
    let service = service(Arc::new(MemorySource(FEED.to_string())), router.clone());

    let report = service.get_week_report(24).await;
    assert_eq!(report.years.len(), 1);

    let week = &report.years[&2024];
    let monday = &week.days[&NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()];
    let stops: Vec<&str> = monday.itinerary.stops().iter().map(|p| p.as_str()).collect();
    assert_eq!(stops, ["BASILIANO", "UDINE", "BASILIANO"]);
    assert_eq!(monday.distance, DistanceOutcome::Known { km: 24.7 });

    // Two Codroipo visits on Tuesday collapse into one stop
    let tuesday = &week.days[&NaiveDate::from_ymd_opt(2024, 6, 11).unwrap()];
    let stops: Vec<&str> = tuesday.itinerary.stops().iter().map(|p| p.as_str()).collect();
    assert_eq!(stops, ["BASILIANO", "CODROIPO", "BASILIANO"]);

    // Non-work Wednesday event is filtered out
    assert_eq!(week.days.len(), 2);
    assert_eq!(week.total.km, 49.4);
    assert_eq!(week.total.unknown_days, 0);
    assert_eq!(router.calls.load(Ordering::SeqCst), 2);

    let seen = router.seen.lock();
    assert!(seen.contains(&vec!["BASILIANO".to_string(), "UDINE".to_string(), "BASILIANO".to_string()]));
}

#[tokio::test]
async fn test_repeat_queries_reuse_distances() {
    let router = Arc::new(CountingRouter::new());
    let service = service(Arc::new(MemorySource(FEED.to_string())), router.clone());

    service.get_week_report(24).await;
    let month = service.get_month_report(6).await;
    let year = service.get_year_report().await;

    assert_eq!(month.years[&2024].weeks[&24].km, 49.4);
    let june = MonthKey { year: 2024, month: 6 };
    assert_eq!(year.months[&june].days, 2);
    // Three appointments over two routed days
    assert_eq!(year.visits[&june], 3);
    // Events before the floor year never reach the year report
    assert!(!year.years.contains_key(&2023));
    assert_eq!(router.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_static_table_doubles_single_leg() {
    let mut legs = StaticLegTable::default();
    legs.insert(name("BASILIANO"), name("UDINE"), 14.46);
    legs.insert(name("BASILIANO"), name("CODROIPO"), 9.0);
    let service = service(Arc::new(MemorySource(FEED.to_string())), Arc::new(legs));

    let report = service.get_week_report(24).await;
    let week = &report.years[&2024];
    let monday = &week.days[&NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()];
    assert_eq!(monday.distance, DistanceOutcome::Known { km: 28.9 });
    assert_eq!(week.total.km, 46.9);
}

#[tokio::test]
async fn test_no_matching_events_gives_empty_report() {
    let router = Arc::new(CountingRouter::new());
    let service = service(Arc::new(MemorySource(FEED.to_string())), router.clone());

    assert!(service.get_week_report(30).await.is_empty());
    assert!(service.get_month_report(2).await.is_empty());
    assert_eq!(router.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_feed_failure_gives_empty_reports() {
    let router = Arc::new(CountingRouter::new());
    let service = service(Arc::new(BrokenSource), router.clone());

    assert!(service.get_week_report(24).await.is_empty());
    assert!(service.get_year_report().await.is_empty());
    assert_eq!(router.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_from_config_with_file_feed_and_static_routing() {
    let mut feed = NamedTempFile::new().unwrap();
    feed.write_all(FEED.as_bytes()).unwrap();
    feed.flush().unwrap();

    let config = Config::from_toml_str(&format!(
        r#"
[feed]
path = "{}"

[routing]
mode = "static"

[[routing.legs]]
from = "Basiliano"
to = "Udine"
km = 14.5
"#,
        feed.path().display()
    ))
    .unwrap();

    let service = ReportService::from_config(&config, Arc::new(Metrics::new())).unwrap();
    let report = service.get_week_report(24).await;
    let week = &report.years[&2024];

    assert_eq!(week.days.len(), 2);
    // No BASILIANO-CODROIPO leg configured
    assert_eq!(week.total.km, 29.0);
    assert_eq!(week.total.unknown_days, 1);
    assert!(week.total.is_partial());
}
