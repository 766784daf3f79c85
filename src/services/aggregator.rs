//! Day grouping, concurrent per-day routing and the week/month/year roll-ups

use crate::domain::place::PlaceName;
use crate::domain::report::{DayTotal, MonthKey, MonthReport, WeekReport, YearReport};
use crate::domain::types::{DistanceOutcome, Itinerary, ResolvedVisit};
use crate::services::distance::DistanceEngine;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Which days a query covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    /// ISO week number, any year
    Week(u32),
    /// Calendar month number, any year
    Month(u32),
    All,
}

impl Period {
    pub fn contains(&self, date: NaiveDate) -> bool {
        match *self {
            Period::Week(week) => date.iso_week().week() == week,
            Period::Month(month) => date.month() == month,
            Period::All => true,
        }
    }
}

/// Visited places per calendar date, in start-time order inside each day
pub fn group_by_day(visits: &[ResolvedVisit]) -> BTreeMap<NaiveDate, Vec<PlaceName>> {
    let mut ordered: Vec<&ResolvedVisit> = visits.iter().collect();
    // Stable: same-time visits keep feed order
    ordered.sort_by_key(|v| (v.date, v.time));

    let mut days: BTreeMap<NaiveDate, Vec<PlaceName>> = BTreeMap::new();
    for visit in ordered {
        days.entry(visit.date).or_default().push(visit.place.clone());
    }
    days
}

/// Keep only the days inside `period`
pub fn select_days(
    days: &BTreeMap<NaiveDate, Vec<PlaceName>>,
    period: Period,
) -> BTreeMap<NaiveDate, Vec<PlaceName>> {
    days.iter()
        .filter(|(date, _)| period.contains(**date))
        .map(|(date, places)| (*date, places.clone()))
        .collect()
}

/// Route every day concurrently, at most `max_concurrent` at a time
///
/// Returns one `DayTotal` per input day in date order. A day whose task did
/// not complete is reported as `Unknown`.
pub async fn route_days(
    engine: &Arc<DistanceEngine>,
    home: &PlaceName,
    days: &BTreeMap<NaiveDate, Vec<PlaceName>>,
    max_concurrent: usize,
) -> Vec<DayTotal> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks = JoinSet::new();

    for (date, places) in days {
        let date = *date;
        let itinerary = Itinerary::round_trip(home, places);
        let engine = engine.clone();
        let semaphore = semaphore.clone();

        tasks.spawn(async move {
            let distance = match semaphore.acquire_owned().await {
                Ok(_permit) => engine.distance_for(&itinerary).await,
                Err(_) => DistanceOutcome::Unknown,
            };
            DayTotal { date, itinerary, distance }
        });
    }

    let mut routed: BTreeMap<NaiveDate, DayTotal> = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(day) => {
                routed.insert(day.date, day);
            }
            Err(e) => warn!(error = %e, "day_route_task_failed"),
        }
    }

    for (date, places) in days {
        routed.entry(*date).or_insert_with(|| DayTotal {
            date: *date,
            itinerary: Itinerary::round_trip(home, places),
            distance: DistanceOutcome::Unknown,
        });
    }

    debug!(days = %routed.len(), "days_routed");
    routed.into_values().collect()
}

/// Days of ISO week `week`, partitioned by ISO year
pub fn week_report(week: u32, days: &[DayTotal]) -> WeekReport {
    let mut report = WeekReport { week, ..Default::default() };
    for day in days.iter().filter(|d| Period::Week(week).contains(d.date)) {
        let entry = report.years.entry(day.date.iso_week().year()).or_default();
        entry.total.add(&day.distance);
        entry.days.insert(day.date, day.clone());
    }
    report
}

/// Days of calendar month `month`, partitioned by year then ISO week
pub fn month_report(month: u32, days: &[DayTotal]) -> MonthReport {
    let mut report = MonthReport { month, ..Default::default() };
    for day in days.iter().filter(|d| Period::Month(month).contains(d.date)) {
        let entry = report.years.entry(day.date.year()).or_default();
        entry.weeks.entry(day.date.iso_week().week()).or_default().add(&day.distance);
        entry.total.add(&day.distance);
    }
    report
}

/// `(year, month)` totals plus a total per year, and the number of
/// appointments behind each month
pub fn year_report(days: &[DayTotal], visits: &[ResolvedVisit]) -> YearReport {
    let mut report = YearReport::default();
    for day in days {
        let key = MonthKey::of(day.date);
        report.months.entry(key).or_default().add(&day.distance);
        report.years.entry(key.year).or_default().add(&day.distance);
    }
    for visit in visits {
        *report.visits.entry(MonthKey::of(visit.date)).or_default() += 1;
    }
    report
}
