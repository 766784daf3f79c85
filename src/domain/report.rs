//! Report structures returned to the consumer
//!
//! All maps are `BTreeMap` so years, weeks and days come out in ascending
//! order without extra sorting.

use super::types::{round1, DistanceOutcome, Itinerary};
use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// One routed day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayTotal {
    pub date: NaiveDate,
    pub itinerary: Itinerary,
    pub distance: DistanceOutcome,
}

/// Sum of days, keeping unknown days apart from known kilometers
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DistanceTotal {
    pub km: f64,
    pub days: usize,
    pub unknown_days: usize,
}

impl DistanceTotal {
    pub fn add(&mut self, distance: &DistanceOutcome) {
        self.days += 1;
        match distance.km() {
            Some(km) => self.km = round1(self.km + km),
            None => self.unknown_days += 1,
        }
    }

    /// True when at least one day could not be routed
    pub fn is_partial(&self) -> bool {
        self.unknown_days > 0
    }
}

/// Days of one ISO week inside one ISO year
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeekYear {
    pub days: BTreeMap<NaiveDate, DayTotal>,
    pub total: DistanceTotal,
}

/// The same ISO week number across every year present in the feed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeekReport {
    pub week: u32,
    pub years: BTreeMap<i32, WeekYear>,
}

impl WeekReport {
    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}

/// Weekly totals of one month inside one calendar year
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthYear {
    pub weeks: BTreeMap<u32, DistanceTotal>,
    pub total: DistanceTotal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthReport {
    pub month: u32,
    pub years: BTreeMap<i32, MonthYear>,
}

impl MonthReport {
    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}

/// `(year, month)` key, serialized as `"YYYY-MM"` so it can be a JSON map key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(date: NaiveDate) -> Self {
        Self { year: date.year(), month: date.month() }
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct YearReport {
    pub months: BTreeMap<MonthKey, DistanceTotal>,
    pub years: BTreeMap<i32, DistanceTotal>,
    /// Work appointments per `(year, month)`, several per day included
    pub visits: BTreeMap<MonthKey, usize>,
}

impl YearReport {
    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }
}
