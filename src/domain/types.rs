//! Shared types for the mileage pipeline

use super::place::PlaceName;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Round to one decimal place, the precision used for every distance
#[inline]
pub fn round1(km: f64) -> f64 {
    (km * 10.0).round() / 10.0
}

/// Work event recovered from a VEVENT block
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    /// Local start time after the timezone heuristic
    pub start: NaiveDateTime,
    pub summary: String,
    pub description: String,
    pub location: String,
}

impl CalendarEvent {
    /// Free text handed to the location matchers, one field per line so a
    /// label value never runs on into the next field
    pub fn combined_text(&self) -> String {
        format!("{}\n{}\n{}", self.description, self.summary, self.location)
    }
}

/// Which matcher produced a visit's place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Label,
    Gazetteer,
    SummarySuffix,
    Default,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchSource::Label => "label",
            MatchSource::Gazetteer => "gazetteer",
            MatchSource::SummarySuffix => "summary_suffix",
            MatchSource::Default => "default",
        }
    }
}

/// Why an event block was dropped by the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotWork,
    MissingStart,
    BadStart,
    BeforeFloor,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::NotWork => "not_work",
            Rejection::MissingStart => "missing_start",
            Rejection::BadStart => "bad_start",
            Rejection::BeforeFloor => "before_floor",
        }
    }
}

/// A calendar event annotated with the place it visits
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedVisit {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub place: PlaceName,
    pub source: MatchSource,
}

/// Ordered place tuple identifying an itinerary in the distance cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItinerarySignature(SmallVec<[PlaceName; 6]>);

impl ItinerarySignature {
    pub fn places(&self) -> &[PlaceName] {
        &self.0
    }
}

/// Round trip for one day: home, visits in order, home
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Itinerary {
    stops: Vec<PlaceName>,
}

impl Itinerary {
    /// Build `[home] + visits + [home]`, collapsing consecutive duplicate visits
    pub fn round_trip(home: &PlaceName, visits: &[PlaceName]) -> Self {
        let mut stops = Vec::with_capacity(visits.len() + 2);
        stops.push(home.clone());
        for (i, place) in visits.iter().enumerate() {
            if i == 0 || visits[i - 1] != *place {
                stops.push(place.clone());
            }
        }
        stops.push(home.clone());
        Self { stops }
    }

    /// All stops including both home ends
    pub fn stops(&self) -> &[PlaceName] {
        &self.stops
    }

    /// Visited places between the two home ends
    pub fn visits(&self) -> &[PlaceName] {
        if self.stops.len() <= 2 {
            &[]
        } else {
            &self.stops[1..self.stops.len() - 1]
        }
    }

    pub fn signature(&self) -> ItinerarySignature {
        ItinerarySignature(self.stops.iter().cloned().collect())
    }
}

impl std::fmt::Display for Itinerary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, stop) in self.stops.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", stop)?;
        }
        Ok(())
    }
}

/// Distance of one itinerary
///
/// `Unknown` means the routing backend failed; it is never folded into a sum
/// as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DistanceOutcome {
    Known { km: f64 },
    Unknown,
}

impl DistanceOutcome {
    pub fn known(km: f64) -> Self {
        DistanceOutcome::Known { km: round1(km) }
    }

    pub fn km(&self) -> Option<f64> {
        match self {
            DistanceOutcome::Known { km } => Some(*km),
            DistanceOutcome::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, DistanceOutcome::Unknown)
    }
}
