//! Domain models - places, visits, itineraries and reports
//!
//! This module contains the canonical data types used throughout the system:
//! - `PlaceName` / `Place` - canonical place identity and coordinates
//! - `CalendarEvent` - a work event recovered from the feed
//! - `ResolvedVisit` - an event annotated with the place it visits
//! - `Itinerary` - one day's round trip, the distance cache key
//! - `DistanceOutcome` - known kilometers or an explicit unknown
//! - `WeekReport` / `MonthReport` / `YearReport` - roll-ups for the consumer

pub mod place;
pub mod report;
pub mod types;

// Re-export commonly used types at module level
pub use place::{normalize_place_text, Coordinates, Place, PlaceName};
pub use report::{
    DayTotal, DistanceTotal, MonthKey, MonthReport, MonthYear, WeekReport, WeekYear, YearReport,
};
pub use types::{
    round1, CalendarEvent, DistanceOutcome, Itinerary, ItinerarySignature, MatchSource,
    Rejection, ResolvedVisit,
};
