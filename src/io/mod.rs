//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `ics` - iCalendar text normalization and VEVENT extraction
//! - `feed` - Calendar feed sources (HTTP, local file)
//! - `routing` - Road distance backends (OSRM, static leg table)
//! - `geocoder` - Nominatim lookup for places missing from the table

pub mod feed;
pub mod geocoder;
pub mod ics;
pub mod routing;

// Re-export commonly used types
pub use feed::{source_from_config, CalendarSource, FileFeed, HttpFeed};
pub use geocoder::{GeocodeError, Geocoder, NominatimGeocoder};
pub use ics::{parse_event_blocks, EventBlock};
pub use routing::{OsrmRouter, RouteProvider, RoutingError, StaticLegTable, Waypoint};
