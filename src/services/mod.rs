//! Services - the mileage pipeline
//!
//! This module contains the pipeline stages, leaf first:
//! - `extractor` - Work-event filter, start time and date floor
//! - `resolver` - Event text to canonical place, through ordered matchers
//! - `locator` - Place coordinates from the table or the geocoder
//! - `distance` - Round-trip distance with a single-flight cache
//! - `aggregator` - Day grouping, concurrent routing, week/month/year roll-ups
//! - `report` - Query surface wiring the feed through every stage

pub mod aggregator;
pub mod distance;
pub mod extractor;
pub mod locator;
pub mod report;
pub mod resolver;

// Re-export commonly used types
pub use aggregator::Period;
pub use distance::{DistanceCache, DistanceEngine};
pub use extractor::EventExtractor;
pub use locator::PlaceLocator;
pub use report::ReportService;
pub use resolver::{
    GazetteerMatcher, LabelMatcher, PlaceMatcher, Resolver, SummarySuffixMatcher, VisitText,
};
