//! Work event extraction from VEVENT blocks
//!
//! Applies, in order: the work-event marker filter, start timestamp parsing
//! with the fixed timezone heuristic, and the year floor. Rejected blocks are
//! counted and logged at debug level; none of them is an error.

use crate::domain::types::{CalendarEvent, Rejection};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::ics::EventBlock;
use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta};
use std::sync::Arc;
use tracing::{debug, info};

/// Parse a DTSTART value: `YYYYMMDDTHHMMSS` from the first 15 characters, or a
/// bare `YYYYMMDD` at midnight. Trailing `Z` or other suffixes are ignored.
pub fn parse_start(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();

    if let Some(stamp) = value.get(..15) {
        if let Ok(dt) = NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M%S") {
            return Some(dt);
        }
    }

    let date = value.get(..8)?;
    // Reject things like "20240610T10" that are neither form
    if value.len() > 8 && value.as_bytes()[8] == b'T' {
        return None;
    }
    NaiveDate::parse_from_str(date, "%Y%m%d").ok()?.and_hms_opt(0, 0, 0)
}

/// Shift a stored timestamp to local civil time: +2h when `3 < month < 10`,
/// +1h otherwise. A fixed approximation of Central European time that ignores
/// the exact DST switch days.
pub fn local_time(raw: NaiveDateTime) -> NaiveDateTime {
    let hours = if (4..=9).contains(&raw.month()) { 2 } else { 1 };
    raw + TimeDelta::hours(hours)
}

/// Turns event blocks into work events
#[derive(Debug, Clone)]
pub struct EventExtractor {
    /// Lowercase substrings that must all be present
    markers: Vec<String>,
    min_year: i32,
}

impl EventExtractor {
    pub fn new(markers: Vec<String>, min_year: i32) -> Self {
        let markers = markers.into_iter().map(|m| m.to_lowercase()).collect();
        Self { markers, min_year }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.required_markers().to_vec(), config.min_year())
    }

    /// True when summary + description contain every marker (case-insensitive)
    pub fn is_work_event(&self, block: &EventBlock) -> bool {
        let text = format!("{} {}", block.summary, block.description).to_lowercase();
        self.markers.iter().all(|marker| text.contains(marker.as_str()))
    }

    /// Accept or reject a single block
    pub fn classify(&self, block: &EventBlock) -> Result<CalendarEvent, Rejection> {
        if !self.is_work_event(block) {
            return Err(Rejection::NotWork);
        }

        let raw = block.dtstart.as_deref().ok_or(Rejection::MissingStart)?;
        let start = parse_start(raw).map(local_time).ok_or(Rejection::BadStart)?;

        if start.year() < self.min_year {
            return Err(Rejection::BeforeFloor);
        }

        Ok(CalendarEvent {
            start,
            summary: block.summary.clone(),
            description: block.description.clone(),
            location: block.location.clone(),
        })
    }

    /// Extract all accepted events, in feed order
    pub fn extract(&self, blocks: &[EventBlock], metrics: &Arc<Metrics>) -> Vec<CalendarEvent> {
        let mut events = Vec::new();

        for block in blocks {
            match self.classify(block) {
                Ok(event) => {
                    metrics.record_event_kept();
                    events.push(event);
                }
                Err(reason) => {
                    metrics.record_event_rejected(reason);
                    // Non-work entries are the common case; keep them out of debug noise
                    if reason != Rejection::NotWork {
                        debug!(
                            reason = %reason.as_str(),
                            dtstart = ?block.dtstart,
                            summary = %block.summary,
                            "event_rejected"
                        );
                    }
                }
            }
        }

        info!(blocks = %blocks.len(), events = %events.len(), "events_extracted");
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn work_block(dtstart: &str) -> EventBlock {
        EventBlock {
            dtstart: Some(dtstart.to_string()),
            summary: "Nominativo Mario - Frazione: Udine".to_string(),
            description: "Codice Fiscale: RSSMRA80A01L483X".to_string(),
            location: String::new(),
        }
    }

    fn extractor() -> EventExtractor {
        EventExtractor::from_config(&Config::default())
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_summer_shift_is_two_hours() {
        let event = extractor().classify(&work_block("20240615T090000")).unwrap();
        assert_eq!(event.start.time(), hm(11, 0));
    }

    #[test]
    fn test_winter_shift_is_one_hour() {
        let event = extractor().classify(&work_block("20241215T090000")).unwrap();
        assert_eq!(event.start.time(), hm(10, 0));
    }

    #[test]
    fn test_march_and_october_are_winter() {
        let march = extractor().classify(&work_block("20240331T090000")).unwrap();
        assert_eq!(march.start.time(), hm(10, 0));
        let october = extractor().classify(&work_block("20241001T090000")).unwrap();
        assert_eq!(october.start.time(), hm(10, 0));
        let april = extractor().classify(&work_block("20240401T090000")).unwrap();
        assert_eq!(april.start.time(), hm(11, 0));
    }

    #[test]
    fn test_shift_can_roll_date() {
        let event = extractor().classify(&work_block("20240615T230000")).unwrap();
        assert_eq!(event.start.date(), NaiveDate::from_ymd_opt(2024, 6, 16).unwrap());
        assert_eq!(event.start.time(), hm(1, 0));
    }

    #[test]
    fn test_utc_suffix_ignored() {
        let event = extractor().classify(&work_block("20240610T100000Z")).unwrap();
        assert_eq!(event.start.time(), hm(12, 0));
    }

    #[test]
    fn test_bare_date_is_midnight_before_shift() {
        let event = extractor().classify(&work_block("20241203")).unwrap();
        assert_eq!(event.start.date(), NaiveDate::from_ymd_opt(2024, 12, 3).unwrap());
        assert_eq!(event.start.time(), hm(1, 0));
    }

    #[test]
    fn test_date_floor_excludes_earlier_years() {
        assert_eq!(
            extractor().classify(&work_block("20230601T100000")),
            Err(Rejection::BeforeFloor)
        );
        let relaxed = EventExtractor::from_config(&Config::default().with_min_year(2023));
        assert!(relaxed.classify(&work_block("20230601T100000")).is_ok());
    }

    #[test]
    fn test_new_year_shift_crosses_floor() {
        // 31 Dec 2023 23:30 becomes 1 Jan 2024 00:30 and passes the floor
        let event = extractor().classify(&work_block("20231231T233000")).unwrap();
        assert_eq!(event.start.year(), 2024);
    }

    #[test]
    fn test_non_work_event_rejected() {
        let mut block = work_block("20240610T100000");
        block.description = "Riunione di team".to_string();
        assert_eq!(extractor().classify(&block), Err(Rejection::NotWork));
    }

    #[test]
    fn test_markers_case_insensitive() {
        let mut block = work_block("20240610T100000");
        block.summary = "NOMINATIVO: Rossi".to_string();
        block.description = "CODICE FISCALE RSSMRA".to_string();
        assert!(extractor().classify(&block).is_ok());
    }

    #[test]
    fn test_missing_and_bad_start() {
        let mut block = work_block("x");
        block.dtstart = None;
        assert_eq!(extractor().classify(&block), Err(Rejection::MissingStart));

        assert_eq!(extractor().classify(&work_block("2024-06-10")), Err(Rejection::BadStart));
        assert_eq!(extractor().classify(&work_block("20241310T100000")), Err(Rejection::BadStart));
        assert_eq!(extractor().classify(&work_block("20240610T10")), Err(Rejection::BadStart));
    }

    #[test]
    fn test_extract_counts_metrics() {
        let metrics = Arc::new(Metrics::new());
        let mut other = work_block("20240610T100000");
        other.summary = "Dentista".to_string();
        other.description.clear();

        let blocks = vec![work_block("20240610T100000"), other, work_block("20230610T100000")];
        let events = extractor().extract(&blocks, &metrics);

        assert_eq!(events.len(), 1);
        let summary = metrics.report();
        assert_eq!(summary.events_seen, 3);
        assert_eq!(summary.rejected_not_work, 1);
        assert_eq!(summary.rejected_before_floor, 1);
    }
}
