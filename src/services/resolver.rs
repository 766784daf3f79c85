//! Location resolution - maps an event's free text to a canonical place
//!
//! Matchers are tried in configured order; the first one that finds a place
//! wins. When none does, the visit goes to the configured default place, so
//! every visit resolves to something routable.

use crate::domain::place::PlaceName;
use crate::domain::types::{CalendarEvent, MatchSource, ResolvedVisit};
use crate::infra::config::{Config, StrategyKind};
use crate::infra::metrics::Metrics;
use crate::infra::places::PlaceTable;
use anyhow::Context;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// The text fields of one event as seen by matchers
#[derive(Debug, Clone, Copy)]
pub struct VisitText<'a> {
    pub summary: &'a str,
    /// Description, summary and location, newline separated
    pub combined: &'a str,
}

/// One location strategy
pub trait PlaceMatcher: Send + Sync {
    fn source(&self) -> MatchSource;

    fn attempt(&self, text: &VisitText<'_>) -> Option<PlaceName>;
}

/// `Frazione: Udine`-style labels. The label value is trusted even if it is
/// not in the place table.
pub struct LabelMatcher {
    patterns: Vec<Regex>,
}

impl LabelMatcher {
    pub fn new(labels: &[String]) -> anyhow::Result<Self> {
        let patterns = labels
            .iter()
            .filter(|label| !label.trim().is_empty())
            .map(|label| {
                let pattern = format!(r"(?i)\b{}[ \t]*([^,;:\n]*)", regex::escape(label.trim()));
                Regex::new(&pattern).with_context(|| format!("Invalid location label {:?}", label))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

impl PlaceMatcher for LabelMatcher {
    fn source(&self) -> MatchSource {
        MatchSource::Label
    }

    fn attempt(&self, text: &VisitText<'_>) -> Option<PlaceName> {
        // Labels are tried in priority order, not by position in the text
        self.patterns.iter().find_map(|pattern| {
            pattern
                .captures_iter(text.combined)
                .filter_map(|caps| caps.get(1))
                .find_map(|value| PlaceName::new(value.as_str()))
        })
    }
}

/// Longest known place name mentioned anywhere in the text
pub struct GazetteerMatcher {
    table: Arc<PlaceTable>,
}

impl GazetteerMatcher {
    pub fn new(table: Arc<PlaceTable>) -> Self {
        Self { table }
    }
}

impl PlaceMatcher for GazetteerMatcher {
    fn source(&self) -> MatchSource {
        MatchSource::Gazetteer
    }

    fn attempt(&self, text: &VisitText<'_>) -> Option<PlaceName> {
        self.table.longest_match(text.combined).map(|place| place.name.clone())
    }
}

/// `Visita - Codroipo`: the segment after the last dash of the summary
pub struct SummarySuffixMatcher;

impl PlaceMatcher for SummarySuffixMatcher {
    fn source(&self) -> MatchSource {
        MatchSource::SummarySuffix
    }

    fn attempt(&self, text: &VisitText<'_>) -> Option<PlaceName> {
        let (_, suffix) = text.summary.rsplit_once('-')?;
        PlaceName::new(suffix)
    }
}

/// Ordered matcher pipeline with a default place
pub struct Resolver {
    matchers: Vec<Box<dyn PlaceMatcher>>,
    default_place: PlaceName,
    metrics: Arc<Metrics>,
}

impl Resolver {
    pub fn new(
        matchers: Vec<Box<dyn PlaceMatcher>>,
        default_place: PlaceName,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { matchers, default_place, metrics }
    }

    /// Build the pipeline configured in `resolver.strategies`
    pub fn from_config(
        config: &Config,
        table: Arc<PlaceTable>,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let mut matchers: Vec<Box<dyn PlaceMatcher>> = Vec::new();
        for kind in config.strategies() {
            let matcher: Box<dyn PlaceMatcher> = match kind {
                StrategyKind::Label => Box::new(LabelMatcher::new(config.labels())?),
                StrategyKind::Gazetteer => Box::new(GazetteerMatcher::new(table.clone())),
                StrategyKind::SummarySuffix => Box::new(SummarySuffixMatcher),
            };
            matchers.push(matcher);
        }

        let default_place = PlaceName::new(config.default_place())
            .with_context(|| format!("Invalid default place {:?}", config.default_place()))?;
        if table.get(&default_place).is_none() {
            warn!(default_place = %default_place, "default_place_not_in_table");
        }

        Ok(Self::new(matchers, default_place, metrics))
    }

    /// Resolve one event's place and the matcher that found it
    pub fn resolve(&self, event: &CalendarEvent) -> (PlaceName, MatchSource) {
        let combined = event.combined_text();
        let text = VisitText {
            summary: &event.summary,
            combined: &combined,
        };

        for matcher in &self.matchers {
            if let Some(place) = matcher.attempt(&text) {
                return (place, matcher.source());
            }
        }

        debug!(summary = %event.summary, default_place = %self.default_place, "location_defaulted");
        (self.default_place.clone(), MatchSource::Default)
    }

    /// Resolve every event into a visit
    pub fn resolve_all(&self, events: &[CalendarEvent]) -> Vec<ResolvedVisit> {
        events
            .iter()
            .map(|event| {
                let (place, source) = self.resolve(event);
                self.metrics.record_resolution(source);
                ResolvedVisit { date: event.start.date(), time: event.start.time(), place, source }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::place::{Coordinates, Place};
    use chrono::NaiveDate;

    fn table(names: &[&str]) -> Arc<PlaceTable> {
        Arc::new(PlaceTable::from_places(names.iter().map(|n| Place {
            name: PlaceName::new(n).unwrap(),
            coordinates: Coordinates::new(46.0, 13.0),
        })))
    }

    fn event(summary: &str, description: &str) -> CalendarEvent {
        CalendarEvent {
            start: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap().and_hms_opt(12, 0, 0).unwrap(),
            summary: summary.to_string(),
            description: description.to_string(),
            location: String::new(),
        }
    }

    fn event_at(summary: &str, location: &str) -> CalendarEvent {
        CalendarEvent { location: location.to_string(), ..event(summary, "Codice fiscale X") }
    }

    fn resolver(strategies: Vec<StrategyKind>, places: &[&str]) -> Resolver {
        let config = Config::default().with_strategies(strategies);
        Resolver::from_config(&config, table(places), Arc::new(Metrics::new())).unwrap()
    }

    fn default_resolver() -> Resolver {
        resolver(
            vec![StrategyKind::Label, StrategyKind::Gazetteer],
            &["UDINE", "SAN", "SAN DONA", "CODROIPO"],
        )
    }

    #[test]
    fn test_label_value_wins() {
        let (place, source) = default_resolver()
            .resolve(&event("Nominativo Mario - Frazione: Udine", "Codice fiscale X"));
        assert_eq!(place.as_str(), "UDINE");
        assert_eq!(source, MatchSource::Label);
    }

    #[test]
    fn test_label_value_stops_before_location() {
        let (place, source) = default_resolver()
            .resolve(&event_at("Nominativo Mario - Frazione: Udine", "Piazza Libertà 1"));
        assert_eq!(place.as_str(), "UDINE");
        assert_eq!(source, MatchSource::Label);
    }

    #[test]
    fn test_empty_label_at_field_end_skips_next_field() {
        let (place, source) = default_resolver().resolve(&event_at("Nominativo Frazione:", "Codroipo"));
        assert_eq!(place.as_str(), "CODROIPO");
        assert_eq!(source, MatchSource::Gazetteer);
    }

    #[test]
    fn test_location_field_feeds_gazetteer() {
        let (place, source) = default_resolver().resolve(&event_at("Nominativo Rossi", "Via Roma 3, Codroipo"));
        assert_eq!(place.as_str(), "CODROIPO");
        assert_eq!(source, MatchSource::Gazetteer);
    }

    #[test]
    fn test_label_value_not_in_table_is_kept() {
        let (place, source) =
            default_resolver().resolve(&event("Nominativo", "Località: Pozzuolo del Friuli, via X"));
        assert_eq!(place.as_str(), "POZZUOLO DEL FRIULI");
        assert_eq!(source, MatchSource::Label);
    }

    #[test]
    fn test_label_priority_over_position() {
        // "Frazione:" is tried before "Città:" even though it appears later
        let (place, _) =
            default_resolver().resolve(&event("Città: Udine", "Frazione: Orgnano, note"));
        assert_eq!(place.as_str(), "ORGNANO");
    }

    #[test]
    fn test_empty_label_value_falls_through() {
        let (place, source) =
            default_resolver().resolve(&event("Frazione: , visita a Codroipo", ""));
        assert_eq!(place.as_str(), "CODROIPO");
        assert_eq!(source, MatchSource::Gazetteer);
    }

    #[test]
    fn test_label_needs_word_boundary() {
        let (place, source) = default_resolver().resolve(&event("Capacity: 5 posti", "Udine"));
        assert_eq!(place.as_str(), "UDINE");
        assert_eq!(source, MatchSource::Gazetteer);
    }

    #[test]
    fn test_label_case_insensitive() {
        let (place, _) = default_resolver().resolve(&event("CITTÀ: Gemona", ""));
        assert_eq!(place.as_str(), "GEMONA");
    }

    #[test]
    fn test_gazetteer_longest_match() {
        let (place, source) =
            default_resolver().resolve(&event("Visita", "Cliente a San Donà di Piave"));
        assert_eq!(place.as_str(), "SAN DONA");
        assert_eq!(source, MatchSource::Gazetteer);
    }

    #[test]
    fn test_default_place_fallback() {
        let (place, source) = default_resolver().resolve(&event("Visita cliente", "nessun luogo"));
        assert_eq!(place.as_str(), "UDINE");
        assert_eq!(source, MatchSource::Default);
    }

    #[test]
    fn test_summary_suffix_strategy() {
        let r = resolver(
            vec![StrategyKind::Label, StrategyKind::SummarySuffix],
            &["UDINE"],
        );
        let (place, source) = r.resolve(&event("Visita - Mario - Rivignano", ""));
        assert_eq!(place.as_str(), "RIVIGNANO");
        assert_eq!(source, MatchSource::SummarySuffix);
    }

    #[test]
    fn test_strategy_order_is_respected() {
        let r = resolver(vec![StrategyKind::Gazetteer, StrategyKind::Label], &["CODROIPO", "UDINE"]);
        let (place, source) = r.resolve(&event("Frazione: Beano", "vicino a Codroipo"));
        assert_eq!(place.as_str(), "CODROIPO");
        assert_eq!(source, MatchSource::Gazetteer);
    }

    #[test]
    fn test_resolve_all_records_sources() {
        let metrics = Arc::new(Metrics::new());
        let config = Config::default();
        let r = Resolver::from_config(&config, table(&["UDINE"]), metrics.clone()).unwrap();

        let visits = r.resolve_all(&[event("Frazione: Udine", ""), event("niente", "")]);
        assert_eq!(visits.len(), 2);
        assert_eq!(visits[0].date, NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());

        let summary = metrics.report();
        assert_eq!(summary.resolved_label, 1);
        assert_eq!(summary.resolved_default, 1);
    }
}
