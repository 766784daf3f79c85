//! Known-places reference table
//!
//! Loaded once at startup from CSV files (`name,lat,lon`), falling back to a
//! small built-in table of Friuli and eastern Veneto municipalities. The table
//! is immutable afterwards and shared behind an `Arc`.

use crate::domain::place::{normalize_place_text, Coordinates, Place, PlaceName};
use anyhow::Context;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Built-in fallback rows (name, lat, lon)
const BUILTIN_PLACES: &[(&str, f64, f64)] = &[
    ("AQUILEIA", 45.7697, 13.3697),
    ("BASILIANO", 46.0156, 13.1036),
    ("CAMPOFORMIDO", 46.0200, 13.1600),
    ("CERVIGNANO DEL FRIULI", 45.8231, 13.3356),
    ("CIVIDALE DEL FRIULI", 46.0937, 13.4322),
    ("CODROIPO", 45.9617, 12.9770),
    ("FAGAGNA", 46.1136, 13.0847),
    ("GEMONA DEL FRIULI", 46.2757, 13.1393),
    ("GORIZIA", 45.9409, 13.6217),
    ("LATISANA", 45.7808, 12.9966),
    ("LIGNANO SABBIADORO", 45.6800, 13.1400),
    ("MANIAGO", 46.1706, 12.7081),
    ("MARTIGNACCO", 46.1000, 13.1333),
    ("MONFALCONE", 45.8090, 13.5330),
    ("MORTEGLIANO", 45.9453, 13.1717),
    ("PALMANOVA", 45.9055, 13.3095),
    ("PASIAN DI PRATO", 46.0464, 13.1867),
    ("PORDENONE", 45.9564, 12.6615),
    ("PORTOGRUARO", 45.7750, 12.8372),
    ("SACILE", 45.9542, 12.5031),
    ("SAN DANIELE DEL FRIULI", 46.1583, 13.0104),
    ("SAN DONA DI PIAVE", 45.6311, 12.5667),
    ("SPILIMBERGO", 46.1104, 12.9001),
    ("TARCENTO", 46.2150, 13.2130),
    ("TAVAGNACCO", 46.1280, 13.2160),
    ("TOLMEZZO", 46.3990, 13.0210),
    ("TREVISO", 45.6669, 12.2430),
    ("TRIESTE", 45.6495, 13.7768),
    ("UDINE", 46.0711, 13.2346),
    ("VENEZIA", 45.4408, 12.3155),
];

/// One CSV row
#[derive(Debug, Deserialize)]
struct PlaceRecord {
    #[serde(alias = "comune", alias = "place")]
    name: String,
    #[serde(alias = "latitude")]
    lat: f64,
    #[serde(alias = "longitude", alias = "lng")]
    lon: f64,
}

/// Immutable gazetteer with longest-name-first matching
#[derive(Debug, Clone, Default)]
pub struct PlaceTable {
    places: Vec<Place>,
    index: FxHashMap<PlaceName, usize>,
    /// Indices into `places`, longest name first, table order on ties
    by_length: Vec<usize>,
}

impl PlaceTable {
    /// Build from places in priority order. Duplicate names keep the first entry.
    pub fn from_places<I: IntoIterator<Item = Place>>(places: I) -> Self {
        let mut table = Self::default();
        for place in places {
            table.push(place);
        }
        table.reindex();
        table
    }

    /// Embedded fallback table
    pub fn builtin() -> Self {
        Self::from_places(BUILTIN_PLACES.iter().filter_map(|(name, lat, lon)| {
            PlaceName::new(name).map(|name| Place { name, coordinates: Coordinates::new(*lat, *lon) })
        }))
    }

    /// Load every file in order; unreadable files are skipped with a warning.
    /// When nothing loads, the built-in table is used.
    pub fn load<P: AsRef<Path>>(files: &[P]) -> Self {
        let mut table = Self::default();

        for path in files {
            let path = path.as_ref();
            match read_csv(path) {
                Ok(places) => {
                    let before = table.places.len();
                    for place in places {
                        table.push(place);
                    }
                    info!(
                        file = %path.display(),
                        places = %(table.places.len() - before),
                        "places_file_loaded"
                    );
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %format!("{:#}", e), "places_file_failed");
                }
            }
        }

        if table.places.is_empty() {
            warn!(
                builtin_places = %BUILTIN_PLACES.len(),
                "no_reference_places_loaded_using_builtin_table"
            );
            return Self::builtin();
        }

        table.reindex();
        table
    }

    /// Return a copy with `place` added or its coordinates replaced
    pub fn with_place(mut self, place: Place) -> Self {
        match self.index.get(&place.name) {
            Some(&idx) => self.places[idx].coordinates = place.coordinates,
            None => self.push(place),
        }
        self.reindex();
        self
    }

    fn push(&mut self, place: Place) {
        if !place.coordinates.is_valid() {
            warn!(place = %place.name, "place_coordinates_invalid");
            return;
        }
        if self.index.contains_key(&place.name) {
            warn!(place = %place.name, "place_duplicate_ignored");
            return;
        }
        self.index.insert(place.name.clone(), self.places.len());
        self.places.push(place);
    }

    fn reindex(&mut self) {
        let mut order: Vec<usize> = (0..self.places.len()).collect();
        // Stable sort keeps table order among equal lengths
        order.sort_by_key(|&i| std::cmp::Reverse(self.places[i].name.char_len()));
        self.by_length = order;
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    pub fn get(&self, name: &PlaceName) -> Option<&Place> {
        self.index.get(name).map(|&i| &self.places[i])
    }

    pub fn coordinates(&self, name: &PlaceName) -> Option<Coordinates> {
        self.get(name).map(|p| p.coordinates)
    }

    /// Find the longest known place name contained in `text` on token
    /// boundaries. `text` is normalized first.
    pub fn longest_match(&self, text: &str) -> Option<&Place> {
        let normalized = normalize_place_text(text);
        if normalized.is_empty() {
            return None;
        }
        let haystack = format!(" {} ", normalized);

        self.by_length.iter().map(|&i| &self.places[i]).find(|place| {
            let needle = format!(" {} ", place.name.as_str());
            haystack.contains(&needle)
        })
    }
}

fn read_csv(path: &Path) -> anyhow::Result<Vec<Place>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open places file {}", path.display()))?;

    let mut places = Vec::new();
    for (line, record) in reader.deserialize::<PlaceRecord>().enumerate() {
        let record = record
            .with_context(|| format!("Bad row {} in places file {}", line + 2, path.display()))?;
        if let Some(name) = PlaceName::new(&record.name) {
            places.push(Place { name, coordinates: Coordinates::new(record.lat, record.lon) });
        }
    }
    Ok(places)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn place(name: &str, lat: f64, lon: f64) -> Place {
        Place { name: PlaceName::new(name).unwrap(), coordinates: Coordinates::new(lat, lon) }
    }

    #[test]
    fn test_longest_match_first() {
        let table = PlaceTable::from_places([place("SAN", 1.0, 1.0), place("SAN DONA", 2.0, 2.0)]);
        let found = table.longest_match("Visita a San Donà di Piave").unwrap();
        assert_eq!(found.name.as_str(), "SAN DONA");
    }

    #[test]
    fn test_match_respects_token_boundaries() {
        let table = PlaceTable::from_places([place("SAN", 1.0, 1.0)]);
        assert!(table.longest_match("Santo Stefano").is_none());
        assert!(table.longest_match("via San Marco").is_some());
    }

    #[test]
    fn test_equal_length_ties_keep_table_order() {
        let table = PlaceTable::from_places([place("ROMA", 1.0, 1.0), place("BARI", 2.0, 2.0)]);
        let found = table.longest_match("da Bari a Roma").unwrap();
        assert_eq!(found.name.as_str(), "ROMA");
    }

    #[test]
    fn test_lookup_is_accent_and_case_insensitive() {
        let table = PlaceTable::builtin();
        let name = PlaceName::new("san donà di piave").unwrap();
        assert!(table.coordinates(&name).is_some());
    }

    #[test]
    fn test_duplicates_keep_first() {
        let table = PlaceTable::from_places([place("UDINE", 1.0, 1.0), place("Udine", 2.0, 2.0)]);
        assert_eq!(table.len(), 1);
        let udine = PlaceName::new("UDINE").unwrap();
        assert_eq!(table.coordinates(&udine), Some(Coordinates::new(1.0, 1.0)));
    }

    #[test]
    fn test_with_place_overrides_coordinates() {
        let home = PlaceName::new("BASILIANO").unwrap();
        let table = PlaceTable::builtin().with_place(place("BASILIANO", 46.0, 13.0));
        assert_eq!(table.coordinates(&home), Some(Coordinates::new(46.0, 13.0)));
    }

    #[test]
    fn test_load_csv_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "name,lat,lon").unwrap();
        writeln!(file, "Sedegliano, 45.9950, 12.9850").unwrap();
        writeln!(file, "Lestizza,45.9560,13.1420").unwrap();
        file.flush().unwrap();

        let table = PlaceTable::load(&[file.path()]);
        assert_eq!(table.len(), 2);
        assert!(table.get(&PlaceName::new("SEDEGLIANO").unwrap()).is_some());
    }

    #[test]
    fn test_load_missing_file_falls_back_to_builtin() {
        let table = PlaceTable::load(&["/nonexistent/places.csv"]);
        assert_eq!(table.len(), BUILTIN_PLACES.len());
    }

    #[test]
    fn test_bad_file_skipped_good_file_kept() {
        let mut bad = NamedTempFile::new().unwrap();
        writeln!(bad, "name,lat,lon").unwrap();
        writeln!(bad, "Udine,not-a-number,13.2").unwrap();
        bad.flush().unwrap();

        let mut good = NamedTempFile::new().unwrap();
        writeln!(good, "comune,latitude,longitude").unwrap();
        writeln!(good, "Varmo,45.8870,12.9870").unwrap();
        good.flush().unwrap();

        let table = PlaceTable::load(&[bad.path(), good.path()]);
        assert_eq!(table.len(), 1);
        assert!(table.get(&PlaceName::new("VARMO").unwrap()).is_some());
    }
}
