//! Nominatim geocoding for places missing from the reference table

use crate::domain::place::{Coordinates, PlaceName};
use crate::infra::config::Config;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding request timed out")]
    Timeout,
    #[error("geocoding transport error: {0}")]
    Transport(String),
    #[error("geocoder returned HTTP {0}")]
    Status(u16),
    #[error("unparsable geocoder response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GeocodeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GeocodeError::Timeout
        } else {
            GeocodeError::Transport(e.to_string())
        }
    }
}

/// Place name to coordinates. `Ok(None)` means the service has no match.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn locate(&self, place: &PlaceName) -> Result<Option<Coordinates>, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct NominatimHit {
    lat: String,
    lon: String,
}

/// First hit of a Nominatim `format=json` search
pub fn parse_nominatim_body(body: &str) -> Result<Option<Coordinates>, GeocodeError> {
    let hits: Vec<NominatimHit> =
        serde_json::from_str(body).map_err(|e| GeocodeError::Malformed(e.to_string()))?;

    let Some(hit) = hits.first() else {
        return Ok(None);
    };

    let lat = hit.lat.parse::<f64>().map_err(|e| GeocodeError::Malformed(e.to_string()))?;
    let lon = hit.lon.parse::<f64>().map_err(|e| GeocodeError::Malformed(e.to_string()))?;
    let coordinates = Coordinates::new(lat, lon);

    if coordinates.is_valid() {
        Ok(Some(coordinates))
    } else {
        Err(GeocodeError::Malformed(format!("coordinates out of range: {}, {}", lat, lon)))
    }
}

pub struct NominatimGeocoder {
    url: String,
    country: String,
    client: reqwest::Client,
}

impl NominatimGeocoder {
    pub fn new(url: &str, user_agent: &str, country: &str, timeout: Duration) -> anyhow::Result<Self> {
        // Nominatim's usage policy requires an identifying User-Agent
        let client = reqwest::Client::builder().timeout(timeout).user_agent(user_agent).build()?;
        Ok(Self { url: url.to_string(), country: country.to_string(), client })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            config.geocoder_url(),
            config.geocoder_user_agent(),
            config.geocoder_country(),
            Duration::from_millis(config.geocoder_timeout_ms()),
        )
    }

    fn query(&self, place: &PlaceName) -> String {
        if self.country.is_empty() {
            place.to_string()
        } else {
            format!("{}, {}", place, self.country)
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn locate(&self, place: &PlaceName) -> Result<Option<Coordinates>, GeocodeError> {
        let query = self.query(place);
        debug!(query = %query, "nominatim_request");

        let response = self
            .client
            .get(&self.url)
            .query(&[("q", query.as_str()), ("format", "json"), ("limit", "1")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_nominatim_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_hit() {
        let body = r#"[{"place_id":1,"lat":"46.0711","lon":"13.2346","display_name":"Udine"},{"lat":"0","lon":"0"}]"#;
        assert_eq!(parse_nominatim_body(body).unwrap(), Some(Coordinates::new(46.0711, 13.2346)));
    }

    #[test]
    fn test_parse_no_hits() {
        assert_eq!(parse_nominatim_body("[]").unwrap(), None);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(parse_nominatim_body("{}"), Err(GeocodeError::Malformed(_))));
        assert!(matches!(
            parse_nominatim_body(r#"[{"lat":"north","lon":"13.2"}]"#),
            Err(GeocodeError::Malformed(_))
        ));
        assert!(matches!(
            parse_nominatim_body(r#"[{"lat":"123.0","lon":"13.2"}]"#),
            Err(GeocodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_query_appends_country() {
        let geocoder = NominatimGeocoder::new(
            "https://nominatim.example/search",
            "test-agent",
            "Italia",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(geocoder.query(&PlaceName::new("Basiliano").unwrap()), "BASILIANO, Italia");
    }
}
