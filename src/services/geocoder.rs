//! Address geocoding through a Google-compatible geocode endpoint

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::GeocoderSettings;

#[derive(Clone)]
pub struct GeocoderClient {
    client: Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// First result, `None` for `ZERO_RESULTS`, an error for any other status
fn first_result(response: GeocodeResponse) -> Result<Option<Coordinates>> {
    match response.status.as_str() {
        "OK" => Ok(response.results.into_iter().next().map(|r| Coordinates {
            latitude: r.geometry.location.lat,
            longitude: r.geometry.location.lng,
        })),
        "ZERO_RESULTS" => Ok(None),
        other => bail!(
            "geocoder returned {other}: {}",
            response.error_message.unwrap_or_default()
        ),
    }
}

impl GeocoderClient {
    pub fn new(client: Client, settings: &GeocoderSettings) -> Self {
        Self {
            client,
            url: settings.url.clone(),
            api_key: settings.api_key.clone(),
        }
    }

    /// Look up an address; `Ok(None)` when nothing matched
    #[instrument(skip(self))]
    pub async fn geocode(&self, address: &str) -> Result<Option<Coordinates>> {
        let response: GeocodeResponse = self
            .client
            .get(&self.url)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await
            .context("Geocoding request failed")?
            .error_for_status()
            .map_err(|e| anyhow!("Geocoder returned an error: {e}"))?
            .json()
            .await
            .context("Invalid geocoder response")?;

        let found = first_result(response)?;
        debug!(found = found.is_some(), "Geocoded address");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> GeocodeResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn takes_the_first_result() {
        let response = parse(
            r#"{"status":"OK","results":[
                {"geometry":{"location":{"lat":38.72,"lng":-9.14}}},
                {"geometry":{"location":{"lat":1.0,"lng":2.0}}}
            ]}"#,
        );
        assert_eq!(
            first_result(response).unwrap(),
            Some(Coordinates {
                latitude: 38.72,
                longitude: -9.14
            })
        );
    }

    #[test]
    fn statuses() {
        assert_eq!(first_result(parse(r#"{"status":"ZERO_RESULTS"}"#)).unwrap(), None);
        let err = first_result(parse(
            r#"{"status":"REQUEST_DENIED","error_message":"bad key"}"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("REQUEST_DENIED"));
    }
}
