//! Geocoding gateway.
//!
//! Translates coordinates into human readable addresses (and back) through the
//! Google Geocoding API. Empty answers are ordinary values; only transport and
//! decoding failures surface as errors. Nothing is cached, so every call is one
//! outbound request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::{error::AppError, models::coords::Coordinates};

pub const UNKNOWN_COUNTRY: &str = "Unknown";
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

const USER_AGENT: &str = concat!("wayfare/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryLookup {
    pub country: String,
    pub formatted_address: String,
}

impl CountryLookup {
    pub fn unknown() -> Self {
        Self {
            country: UNKNOWN_COUNTRY.to_string(),
            formatted_address: UNKNOWN_LOCATION.to_string(),
        }
    }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Formatted address of the best match, `None` when the service has nothing.
    async fn reverse_geocode(&self, lat: f64, lng: f64) -> Result<Option<String>, AppError>;

    /// Country and formatted address; falls back to the "Unknown" pair.
    async fn country_from_coords(&self, lat: f64, lng: f64) -> Result<CountryLookup, AppError>;

    /// Resolves free text to coordinates, `None` when nothing matches.
    async fn geocode_address(&self, address: &str) -> Result<Option<Coordinates>, AppError>;
}

/// Wire shape of a Google Geocoding API answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeocodeResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub results: Vec<GeocodeResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeocodeResult {
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub address_components: Vec<AddressComponent>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressComponent {
    pub long_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl GeocodeResponse {
    fn is_ok(&self) -> bool {
        self.status == "OK"
    }

    fn first(&self) -> Option<&GeocodeResult> {
        if self.is_ok() {
            self.results.first()
        } else {
            None
        }
    }

    pub fn formatted_address(&self) -> Option<String> {
        self.first()
            .and_then(|result| result.formatted_address.clone())
            .filter(|address| !address.is_empty())
    }

    pub fn country_lookup(&self) -> CountryLookup {
        // The country lookup only cares about having results, not the status
        // string, so partially degraded answers still yield a country.
        let Some(result) = self.results.first() else {
            return CountryLookup::unknown();
        };

        let country = result
            .address_components
            .iter()
            .find(|component| component.types.iter().any(|kind| kind == "country"))
            .map(|component| component.long_name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string());

        let formatted_address = result
            .formatted_address
            .clone()
            .filter(|address| !address.is_empty())
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());

        CountryLookup {
            country,
            formatted_address,
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        let location = self.first()?.geometry.as_ref()?.location;
        Coordinates::new(location.lat, location.lng).ok()
    }
}

#[derive(Debug, Clone)]
pub struct GoogleGeocoder {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl GoogleGeocoder {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| AppError::Config(format!("invalid geocoding url: {err}")))?;
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn request_url(&self, param: &str, value: &str) -> Result<Url, AppError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("geocoding API key not configured".into()))?;
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair(param, value)
            .append_pair("key", key);
        Ok(url)
    }

    async fn fetch(&self, url: Url) -> Result<GeocodeResponse, AppError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("geocoding service answered with HTTP {status}");
            return Ok(GeocodeResponse::default());
        }
        let body: GeocodeResponse = response.json().await?;
        if !body.is_ok() {
            debug!("geocoding status {}", body.status);
        }
        Ok(body)
    }

    async fn fetch_latlng(&self, lat: f64, lng: f64) -> Result<GeocodeResponse, AppError> {
        let url = self.request_url("latlng", &format!("{lat},{lng}"))?;
        self.fetch(url).await
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn reverse_geocode(&self, lat: f64, lng: f64) -> Result<Option<String>, AppError> {
        Ok(self.fetch_latlng(lat, lng).await?.formatted_address())
    }

    async fn country_from_coords(&self, lat: f64, lng: f64) -> Result<CountryLookup, AppError> {
        if self.api_key.is_none() {
            warn!("no geocoding API key, labelling {lat},{lng} as unknown");
            return Ok(CountryLookup::unknown());
        }
        Ok(self.fetch_latlng(lat, lng).await?.country_lookup())
    }

    async fn geocode_address(&self, address: &str) -> Result<Option<Coordinates>, AppError> {
        let url = self.request_url("address", address)?;
        Ok(self.fetch(url).await?.coordinates())
    }
}
