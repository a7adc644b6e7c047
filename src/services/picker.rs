//! Location picking: place search, map click, or device position.
//!
//! Whatever mode was used last wins outright. The address is only a display
//! hint; what gets submitted is the coordinate pair. The browser drives the
//! interactive picks; the server seeds the picker from a stored position when
//! rendering an edit form.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{error::AppError, models::coords::Coordinates, services::geocoding::Geocoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickSource {
    Search,
    MapClick,
    DeviceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickedLocation {
    pub coords: Coordinates,
    pub address: Option<String>,
    pub location_name: Option<String>,
    pub source: PickSource,
}

/// A places-autocomplete suggestion. `geometry` is absent when the user hit
/// Enter on raw text instead of choosing a suggestion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceSuggestion {
    pub name: Option<String>,
    pub formatted_address: Option<String>,
    pub geometry: Option<Coordinates>,
}

#[derive(Debug, Clone, Default)]
pub struct LocationPicker {
    selected: Option<PickedLocation>,
}

impl LocationPicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a previously stored position, e.g. when editing.
    pub fn with_initial(coords: Coordinates, address: Option<String>) -> Self {
        Self {
            selected: Some(PickedLocation {
                coords,
                address,
                location_name: None,
                source: PickSource::Search,
            }),
        }
    }

    pub fn selected(&self) -> Option<&PickedLocation> {
        self.selected.as_ref()
    }

    /// The value a form submits.
    pub fn submission(&self) -> Option<Coordinates> {
        self.selected.as_ref().map(|picked| picked.coords)
    }

    /// Accepts a concrete suggestion only. Returns whether the pick changed.
    pub fn select_suggestion(&mut self, suggestion: Option<PlaceSuggestion>) -> bool {
        let Some(suggestion) = suggestion else {
            return false;
        };
        let Some(coords) = suggestion.geometry else {
            return false;
        };
        let Ok(coords) = Coordinates::new(coords.lat, coords.lng) else {
            return false;
        };
        self.selected = Some(PickedLocation {
            coords,
            address: suggestion.formatted_address,
            location_name: suggestion.name,
            source: PickSource::Search,
        });
        true
    }

    pub async fn click_map(
        &mut self,
        lat: f64,
        lng: f64,
        geocoder: &dyn Geocoder,
    ) -> Result<&PickedLocation, AppError> {
        self.pick_with_reverse_lookup(lat, lng, PickSource::MapClick, geocoder)
            .await
    }

    pub async fn use_device_location(
        &mut self,
        lat: f64,
        lng: f64,
        geocoder: &dyn Geocoder,
    ) -> Result<&PickedLocation, AppError> {
        self.pick_with_reverse_lookup(lat, lng, PickSource::DeviceLocation, geocoder)
            .await
    }

    /// Only invalid coordinates fail; a lookup failure just leaves the address empty.
    async fn pick_with_reverse_lookup(
        &mut self,
        lat: f64,
        lng: f64,
        source: PickSource,
        geocoder: &dyn Geocoder,
    ) -> Result<&PickedLocation, AppError> {
        let coords = Coordinates::new(lat, lng)?;
        let address = match geocoder.reverse_geocode(coords.lat, coords.lng).await {
            Ok(address) => address,
            Err(err) => {
                warn!("reverse geocoding failed for {lat},{lng}: {err}");
                None
            }
        };
        let picked = self.selected.insert(PickedLocation {
            coords,
            address,
            location_name: None,
            source,
        });
        Ok(&*picked)
    }
}
