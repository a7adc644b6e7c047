use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A validated WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self, AppError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::validation(format!(
                "latitude must be between -90 and 90, got {lat}"
            )));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(AppError::validation(format!(
                "longitude must be between -180 and 180, got {lng}"
            )));
        }
        Ok(Self { lat, lng })
    }

    /// Parses raw form input such as `"48.8566"` / `" 2.3522 "`.
    pub fn parse(lat: &str, lng: &str) -> Result<Self, AppError> {
        let lat = parse_number(lat, "latitude")?;
        let lng = parse_number(lng, "longitude")?;
        Self::new(lat, lng)
    }
}

fn parse_number(raw: &str, field: &str) -> Result<f64, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| AppError::validation(format!("{field} is not a number: {trimmed}")))
}
