use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One itinerary stop. `order` is the zero-based position within its trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Location {
    pub id: String,
    pub trip_id: String,
    pub location_title: String,
    pub lat: f64,
    pub lng: f64,
    pub order: i64,
    pub created_at: DateTime<Utc>,
}
