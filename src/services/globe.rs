use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::debug;

use crate::{
    auth::AuthenticatedUser, db::DbPool, error::AppError, services::geocoding::Geocoder,
};

/// A pin on the travel globe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitedLocation {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub country: String,
}

#[derive(FromRow)]
struct LocationWithTrip {
    trip_title: String,
    lat: f64,
    lng: f64,
}

/// Every stop across the user's trips, each labelled with its country. Lookups
/// that find nothing fall back to "Unknown" so every stop is still counted.
pub async fn visited_locations(
    db: &DbPool,
    geocoder: &dyn Geocoder,
    user: &AuthenticatedUser,
) -> Result<Vec<VisitedLocation>, AppError> {
    let rows = sqlx::query_as::<_, LocationWithTrip>(
        r#"
        SELECT t.title AS trip_title, l.lat, l.lng
        FROM locations l
        JOIN trips t ON t.id = l.trip_id
        WHERE t.user_id = ?
        ORDER BY t.start_date, l."order"
        "#,
    )
    .bind(&user.id)
    .fetch_all(db)
    .await?;

    let mut visited = Vec::with_capacity(rows.len());
    for row in rows {
        let lookup = geocoder.country_from_coords(row.lat, row.lng).await?;
        visited.push(VisitedLocation {
            name: format!("{} - {}", row.trip_title, lookup.formatted_address),
            lat: row.lat,
            lng: row.lng,
            country: lookup.country,
        });
    }
    debug!("resolved {} globe locations for user {}", visited.len(), user.id);
    Ok(visited)
}

pub fn visited_countries(locations: &[VisitedLocation]) -> BTreeSet<String> {
    locations
        .iter()
        .map(|location| location.country.clone())
        .collect()
}
