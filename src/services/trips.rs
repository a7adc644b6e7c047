use chrono::{NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    db::DbPool,
    error::AppError,
    models::trip::{Trip, TripDraft},
    services::check_owner,
};

const TRIP_COLUMNS: &str =
    "id, user_id, title, description, start_date, end_date, image_url, created_at";

impl TripDraft {
    /// Builds a draft from raw form values.
    pub fn parse(
        title: &str,
        description: &str,
        start_date: &str,
        end_date: &str,
        image_url: Option<String>,
    ) -> Result<Self, AppError> {
        let title = title.trim();
        let description = description.trim();
        if title.is_empty() || description.is_empty() {
            return Err(AppError::validation("title and description are required"));
        }
        let start_date = parse_date(start_date, "start date")?;
        let end_date = parse_date(end_date, "end date")?;
        if end_date < start_date {
            return Err(AppError::validation("end date must not be before start date"));
        }
        Ok(Self {
            title: title.to_string(),
            description: description.to_string(),
            start_date,
            end_date,
            image_url: image_url
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
        })
    }
}

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("{field} must be a date (YYYY-MM-DD)")))
}

pub async fn create_trip(
    db: &DbPool,
    user: &AuthenticatedUser,
    draft: TripDraft,
) -> Result<Trip, AppError> {
    let trip = sqlx::query_as::<_, Trip>(&format!(
        "INSERT INTO trips ({TRIP_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {TRIP_COLUMNS}"
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(&user.id)
    .bind(&draft.title)
    .bind(&draft.description)
    .bind(draft.start_date)
    .bind(draft.end_date)
    .bind(&draft.image_url)
    .bind(Utc::now())
    .fetch_one(db)
    .await?;
    info!("user {} created trip {}", user.id, trip.id);
    Ok(trip)
}

/// The user's trips, latest start date first.
pub async fn list_trips(db: &DbPool, user: &AuthenticatedUser) -> Result<Vec<Trip>, AppError> {
    let trips = sqlx::query_as::<_, Trip>(&format!(
        "SELECT {TRIP_COLUMNS} FROM trips WHERE user_id = ? ORDER BY start_date DESC, created_at DESC"
    ))
    .bind(&user.id)
    .fetch_all(db)
    .await?;
    Ok(trips)
}

pub fn count_upcoming(trips: &[Trip], today: NaiveDate) -> usize {
    trips.iter().filter(|trip| trip.start_date >= today).count()
}

async fn trip_owner(db: &DbPool, trip_id: &str) -> Result<Option<String>, AppError> {
    let owner = sqlx::query_scalar("SELECT user_id FROM trips WHERE id = ?")
        .bind(trip_id)
        .fetch_optional(db)
        .await?;
    Ok(owner)
}

/// Fails unless `user` owns the trip. Used before touching its itinerary.
pub async fn ensure_trip_owner(
    db: &DbPool,
    user: &AuthenticatedUser,
    trip_id: &str,
) -> Result<(), AppError> {
    let owner = trip_owner(db, trip_id).await?;
    check_owner("trip", trip_id, owner, user)
}

pub async fn get_owned_trip(
    db: &DbPool,
    user: &AuthenticatedUser,
    trip_id: &str,
) -> Result<Trip, AppError> {
    ensure_trip_owner(db, user, trip_id).await?;
    let trip = sqlx::query_as::<_, Trip>(&format!(
        "SELECT {TRIP_COLUMNS} FROM trips WHERE id = ?"
    ))
    .bind(trip_id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound)?;
    Ok(trip)
}

pub async fn update_trip(
    db: &DbPool,
    user: &AuthenticatedUser,
    trip_id: &str,
    draft: TripDraft,
) -> Result<Trip, AppError> {
    ensure_trip_owner(db, user, trip_id).await?;
    let trip = sqlx::query_as::<_, Trip>(&format!(
        "UPDATE trips
         SET title = ?, description = ?, start_date = ?, end_date = ?, image_url = ?
         WHERE id = ? AND user_id = ?
         RETURNING {TRIP_COLUMNS}"
    ))
    .bind(&draft.title)
    .bind(&draft.description)
    .bind(draft.start_date)
    .bind(draft.end_date)
    .bind(&draft.image_url)
    .bind(trip_id)
    .bind(&user.id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound)?;
    info!("user {} updated trip {trip_id}", user.id);
    Ok(trip)
}

/// Deletes the trip; its locations go with it through the foreign key cascade.
pub async fn delete_trip(
    db: &DbPool,
    user: &AuthenticatedUser,
    trip_id: &str,
) -> Result<(), AppError> {
    ensure_trip_owner(db, user, trip_id).await?;
    sqlx::query("DELETE FROM trips WHERE id = ? AND user_id = ?")
        .bind(trip_id)
        .bind(&user.id)
        .execute(db)
        .await?;
    info!("user {} deleted trip {trip_id}", user.id);
    Ok(())
}
