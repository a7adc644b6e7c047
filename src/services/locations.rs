use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{coords::Coordinates, location::Location},
};

const LOCATION_COLUMNS: &str =
    r#"id, trip_id, location_title, lat, lng, "order", created_at"#;

/// Persistence for itinerary stops. `create` stores the `order` it is given;
/// `append` numbers the new stop from the trip's current count.
#[derive(Clone)]
pub struct LocationStore {
    db: DbPool,
}

impl LocationStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn count_by_trip(&self, trip_id: &str) -> Result<i64, AppError> {
        let mut conn = self.db.acquire().await?;
        count_in(&mut conn, trip_id).await
    }

    pub async fn create(
        &self,
        trip_id: &str,
        title: &str,
        coords: Coordinates,
        order: i64,
    ) -> Result<Location, AppError> {
        let mut conn = self.db.acquire().await?;
        insert_in(&mut conn, trip_id, title, coords, order).await
    }

    /// Inserts a stop at the end of the trip. The order is computed by the
    /// insert itself, so SQLite takes the write lock before counting and
    /// concurrent appends queue up instead of failing.
    pub async fn append(
        &self,
        trip_id: &str,
        title: &str,
        coords: Coordinates,
    ) -> Result<Location, AppError> {
        let location = sqlx::query_as::<_, Location>(&format!(
            r#"INSERT INTO locations ({LOCATION_COLUMNS})
               VALUES (?, ?, ?, ?, ?, (SELECT COUNT(*) FROM locations WHERE trip_id = ?), ?)
               RETURNING {LOCATION_COLUMNS}"#
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(trip_id)
        .bind(title)
        .bind(coords.lat)
        .bind(coords.lng)
        .bind(trip_id)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;
        Ok(location)
    }

    pub async fn list_by_trip(&self, trip_id: &str) -> Result<Vec<Location>, AppError> {
        let locations = sqlx::query_as::<_, Location>(&format!(
            r#"SELECT {LOCATION_COLUMNS} FROM locations WHERE trip_id = ? ORDER BY "order" ASC"#
        ))
        .bind(trip_id)
        .fetch_all(&self.db)
        .await?;
        Ok(locations)
    }

    /// Applies `(location id, new order)` pairs in one transaction. Any id that
    /// does not belong to `trip_id` aborts the whole batch.
    pub async fn update_order(
        &self,
        trip_id: &str,
        mapping: &[(String, i64)],
    ) -> Result<(), AppError> {
        let mut tx = self.db.begin().await?;
        for (location_id, order) in mapping {
            let result =
                sqlx::query(r#"UPDATE locations SET "order" = ? WHERE id = ? AND trip_id = ?"#)
                    .bind(order)
                    .bind(location_id)
                    .bind(trip_id)
                    .execute(&mut *tx)
                    .await?;
            if result.rows_affected() == 0 {
                debug!("reorder of trip {trip_id} hit unknown location {location_id}");
                return Err(AppError::NotFound);
            }
        }
        tx.commit().await?;
        info!("reordered {} locations of trip {trip_id}", mapping.len());
        Ok(())
    }

    /// Removes one stop and closes the gap it leaves behind.
    pub async fn delete(&self, trip_id: &str, location_id: &str) -> Result<(), AppError> {
        let mut tx = self.db.begin().await?;
        let removed: Option<i64> = sqlx::query_scalar(
            r#"DELETE FROM locations WHERE id = ? AND trip_id = ? RETURNING "order""#,
        )
        .bind(location_id)
        .bind(trip_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(removed) = removed else {
            return Err(AppError::NotFound);
        };
        sqlx::query(r#"UPDATE locations SET "order" = "order" - 1 WHERE trip_id = ? AND "order" > ?"#)
            .bind(trip_id)
            .bind(removed)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!("removed location {location_id} from trip {trip_id}");
        Ok(())
    }
}

async fn count_in(conn: &mut SqliteConnection, trip_id: &str) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM locations WHERE trip_id = ?")
        .bind(trip_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

async fn insert_in(
    conn: &mut SqliteConnection,
    trip_id: &str,
    title: &str,
    coords: Coordinates,
    order: i64,
) -> Result<Location, AppError> {
    let location = sqlx::query_as::<_, Location>(&format!(
        r#"INSERT INTO locations ({LOCATION_COLUMNS})
           VALUES (?, ?, ?, ?, ?, ?, ?)
           RETURNING {LOCATION_COLUMNS}"#
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(trip_id)
    .bind(title)
    .bind(coords.lat)
    .bind(coords.lng)
    .bind(order)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;
    Ok(location)
}
