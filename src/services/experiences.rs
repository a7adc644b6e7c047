use std::collections::HashMap;

use chrono::Utc;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    db::DbPool,
    error::AppError,
    models::{
        coords::Coordinates,
        experience::{Author, Experience, ExperienceImage, ExperienceWithDetails, ImageRef},
    },
    services::check_owner,
};

const EXPERIENCE_SELECT: &str = r#"
    SELECT e.id, e.user_id, e.title, e.description, e.location_name, e.lat, e.lng,
           e.address, e.created_at, u.name AS author_name, u.image AS author_image
    FROM experiences e
    JOIN users u ON u.id = e.user_id
"#;

/// Validated content of an experience post.
#[derive(Debug, Clone)]
pub struct ExperienceDraft {
    pub title: String,
    pub description: String,
    pub location_name: String,
    pub coords: Coordinates,
    pub address: Option<String>,
    pub images: Vec<ImageRef>,
}

impl ExperienceDraft {
    pub fn new(
        title: &str,
        description: &str,
        location_name: &str,
        coords: Coordinates,
        address: Option<String>,
        images: Vec<ImageRef>,
    ) -> Result<Self, AppError> {
        let (title, description, location_name) =
            (title.trim(), description.trim(), location_name.trim());
        if title.is_empty() || description.is_empty() || location_name.is_empty() {
            return Err(AppError::validation("all required fields must be filled"));
        }
        Ok(Self {
            title: title.to_string(),
            description: description.to_string(),
            location_name: location_name.to_string(),
            coords,
            address: address
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            images,
        })
    }

    /// Form flavour: coordinates arrive as text and images as a JSON array.
    pub fn from_form(
        title: &str,
        description: &str,
        location_name: &str,
        lat: &str,
        lng: &str,
        address: Option<String>,
        images_json: Option<&str>,
    ) -> Result<Self, AppError> {
        let coords = Coordinates::parse(lat, lng)?;
        let images = parse_images(images_json);
        Self::new(title, description, location_name, coords, address, images)
    }
}

/// A malformed image list is dropped, not fatal; the post itself still saves.
pub fn parse_images(raw: Option<&str>) -> Vec<ImageRef> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<ImageRef>>(raw) {
        Ok(images) => images,
        Err(err) => {
            warn!("ignoring unparsable image list: {err}");
            Vec::new()
        }
    }
}

#[derive(FromRow)]
struct ExperienceRow {
    #[sqlx(flatten)]
    experience: Experience,
    author_name: Option<String>,
    author_image: Option<String>,
}

pub async fn create_experience(
    db: &DbPool,
    user: &AuthenticatedUser,
    draft: ExperienceDraft,
) -> Result<ExperienceWithDetails, AppError> {
    let id = Uuid::new_v4().to_string();
    let mut tx = db.begin().await?;
    sqlx::query(
        "INSERT INTO experiences
           (id, user_id, title, description, location_name, lat, lng, address, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&user.id)
    .bind(&draft.title)
    .bind(&draft.description)
    .bind(&draft.location_name)
    .bind(draft.coords.lat)
    .bind(draft.coords.lng)
    .bind(&draft.address)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    insert_images(&mut tx, &id, &draft.images).await?;
    tx.commit().await?;

    info!("user {} shared experience {id}", user.id);
    get_experience(db, &id).await
}

/// Public feed, newest first.
pub async fn list_experiences(db: &DbPool) -> Result<Vec<ExperienceWithDetails>, AppError> {
    let rows = sqlx::query_as::<_, ExperienceRow>(&format!(
        "{EXPERIENCE_SELECT} ORDER BY e.created_at DESC"
    ))
    .fetch_all(db)
    .await?;
    attach_images(db, rows).await
}

/// The newest `limit` posts of the feed.
pub async fn list_recent_experiences(
    db: &DbPool,
    limit: i64,
) -> Result<Vec<ExperienceWithDetails>, AppError> {
    let rows = sqlx::query_as::<_, ExperienceRow>(&format!(
        "{EXPERIENCE_SELECT} ORDER BY e.created_at DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(db)
    .await?;
    attach_images(db, rows).await
}

pub async fn list_user_experiences(
    db: &DbPool,
    user: &AuthenticatedUser,
) -> Result<Vec<ExperienceWithDetails>, AppError> {
    let rows = sqlx::query_as::<_, ExperienceRow>(&format!(
        "{EXPERIENCE_SELECT} WHERE e.user_id = ? ORDER BY e.created_at DESC"
    ))
    .bind(&user.id)
    .fetch_all(db)
    .await?;
    attach_images(db, rows).await
}

pub async fn get_experience(
    db: &DbPool,
    experience_id: &str,
) -> Result<ExperienceWithDetails, AppError> {
    let row = sqlx::query_as::<_, ExperienceRow>(&format!("{EXPERIENCE_SELECT} WHERE e.id = ?"))
        .bind(experience_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound)?;
    let mut details = attach_images(db, vec![row]).await?;
    details.pop().ok_or(AppError::NotFound)
}

async fn experience_owner(db: &DbPool, experience_id: &str) -> Result<Option<String>, AppError> {
    let owner = sqlx::query_scalar("SELECT user_id FROM experiences WHERE id = ?")
        .bind(experience_id)
        .fetch_optional(db)
        .await?;
    Ok(owner)
}

pub async fn get_owned_experience(
    db: &DbPool,
    user: &AuthenticatedUser,
    experience_id: &str,
) -> Result<ExperienceWithDetails, AppError> {
    let owner = experience_owner(db, experience_id).await?;
    check_owner("experience", experience_id, owner, user)?;
    get_experience(db, experience_id).await
}

/// Rewrites the post. Images are replaced wholesale, never merged.
pub async fn update_experience(
    db: &DbPool,
    user: &AuthenticatedUser,
    experience_id: &str,
    draft: ExperienceDraft,
) -> Result<ExperienceWithDetails, AppError> {
    let owner = experience_owner(db, experience_id).await?;
    check_owner("experience", experience_id, owner, user)?;

    let mut tx = db.begin().await?;
    sqlx::query("DELETE FROM experience_images WHERE experience_id = ?")
        .bind(experience_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "UPDATE experiences
         SET title = ?, description = ?, location_name = ?, lat = ?, lng = ?, address = ?
         WHERE id = ? AND user_id = ?",
    )
    .bind(&draft.title)
    .bind(&draft.description)
    .bind(&draft.location_name)
    .bind(draft.coords.lat)
    .bind(draft.coords.lng)
    .bind(&draft.address)
    .bind(experience_id)
    .bind(&user.id)
    .execute(&mut *tx)
    .await?;
    insert_images(&mut tx, experience_id, &draft.images).await?;
    tx.commit().await?;

    info!("user {} updated experience {experience_id}", user.id);
    get_experience(db, experience_id).await
}

/// Deletes the post; images cascade.
pub async fn delete_experience(
    db: &DbPool,
    user: &AuthenticatedUser,
    experience_id: &str,
) -> Result<(), AppError> {
    let owner = experience_owner(db, experience_id).await?;
    check_owner("experience", experience_id, owner, user)?;
    sqlx::query("DELETE FROM experiences WHERE id = ? AND user_id = ?")
        .bind(experience_id)
        .bind(&user.id)
        .execute(db)
        .await?;
    info!("user {} deleted experience {experience_id}", user.id);
    Ok(())
}

async fn insert_images(
    conn: &mut SqliteConnection,
    experience_id: &str,
    images: &[ImageRef],
) -> Result<(), AppError> {
    for image in images {
        sqlx::query("INSERT INTO experience_images (id, experience_id, url, key) VALUES (?, ?, ?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(experience_id)
            .bind(&image.url)
            .bind(&image.key)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn attach_images(
    db: &DbPool,
    rows: Vec<ExperienceRow>,
) -> Result<Vec<ExperienceWithDetails>, AppError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, experience_id, url, key FROM experience_images WHERE experience_id IN (",
    );
    let mut ids = query.separated(", ");
    for row in &rows {
        ids.push_bind(row.experience.id.clone());
    }
    ids.push_unseparated(") ORDER BY rowid");

    let images = query
        .build_query_as::<ExperienceImage>()
        .fetch_all(db)
        .await?;
    let mut by_experience: HashMap<String, Vec<ExperienceImage>> = HashMap::new();
    for image in images {
        by_experience
            .entry(image.experience_id.clone())
            .or_default()
            .push(image);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let images = by_experience
                .remove(&row.experience.id)
                .unwrap_or_default();
            ExperienceWithDetails {
                experience: row.experience,
                user: Author {
                    name: row.author_name,
                    image: row.author_image,
                },
                images,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_image_list() {
        let images = parse_images(Some(r#"[{"url": "https://cdn/x.jpg", "key": "x"}]"#));
        assert_eq!(
            images,
            vec![ImageRef {
                url: "https://cdn/x.jpg".into(),
                key: "x".into()
            }]
        );
    }

    #[test]
    fn malformed_image_list_is_dropped() {
        assert!(parse_images(Some("not json")).is_empty());
        assert!(parse_images(Some("  ")).is_empty());
        assert!(parse_images(None).is_empty());
    }

    #[test]
    fn draft_requires_text_fields() {
        let err = ExperienceDraft::from_form("", "desc", "Rome", "41.9", "12.5", None, None);
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn draft_rejects_invalid_coordinates() {
        let err = ExperienceDraft::from_form("t", "d", "Rome", "abc", "12.5", None, None);
        assert!(matches!(err, Err(AppError::Validation(_))));
        let err = ExperienceDraft::from_form("t", "d", "Rome", "95", "12.5", None, None);
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn blank_address_becomes_none() {
        let draft =
            ExperienceDraft::from_form("t", "d", "Rome", "41.9", "12.5", Some(" ".into()), None)
                .unwrap();
        assert_eq!(draft.address, None);
    }
}
