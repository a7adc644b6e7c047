use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Experience {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub location_name: String,
    pub lat: f64,
    pub lng: f64,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ExperienceImage {
    pub id: String,
    pub experience_id: String,
    pub url: String,
    pub key: String,
}

/// An uploaded image reference as submitted by a form; storage happens elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceWithDetails {
    #[serde(flatten)]
    pub experience: Experience,
    pub user: Author,
    pub images: Vec<ExperienceImage>,
}
