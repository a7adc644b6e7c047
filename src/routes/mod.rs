pub mod api;
pub mod experiences;
pub mod public;
pub mod trips;

use axum::Router;
use chrono::{DateTime, Local, NaiveDate, Utc};
use tower_http::services::ServeDir;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let static_root = state.config.static_root.clone();
    Router::new()
        .merge(public::router())
        .nest("/trips", trips::router())
        .nest("/experiences", experiences::router())
        .nest("/api", api::router())
        .nest_service("/static", ServeDir::new(static_root))
        .with_state(state)
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format("%d.%m.%Y %H:%M")
        .to_string()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

fn format_coords(lat: f64, lng: f64) -> String {
    format!("{lat:.4}, {lng:.4}")
}
