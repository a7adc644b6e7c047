//! JSON endpoints used by the map, globe and drag-and-drop itinerary.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{coords::Coordinates, experience::ImageRef, location::Location},
    services::{
        experiences::{self, ExperienceDraft},
        globe::{self, VisitedLocation},
        itinerary, trips,
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/geocode", get(reverse_geocode))
        .route("/trips", get(globe_locations))
        .route(
            "/trips/:id/locations",
            get(trip_locations).post(append_location),
        )
        .route("/trips/:id/itinerary", put(reorder_itinerary))
        .route("/experiences", get(list_experiences).post(create_experience))
        .route("/experiences/:id", put(update_experience).delete(delete_experience))
}

#[derive(Deserialize)]
struct GeocodeQuery {
    lat: Option<String>,
    lng: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct GeocodeAnswer {
    pub address: Option<String>,
}

async fn reverse_geocode(
    State(state): State<AppState>,
    Query(query): Query<GeocodeQuery>,
) -> Result<Json<GeocodeAnswer>, AppError> {
    let (Some(lat), Some(lng)) = (query.lat, query.lng) else {
        return Err(AppError::validation("missing lat or lng parameters"));
    };
    let coords = Coordinates::parse(&lat, &lng)?;
    let address = state.geocoder.reverse_geocode(coords.lat, coords.lng).await?;
    Ok(Json(GeocodeAnswer { address }))
}

async fn globe_locations(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<VisitedLocation>>, AppError> {
    let user = current.require_user()?;
    let visited = globe::visited_locations(&state.db, state.geocoder.as_ref(), user).await?;
    Ok(Json(visited))
}

async fn trip_locations(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<Json<Vec<Location>>, AppError> {
    let user = current.require_user()?;
    trips::ensure_trip_owner(&state.db, user, &trip_id).await?;
    Ok(Json(state.locations.list_by_trip(&trip_id).await?))
}

#[derive(Deserialize)]
pub struct NewLocationRequest {
    #[serde(default)]
    pub location_title: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

async fn append_location(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    Json(req): Json<NewLocationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    trips::ensure_trip_owner(&state.db, user, &trip_id).await?;
    let (Some(lat), Some(lng)) = (req.lat, req.lng) else {
        return Err(AppError::validation("lat and lng are required"));
    };
    let location =
        itinerary::append_location(&state.locations, &trip_id, &req.location_title, lat, lng)
            .await?;
    Ok((StatusCode::CREATED, Json(location)))
}

#[derive(Serialize, Deserialize)]
pub struct ReorderRequest {
    pub location_ids: Vec<String>,
}

async fn reorder_itinerary(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    Json(req): Json<ReorderRequest>,
) -> Result<StatusCode, AppError> {
    let user = current.require_user()?;
    trips::ensure_trip_owner(&state.db, user, &trip_id).await?;
    itinerary::reorder(&state.locations, &trip_id, &req.location_ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ExperienceRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location_name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub address: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

impl ExperienceRequest {
    fn into_draft(self) -> Result<ExperienceDraft, AppError> {
        let (Some(lat), Some(lng)) = (self.lat, self.lng) else {
            return Err(AppError::validation("missing required fields"));
        };
        ExperienceDraft::new(
            &self.title,
            &self.description,
            &self.location_name,
            Coordinates::new(lat, lng)?,
            self.address,
            self.images,
        )
    }
}

async fn list_experiences(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(experiences::list_experiences(&state.db).await?))
}

async fn create_experience(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<ExperienceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let created = experiences::create_experience(&state.db, user, req.into_draft()?).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_experience(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(experience_id): Path<String>,
    Json(req): Json<ExperienceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let updated =
        experiences::update_experience(&state.db, user, &experience_id, req.into_draft()?).await?;
    Ok(Json(updated))
}

async fn delete_experience(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(experience_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let user = current.require_user()?;
    experiences::delete_experience(&state.db, user, &experience_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
