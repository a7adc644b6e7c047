use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::Local;
use serde::Deserialize;
use serde_with::{serde_as, NoneAsEmptyString};

use super::{format_coords, format_date, normalize_optional};
use crate::{
    auth::{AuthenticatedUser, CurrentUser},
    error::AppError,
    models::{
        coords::Coordinates,
        trip::{Trip, TripDraft},
    },
    services::{itinerary, trips},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(trips_list))
        .route("/new", get(trip_new_form).post(trip_new_submit))
        .route("/:id", get(trip_detail))
        .route("/:id/edit", get(trip_edit_form).post(trip_edit_submit))
        .route("/:id/delete", post(trip_delete))
        .route("/:id/locations", post(location_add))
        .route("/:id/locations/:location_id/delete", post(location_delete))
        .route("/:id/itinerary", post(itinerary_move))
}

struct TripSummary {
    id: String,
    title: String,
    dates: String,
}

#[derive(Template)]
#[template(path = "trips/list.html")]
struct TripsListTemplate {
    display_name: String,
    trip_count: usize,
    upcoming_count: usize,
    trips: Vec<TripSummary>,
}

async fn trips_list(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let items = trips::list_trips(&state.db, user).await?;
    let upcoming_count = trips::count_upcoming(&items, Local::now().date_naive());
    let summaries = items
        .iter()
        .map(|trip| TripSummary {
            id: trip.id.clone(),
            title: trip.title.clone(),
            dates: trip_dates(trip),
        })
        .collect();
    Ok(AskamaTemplateResponse::into_response(TripsListTemplate {
        display_name: user.display_name().to_string(),
        trip_count: items.len(),
        upcoming_count,
        trips: summaries,
    }))
}

#[derive(Template, Default)]
#[template(path = "trips/form.html")]
struct TripFormTemplate {
    heading: String,
    action: String,
    show_error: bool,
    error_message: String,
    title: String,
    description: String,
    start_date: String,
    end_date: String,
    image_url: String,
}

impl TripFormTemplate {
    fn for_new() -> Self {
        Self {
            heading: "Plan a new trip".into(),
            action: "/trips/new".into(),
            ..Default::default()
        }
    }

    fn for_trip(trip: &Trip) -> Self {
        Self {
            heading: format!("Edit {}", trip.title),
            action: format!("/trips/{}/edit", trip.id),
            title: trip.title.clone(),
            description: trip.description.clone(),
            start_date: trip.start_date.to_string(),
            end_date: trip.end_date.to_string(),
            image_url: trip.image_url.clone().unwrap_or_default(),
            ..Default::default()
        }
    }

    fn with_input(mut self, form: TripForm, message: String) -> Self {
        self.show_error = true;
        self.error_message = message;
        self.title = form.title;
        self.description = form.description;
        self.start_date = form.start_date;
        self.end_date = form.end_date;
        self.image_url = form.image_url.unwrap_or_default();
        self
    }
}

#[serde_as]
#[derive(Deserialize)]
struct TripForm {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    start_date: String,
    #[serde(default)]
    end_date: String,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    image_url: Option<String>,
}

impl TripForm {
    fn draft(&self) -> Result<TripDraft, AppError> {
        TripDraft::parse(
            &self.title,
            &self.description,
            &self.start_date,
            &self.end_date,
            self.image_url.clone(),
        )
    }
}

fn render_form_error(template: TripFormTemplate) -> Response {
    (
        StatusCode::BAD_REQUEST,
        AskamaTemplateResponse::into_response(template),
    )
        .into_response()
}

async fn trip_new_form(current: CurrentUser) -> Result<impl IntoResponse, AppError> {
    current.require_user()?;
    Ok(AskamaTemplateResponse::into_response(
        TripFormTemplate::for_new(),
    ))
}

async fn trip_new_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<TripForm>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    let draft = match form.draft() {
        Ok(draft) => draft,
        Err(AppError::Validation(msg)) => {
            return Ok(render_form_error(
                TripFormTemplate::for_new().with_input(form, msg),
            ))
        }
        Err(err) => return Err(err),
    };
    let trip = trips::create_trip(&state.db, user, draft).await?;
    Ok(Redirect::to(&format!("/trips/{}", trip.id)).into_response())
}

async fn trip_edit_form(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trip = trips::get_owned_trip(&state.db, user, &trip_id).await?;
    Ok(AskamaTemplateResponse::into_response(
        TripFormTemplate::for_trip(&trip),
    ))
}

async fn trip_edit_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    Form(form): Form<TripForm>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    let draft = match form.draft() {
        Ok(draft) => draft,
        Err(AppError::Validation(msg)) => {
            let trip = trips::get_owned_trip(&state.db, user, &trip_id).await?;
            return Ok(render_form_error(
                TripFormTemplate::for_trip(&trip).with_input(form, msg),
            ));
        }
        Err(err) => return Err(err),
    };
    trips::update_trip(&state.db, user, &trip_id, draft).await?;
    Ok(Redirect::to(&format!("/trips/{trip_id}")).into_response())
}

async fn trip_delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    trips::delete_trip(&state.db, user, &trip_id).await?;
    Ok(Redirect::to("/trips"))
}

struct ItineraryStop {
    id: String,
    index: i64,
    position: i64,
    title: String,
    coords: String,
    is_first: bool,
    is_last: bool,
}

#[derive(Template)]
#[template(path = "trips/detail.html")]
struct TripDetailTemplate {
    id: String,
    title: String,
    description: String,
    dates: String,
    image_url: String,
    stops: Vec<ItineraryStop>,
    show_error: bool,
    error_message: String,
}

async fn render_trip_detail(
    state: &AppState,
    user: &AuthenticatedUser,
    trip_id: &str,
    error: Option<String>,
) -> Result<Response, AppError> {
    let trip = trips::get_owned_trip(&state.db, user, trip_id).await?;
    let locations = state.locations.list_by_trip(trip_id).await?;
    let last = locations.len().saturating_sub(1);
    let stops = locations
        .into_iter()
        .enumerate()
        .map(|(index, location)| ItineraryStop {
            coords: format_coords(location.lat, location.lng),
            id: location.id,
            index: index as i64,
            position: location.order + 1,
            title: location.location_title,
            is_first: index == 0,
            is_last: index == last,
        })
        .collect();

    let status = if error.is_some() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    let template = TripDetailTemplate {
        dates: trip_dates(&trip),
        id: trip.id,
        title: trip.title,
        description: trip.description,
        image_url: trip.image_url.unwrap_or_default(),
        stops,
        show_error: error.is_some(),
        error_message: error.unwrap_or_default(),
    };
    Ok((status, AskamaTemplateResponse::into_response(template)).into_response())
}

async fn trip_detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    render_trip_detail(&state, user, &trip_id, None).await
}

#[serde_as]
#[derive(Deserialize)]
struct LocationForm {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    location_title: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    lat: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    lng: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    address: Option<String>,
}

async fn location_add(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    Form(form): Form<LocationForm>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    trips::ensure_trip_owner(&state.db, user, &trip_id).await?;

    let title = normalize_optional(form.location_title);
    let address = normalize_optional(form.address);
    let result = match (form.lat, form.lng) {
        (Some(lat), Some(lng)) => match Coordinates::parse(&lat, &lng) {
            Ok(coords) => {
                let title = title.or(address).unwrap_or_default();
                itinerary::append_location(
                    &state.locations,
                    &trip_id,
                    &title,
                    coords.lat,
                    coords.lng,
                )
                .await
            }
            Err(err) => Err(err),
        },
        (None, None) => match address {
            Some(address) => {
                itinerary::append_address(
                    &state.locations,
                    state.geocoder.as_ref(),
                    &trip_id,
                    &address,
                )
                .await
            }
            None => Err(AppError::validation("pick a location or enter an address")),
        },
        _ => Err(AppError::validation("both latitude and longitude are required")),
    };

    match result {
        Ok(_) => Ok(Redirect::to(&format!("/trips/{trip_id}")).into_response()),
        Err(AppError::Validation(msg)) => {
            render_trip_detail(&state, user, &trip_id, Some(msg)).await
        }
        Err(err) => Err(err),
    }
}

async fn location_delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, location_id)): Path<(String, String)>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    trips::ensure_trip_owner(&state.db, user, &trip_id).await?;
    state.locations.delete(&trip_id, &location_id).await?;
    Ok(Redirect::to(&format!("/trips/{trip_id}")))
}

#[derive(Deserialize)]
struct MoveForm {
    from: i64,
    to: i64,
}

/// Form fallback for dragging: move one stop from one index to another.
async fn itinerary_move(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    Form(form): Form<MoveForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    trips::ensure_trip_owner(&state.db, user, &trip_id).await?;
    let current_order = state.locations.list_by_trip(&trip_id).await?;
    if let Some(next) = itinerary::move_item(&current_order, form.from, form.to) {
        let ids: Vec<String> = next.into_iter().map(|location| location.id).collect();
        itinerary::reorder(&state.locations, &trip_id, &ids).await?;
    }
    Ok(Redirect::to(&format!("/trips/{trip_id}")))
}

fn trip_dates(trip: &Trip) -> String {
    format!(
        "{} - {}",
        format_date(trip.start_date),
        format_date(trip.end_date)
    )
}
