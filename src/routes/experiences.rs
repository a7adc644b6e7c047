use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use serde_with::{serde_as, NoneAsEmptyString};

use super::{format_coords, format_timestamp};
use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{
        coords::Coordinates,
        experience::{ExperienceWithDetails, ImageRef},
    },
    services::{
        experiences::{self, ExperienceDraft},
        picker::LocationPicker,
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(experiences_list))
        .route("/my", get(my_experiences))
        .route("/new", get(experience_new_form).post(experience_new_submit))
        .route("/:id", get(experience_detail))
        .route(
            "/:id/edit",
            get(experience_edit_form).post(experience_edit_submit),
        )
        .route("/:id/delete", post(experience_delete))
}

struct ExperienceCard {
    id: String,
    title: String,
    location_name: String,
    author: String,
    created_at: String,
    cover_url: String,
    image_count: usize,
}

impl From<ExperienceWithDetails> for ExperienceCard {
    fn from(item: ExperienceWithDetails) -> Self {
        Self {
            cover_url: item
                .images
                .first()
                .map(|image| image.url.clone())
                .unwrap_or_default(),
            image_count: item.images.len(),
            author: item.user.name.unwrap_or_else(|| "Anonymous".into()),
            created_at: format_timestamp(item.experience.created_at),
            id: item.experience.id,
            title: item.experience.title,
            location_name: item.experience.location_name,
        }
    }
}

#[derive(Template)]
#[template(path = "experiences/list.html")]
struct ExperiencesListTemplate {
    heading: String,
    manage: bool,
    experiences: Vec<ExperienceCard>,
}

async fn experiences_list(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let items = experiences::list_experiences(&state.db).await?;
    Ok(AskamaTemplateResponse::into_response(
        ExperiencesListTemplate {
            heading: "Travel experiences".into(),
            manage: false,
            experiences: items.into_iter().map(ExperienceCard::from).collect(),
        },
    ))
}

async fn my_experiences(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let items = experiences::list_user_experiences(&state.db, user).await?;
    Ok(AskamaTemplateResponse::into_response(
        ExperiencesListTemplate {
            heading: "My experiences".into(),
            manage: true,
            experiences: items.into_iter().map(ExperienceCard::from).collect(),
        },
    ))
}

struct ImageView {
    url: String,
}

#[derive(Template)]
#[template(path = "experiences/detail.html")]
struct ExperienceDetailTemplate {
    id: String,
    title: String,
    description: String,
    location_name: String,
    address: String,
    coords: String,
    author: String,
    created_at: String,
    images: Vec<ImageView>,
    is_owner: bool,
}

async fn experience_detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(experience_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let item = experiences::get_experience(&state.db, &experience_id).await?;
    let is_owner = current
        .0
        .as_ref()
        .is_some_and(|user| user.id == item.experience.user_id);
    let experience = item.experience;
    Ok(AskamaTemplateResponse::into_response(
        ExperienceDetailTemplate {
            coords: format_coords(experience.lat, experience.lng),
            created_at: format_timestamp(experience.created_at),
            id: experience.id,
            title: experience.title,
            description: experience.description,
            location_name: experience.location_name,
            address: experience.address.unwrap_or_default(),
            author: item.user.name.unwrap_or_else(|| "Anonymous".into()),
            images: item
                .images
                .into_iter()
                .map(|image| ImageView { url: image.url })
                .collect(),
            is_owner,
        },
    ))
}

#[derive(Template, Default)]
#[template(path = "experiences/form.html")]
struct ExperienceFormTemplate {
    heading: String,
    action: String,
    show_error: bool,
    error_message: String,
    title: String,
    description: String,
    location_name: String,
    lat: String,
    lng: String,
    address: String,
    images: String,
}

impl ExperienceFormTemplate {
    fn for_new() -> Self {
        Self {
            heading: "Share an experience".into(),
            action: "/experiences/new".into(),
            ..Default::default()
        }
    }

    fn for_experience(item: &ExperienceWithDetails) -> Self {
        let experience = &item.experience;
        let images: Vec<_> = item
            .images
            .iter()
            .map(|image| ImageRef {
                url: image.url.clone(),
                key: image.key.clone(),
            })
            .collect();
        let picker = LocationPicker::with_initial(
            Coordinates {
                lat: experience.lat,
                lng: experience.lng,
            },
            experience.address.clone(),
        );
        Self {
            heading: format!("Edit {}", experience.title),
            action: format!("/experiences/{}/edit", experience.id),
            title: experience.title.clone(),
            description: experience.description.clone(),
            location_name: experience.location_name.clone(),
            images: serde_json::to_string(&images).unwrap_or_default(),
            ..Default::default()
        }
        .with_pick(&picker)
    }

    /// Prefills the position fields from the picker's current selection.
    fn with_pick(self, picker: &LocationPicker) -> Self {
        let Some(picked) = picker.selected() else {
            return self;
        };
        Self {
            lat: picked.coords.lat.to_string(),
            lng: picked.coords.lng.to_string(),
            address: picked.address.clone().unwrap_or_default(),
            ..self
        }
    }

    fn with_input(self, form: ExperienceForm, message: String) -> Self {
        Self {
            heading: self.heading,
            action: self.action,
            show_error: true,
            error_message: message,
            title: form.title,
            description: form.description,
            location_name: form.location_name,
            lat: form.lat,
            lng: form.lng,
            address: form.address.unwrap_or_default(),
            images: form.images.unwrap_or_default(),
        }
    }
}

#[serde_as]
#[derive(Deserialize)]
struct ExperienceForm {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    location_name: String,
    #[serde(default)]
    lat: String,
    #[serde(default)]
    lng: String,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    address: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    images: Option<String>,
}

impl ExperienceForm {
    fn draft(&self) -> Result<ExperienceDraft, AppError> {
        ExperienceDraft::from_form(
            &self.title,
            &self.description,
            &self.location_name,
            &self.lat,
            &self.lng,
            self.address.clone(),
            self.images.as_deref(),
        )
    }
}

fn render_form_error(template: ExperienceFormTemplate) -> Response {
    (
        StatusCode::BAD_REQUEST,
        AskamaTemplateResponse::into_response(template),
    )
        .into_response()
}

async fn experience_new_form(current: CurrentUser) -> Result<impl IntoResponse, AppError> {
    current.require_user()?;
    Ok(AskamaTemplateResponse::into_response(
        ExperienceFormTemplate::for_new(),
    ))
}

async fn experience_new_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<ExperienceForm>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    let draft = match form.draft() {
        Ok(draft) => draft,
        Err(AppError::Validation(msg)) => {
            return Ok(render_form_error(
                ExperienceFormTemplate::for_new().with_input(form, msg),
            ))
        }
        Err(err) => return Err(err),
    };
    let created = experiences::create_experience(&state.db, user, draft).await?;
    Ok(Redirect::to(&format!("/experiences/{}", created.experience.id)).into_response())
}

async fn experience_edit_form(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(experience_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let item = experiences::get_owned_experience(&state.db, user, &experience_id).await?;
    Ok(AskamaTemplateResponse::into_response(
        ExperienceFormTemplate::for_experience(&item),
    ))
}

async fn experience_edit_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(experience_id): Path<String>,
    Form(form): Form<ExperienceForm>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    let draft = match form.draft() {
        Ok(draft) => draft,
        Err(AppError::Validation(msg)) => {
            let item = experiences::get_owned_experience(&state.db, user, &experience_id).await?;
            return Ok(render_form_error(
                ExperienceFormTemplate::for_experience(&item).with_input(form, msg),
            ));
        }
        Err(err) => return Err(err),
    };
    experiences::update_experience(&state.db, user, &experience_id, draft).await?;
    Ok(Redirect::to("/experiences/my").into_response())
}

async fn experience_delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(experience_id): Path<String>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    experiences::delete_experience(&state.db, user, &experience_id).await?;
    Ok(Redirect::to("/experiences/my"))
}
