use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::State,
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;

use crate::{
    auth::{self, CurrentUser},
    error::AppError,
    services::experiences,
    state::AppState,
};

const LANDING_FEED_SIZE: i64 = 6;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route("/logout", post(logout))
}

struct RecentExperience {
    id: String,
    title: String,
    location_name: String,
}

#[derive(Template)]
#[template(path = "landing.html")]
struct LandingTemplate {
    logged_in: bool,
    display_name: String,
    recent: Vec<RecentExperience>,
}

async fn landing(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let recent = experiences::list_recent_experiences(&state.db, LANDING_FEED_SIZE)
        .await?
        .into_iter()
        .map(|item| RecentExperience {
            id: item.experience.id,
            title: item.experience.title,
            location_name: item.experience.location_name,
        })
        .collect();

    Ok(AskamaTemplateResponse::into_response(LandingTemplate {
        logged_in: current.0.is_some(),
        display_name: current
            .0
            .as_ref()
            .map(|user| user.display_name().to_string())
            .unwrap_or_default(),
        recent,
    }))
}

async fn logout(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Redirect), AppError> {
    if let Some(cookie) = jar.get(auth::SESSION_COOKIE) {
        auth::destroy_session(&state.db, cookie.value()).await?;
    }
    Ok((auth::clear_session_cookie(jar), Redirect::to("/")))
}
