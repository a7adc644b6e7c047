use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::IntoResponse,
    Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use wayfare::{
    auth::{self, AuthenticatedUser},
    config::{AppConfig, DEFAULT_GEOCODING_URL},
    db::{init_pool, run_migrations},
    error::AppError,
    models::{
        coords::Coordinates,
        location::Location,
        trip::{Trip, TripDraft},
    },
    routes::create_router,
    services::{
        experiences::{self, ExperienceDraft},
        geocoding::{CountryLookup, Geocoder},
        trips,
    },
    state::AppState,
};

/// Knows one street in Lisbon and nothing else.
struct LisbonGeocoder;

#[async_trait]
impl Geocoder for LisbonGeocoder {
    async fn reverse_geocode(&self, lat: f64, _lng: f64) -> Result<Option<String>, AppError> {
        Ok((lat > 0.0).then(|| "Rua Augusta, Lisboa, Portugal".to_string()))
    }

    async fn country_from_coords(&self, _: f64, _: f64) -> Result<CountryLookup, AppError> {
        Ok(CountryLookup {
            country: "Portugal".into(),
            formatted_address: "Rua Augusta, Lisboa, Portugal".into(),
        })
    }

    async fn geocode_address(&self, address: &str) -> Result<Option<Coordinates>, AppError> {
        if address.eq_ignore_ascii_case("lisbon") {
            return Ok(Some(Coordinates::new(38.7223, -9.1393)?));
        }
        Ok(None)
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    _root: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let root = TempDir::new().expect("temp dir");
        let db_path = root.path().join("api.sqlite");
        let config = AppConfig {
            database_url: format!("sqlite://{}", db_path.to_string_lossy()),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            static_root: root.path().join("static"),
            cookie_secret: "api-test-secret".into(),
            geocoding_api_key: None,
            geocoding_base_url: DEFAULT_GEOCODING_URL.into(),
        };
        let db = init_pool(&config.database_url).await.expect("pool");
        run_migrations(&db).await.expect("migrations");
        let state = AppState::new(config, db, Arc::new(LisbonGeocoder));
        Self {
            router: create_router(state.clone()),
            state,
            _root: root,
        }
    }

    /// Signs `email` in and returns the `Cookie` header value for the session.
    async fn sign_in(&self, email: &str) -> (AuthenticatedUser, String) {
        let user = auth::ensure_user(&self.state.db, email, Some("Ana"))
            .await
            .expect("user");
        let session_id = auth::create_session(&self.state.db, &user.id)
            .await
            .expect("session");
        (user, self.session_cookie(&session_id))
    }

    fn session_cookie(&self, session_id: &str) -> String {
        let jar = auth::apply_session_cookie(
            PrivateCookieJar::new(self.state.cookie_key.clone()),
            session_id,
        );
        let response = (jar, ()).into_response();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("session cookie is set")
            .to_str()
            .expect("ascii cookie");
        set_cookie
            .split(';')
            .next()
            .expect("cookie pair")
            .to_string()
    }

    async fn trip(&self, user: &AuthenticatedUser, title: &str) -> Trip {
        let draft = TripDraft {
            title: title.into(),
            description: "Pastel de nata".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 9, 5).unwrap(),
            image_url: None,
        };
        trips::create_trip(&self.state.db, user, draft)
            .await
            .expect("trip")
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn json(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn form(&self, uri: &str, cookie: &str, body: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn itinerary(&self, cookie: &str, trip_id: &str) -> Vec<Location> {
        let (status, body) = self
            .json(
                Method::GET,
                &format!("/api/trips/{trip_id}/locations"),
                Some(cookie),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_slice(&body).unwrap()
    }
}

fn titles(locations: &[Location]) -> Vec<(&str, i64)> {
    locations
        .iter()
        .map(|location| (location.location_title.as_str(), location.order))
        .collect()
}

#[tokio::test]
async fn geocode_needs_both_coordinates() {
    let app = TestApp::new().await;
    let (status, _) = app.json(Method::GET, "/api/geocode?lat=38.7", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json(Method::GET, "/api/geocode?lat=north&lng=1", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn geocode_returns_address_or_null() {
    let app = TestApp::new().await;
    let (status, body) = app
        .json(Method::GET, "/api/geocode?lat=38.71&lng=-9.14", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let answer: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(answer["address"], "Rua Augusta, Lisboa, Portugal");

    let (status, body) = app
        .json(Method::GET, "/api/geocode?lat=-10&lng=0", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let answer: Value = serde_json::from_slice(&body).unwrap();
    assert!(answer["address"].is_null());
}

#[tokio::test]
async fn owner_operations_require_a_session() {
    let app = TestApp::new().await;
    let (status, _) = app.json(Method::GET, "/api/trips", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json(
            Method::POST,
            "/api/experiences",
            None,
            Some(json!({"title": "x", "description": "y", "location_name": "z", "lat": 1.0, "lng": 1.0})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json(Method::GET, "/api/trips", Some("wayfare_session=forged"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_sessions_are_anonymous() {
    let app = TestApp::new().await;
    let (user, _) = app.sign_in("ana@example.com").await;
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO sessions (id, user_id, created_at, last_seen_at, expires_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind("stale")
    .bind(&user.id)
    .bind(now - Duration::days(40))
    .bind(now - Duration::days(40))
    .bind(now - Duration::days(10))
    .execute(&app.state.db)
    .await
    .unwrap();

    let cookie = app.session_cookie("stale");
    let (status, _) = app.json(Method::GET, "/api/trips", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn appended_locations_are_numbered_and_reorderable() {
    let app = TestApp::new().await;
    let (user, cookie) = app.sign_in("ana@example.com").await;
    let trip = app.trip(&user, "Lisbon").await;
    let uri = format!("/api/trips/{}/locations", trip.id);

    for (index, name) in ["Alfama", "Baixa", "Belem"].iter().enumerate() {
        let (status, body) = app
            .json(
                Method::POST,
                &uri,
                Some(&cookie),
                Some(json!({"location_title": name, "lat": 38.7, "lng": -9.1})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let created: Location = serde_json::from_slice(&body).unwrap();
        assert_eq!(created.order, index as i64);
    }

    let mut ids: Vec<String> = app
        .itinerary(&cookie, &trip.id)
        .await
        .into_iter()
        .map(|location| location.id)
        .collect();
    ids.reverse();

    let (status, _) = app
        .json(
            Method::PUT,
            &format!("/api/trips/{}/itinerary", trip.id),
            Some(&cookie),
            Some(json!({ "location_ids": ids })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let itinerary = app.itinerary(&cookie, &trip.id).await;
    assert_eq!(
        titles(&itinerary),
        vec![("Belem", 0), ("Baixa", 1), ("Alfama", 2)]
    );
}

#[tokio::test]
async fn reorder_must_be_a_full_permutation() {
    let app = TestApp::new().await;
    let (user, cookie) = app.sign_in("ana@example.com").await;
    let trip = app.trip(&user, "Lisbon").await;
    for name in ["Alfama", "Baixa"] {
        app.json(
            Method::POST,
            &format!("/api/trips/{}/locations", trip.id),
            Some(&cookie),
            Some(json!({"location_title": name, "lat": 38.7, "lng": -9.1})),
        )
        .await;
    }
    let first = app.itinerary(&cookie, &trip.id).await[0].id.clone();

    for ids in [json!([first.clone()]), json!([first.clone(), first.clone()])] {
        let (status, _) = app
            .json(
                Method::PUT,
                &format!("/api/trips/{}/itinerary", trip.id),
                Some(&cookie),
                Some(json!({ "location_ids": ids })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let itinerary = app.itinerary(&cookie, &trip.id).await;
    assert_eq!(titles(&itinerary), vec![("Alfama", 0), ("Baixa", 1)]);
}

#[tokio::test]
async fn invalid_locations_are_rejected() {
    let app = TestApp::new().await;
    let (user, cookie) = app.sign_in("ana@example.com").await;
    let trip = app.trip(&user, "Lisbon").await;
    let uri = format!("/api/trips/{}/locations", trip.id);

    for body in [
        json!({"location_title": "Sea", "lat": 38.7}),
        json!({"location_title": "Pole", "lat": 120.0, "lng": 0.0}),
        json!({"location_title": "", "lat": 1.0, "lng": 1.0}),
    ] {
        let (status, _) = app.json(Method::POST, &uri, Some(&cookie), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    assert!(app.itinerary(&cookie, &trip.id).await.is_empty());
}

#[tokio::test]
async fn strangers_cannot_touch_an_itinerary() {
    let app = TestApp::new().await;
    let (owner, _) = app.sign_in("ana@example.com").await;
    let (_, stranger) = app.sign_in("bo@example.com").await;
    let trip = app.trip(&owner, "Lisbon").await;

    let (status, _) = app
        .json(
            Method::PUT,
            &format!("/api/trips/{}/itinerary", trip.id),
            Some(&stranger),
            Some(json!({ "location_ids": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .json(
            Method::POST,
            &format!("/api/trips/{}/locations", trip.id),
            Some(&stranger),
            Some(json!({"location_title": "Mine", "lat": 1.0, "lng": 1.0})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .json(
            Method::GET,
            "/api/trips/does-not-exist/locations",
            Some(&stranger),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn strangers_cannot_remove_stops_or_trips() {
    let app = TestApp::new().await;
    let (owner, cookie) = app.sign_in("ana@example.com").await;
    let (_, stranger) = app.sign_in("bo@example.com").await;
    let trip = app.trip(&owner, "Lisbon").await;
    for name in ["Alfama", "Belem"] {
        app.form(
            &format!("/trips/{}/locations", trip.id),
            &cookie,
            &format!("location_title={name}&lat=38.7&lng=-9.1"),
        )
        .await;
    }
    let before = app.itinerary(&cookie, &trip.id).await;

    let (status, _) = app
        .form(
            &format!("/trips/{}/locations/{}/delete", trip.id, before[0].id),
            &stranger,
            "",
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .form(&format!("/trips/{}/delete", trip.id), &stranger, "")
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let after = app.itinerary(&cookie, &trip.id).await;
    assert_eq!(titles(&after), vec![("Alfama", 0), ("Belem", 1)]);
}

#[tokio::test]
async fn globe_labels_stops_with_country() {
    let app = TestApp::new().await;
    let (user, cookie) = app.sign_in("ana@example.com").await;
    let trip = app.trip(&user, "Lisbon").await;
    app.json(
        Method::POST,
        &format!("/api/trips/{}/locations", trip.id),
        Some(&cookie),
        Some(json!({"location_title": "Baixa", "lat": 38.71, "lng": -9.14})),
    )
    .await;

    let (status, body) = app.json(Method::GET, "/api/trips", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    let pins: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(pins[0]["name"], "Lisbon - Rua Augusta, Lisboa, Portugal");
    assert_eq!(pins[0]["country"], "Portugal");
}

#[tokio::test]
async fn experience_feed_is_newest_first() {
    let app = TestApp::new().await;
    let (_, cookie) = app.sign_in("ana@example.com").await;

    for title in ["Tram 28", "Fado night"] {
        let (status, body) = app
            .json(
                Method::POST,
                "/api/experiences",
                Some(&cookie),
                Some(json!({
                    "title": title,
                    "description": "Worth it",
                    "location_name": "Lisbon",
                    "lat": 38.71,
                    "lng": -9.14,
                    "images": [{"url": "https://images.example/1.jpg", "key": "1.jpg"}]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let created: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(created["user"]["name"], "Ana");
        assert_eq!(created["images"][0]["key"], "1.jpg");
    }

    let (status, body) = app.json(Method::GET, "/api/experiences", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let feed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(feed[0]["title"], "Fado night");
    assert_eq!(feed[1]["title"], "Tram 28");
}

#[tokio::test]
async fn experience_needs_coordinates() {
    let app = TestApp::new().await;
    let (_, cookie) = app.sign_in("ana@example.com").await;
    let (status, _) = app
        .json(
            Method::POST,
            "/api/experiences",
            Some(&cookie),
            Some(json!({"title": "t", "description": "d", "location_name": "Lisbon"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trip_form_reports_bad_dates() {
    let app = TestApp::new().await;
    let (_, cookie) = app.sign_in("ana@example.com").await;
    let (status, body) = app
        .form(
            "/trips/new",
            &cookie,
            "title=Porto&description=Wine&start_date=2026-10-05&end_date=2026-10-01",
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let page = String::from_utf8(body).unwrap();
    assert!(page.contains("end date must not be before start date"));
    assert!(page.contains("Porto"));
}

#[tokio::test]
async fn location_form_resolves_addresses() {
    let app = TestApp::new().await;
    let (user, cookie) = app.sign_in("ana@example.com").await;
    let trip = app.trip(&user, "Lisbon").await;
    let uri = format!("/trips/{}/locations", trip.id);

    let (status, _) = app.form(&uri, &cookie, "address=Lisbon").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    let itinerary = app.itinerary(&cookie, &trip.id).await;
    assert_eq!(titles(&itinerary), vec![("Lisbon", 0)]);
    assert!((itinerary[0].lat - 38.7223).abs() < 1e-9);

    let (status, body) = app.form(&uri, &cookie, "address=Atlantis").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().contains("Atlantis"));
}

#[tokio::test]
async fn move_form_shifts_a_stop() {
    let app = TestApp::new().await;
    let (user, cookie) = app.sign_in("ana@example.com").await;
    let trip = app.trip(&user, "Lisbon").await;
    for name in ["A", "B", "C"] {
        app.form(
            &format!("/trips/{}/locations", trip.id),
            &cookie,
            &format!("location_title={name}&lat=38.7&lng=-9.1"),
        )
        .await;
    }

    let (status, _) = app
        .form(&format!("/trips/{}/itinerary", trip.id), &cookie, "from=2&to=0")
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    let itinerary = app.itinerary(&cookie, &trip.id).await;
    assert_eq!(titles(&itinerary), vec![("C", 0), ("A", 1), ("B", 2)]);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = TestApp::new().await;
    let (_, cookie) = app.sign_in("ana@example.com").await;

    let (status, _) = app.form("/logout", &cookie, "").await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let (status, _) = app.json(Method::GET, "/api/trips", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn landing_shows_only_the_newest_posts() {
    let app = TestApp::new().await;
    let (user, _) = app.sign_in("ana@example.com").await;
    for i in 0..7 {
        let draft = ExperienceDraft::new(
            &format!("Post {i}"),
            "Worth it",
            "Lisbon",
            Coordinates::new(38.71, -9.14).unwrap(),
            None,
            Vec::new(),
        )
        .unwrap();
        experiences::create_experience(&app.state.db, &user, draft)
            .await
            .unwrap();
    }

    let (status, body) = app.json(Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let page = String::from_utf8(body).unwrap();
    assert!(page.contains("Post 6"));
    assert!(page.contains("Post 1"));
    assert!(!page.contains("Post 0"));
}

#[tokio::test]
async fn edit_form_is_prefilled_with_the_stored_position() {
    let app = TestApp::new().await;
    let (user, cookie) = app.sign_in("ana@example.com").await;
    let draft = ExperienceDraft::new(
        "Tram 28",
        "Worth it",
        "Lisbon",
        Coordinates::new(38.71, -9.14).unwrap(),
        Some("Rua Augusta, Lisboa".into()),
        Vec::new(),
    )
    .unwrap();
    let created = experiences::create_experience(&app.state.db, &user, draft)
        .await
        .unwrap();

    let (status, body) = app
        .json(
            Method::GET,
            &format!("/experiences/{}/edit", created.experience.id),
            Some(&cookie),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let page = String::from_utf8(body).unwrap();
    assert!(page.contains(r#"name="lat" value="38.71""#));
    assert!(page.contains(r#"name="lng" value="-9.14""#));
    assert!(page.contains("Rua Augusta, Lisboa"));
}
