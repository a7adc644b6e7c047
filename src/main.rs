use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use wayfare::config::AppConfig;
use wayfare::db::{init_pool, run_migrations};
use wayfare::error::AppError;
use wayfare::routes::create_router;
use wayfare::services::geocoding::GoogleGeocoder;
use wayfare::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = AppConfig::from_env()?;
    let db = init_pool(&config.database_url).await?;
    run_migrations(&db).await?;

    if config.geocoding_api_key.is_none() {
        warn!("GEOCODING_API_KEY is not set, address lookups will fail");
    }
    let geocoder = GoogleGeocoder::new(
        &config.geocoding_base_url,
        config.geocoding_api_key.clone(),
    )?;

    let state = AppState::new(config.clone(), db, Arc::new(geocoder));
    let app = create_router(state);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,wayfare=debug".into());

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
