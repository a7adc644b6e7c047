use std::{env, net::SocketAddr, path::PathBuf};

use crate::error::AppError;

pub const DEFAULT_GEOCODING_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub static_root: PathBuf,
    pub cookie_secret: String,
    pub geocoding_api_key: Option<String>,
    pub geocoding_base_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://wayfare.db".to_string());
        let listen_addr: SocketAddr = env::var("APP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let static_root = env::var("STATIC_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("static"));

        let cookie_secret = env::var("COOKIE_SECRET")
            .unwrap_or_else(|_| "change-me-wayfare-session-cookie-secret".to_string());

        let geocoding_api_key = env::var("GEOCODING_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let geocoding_base_url = env::var("GEOCODING_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_GEOCODING_URL.to_string());
        url::Url::parse(&geocoding_base_url)
            .map_err(|err| AppError::Config(format!("invalid GEOCODING_BASE_URL: {err}")))?;

        Ok(Self {
            database_url,
            listen_addr,
            static_root,
            cookie_secret,
            geocoding_api_key,
            geocoding_base_url,
        })
    }
}
