use std::path::PathBuf;

use crate::error::{AppError, AppResult};

#[derive(Clone, Debug)]
pub struct Config {
    pub tmdb_api_key: String,
    pub tmdb_base_url: String,
    pub database_path: PathBuf,
    pub tmdb_rps: u32,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        // The credential check happens here, before any client is built,
        // so a missing key can never reach the network.
        let tmdb_api_key = std::env::var("TMDB_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AppError::MissingApiKey)?;

        let tmdb_base_url = std::env::var("TMDB_BASE_URL")
            .unwrap_or_else(|_| "https://api.themoviedb.org/3".to_string());

        let database_path = std::env::var("SIXDEGREES_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("sixdegrees.db"));

        let tmdb_rps: u32 =
            std::env::var("TMDB_RPS").ok().and_then(|s| s.parse().ok()).unwrap_or(4);

        Ok(Self { tmdb_api_key, tmdb_base_url, database_path, tmdb_rps })
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.database_path.display())
    }
}
