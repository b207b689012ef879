use crate::models::MediaKind;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("TMDB_API_KEY is not set")]
    MissingApiKey,

    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    #[error("TMDB request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} not found: '{query}'")]
    NotFound { kind: MediaKind, query: String },

    #[error("no matching characters")]
    NoMatchingCharacters,

    #[error("invalid episode expression '{0}', expected NxM or sNeM")]
    InvalidEpisode(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(kind: MediaKind, query: impl Into<String>) -> Self {
        AppError::NotFound { kind, query: query.into() }
    }
}

pub type AppResult<T> = Result<T, AppError>;
