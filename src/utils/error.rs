use thiserror::Error;

/// Fatal errors for the query/import core.
///
/// Per-target conditions (a single service timing out, returning garbage,
/// or dying mid-stream) are deliberately NOT represented here; they are
/// accumulated as [`crate::domain::model::ServiceFailure`] entries alongside
/// partial results. Cancellation is a terminal outcome carried on the result
/// types, not an error.
#[derive(Error, Debug)]
pub enum PsicquicError {
    #[error("Registry unavailable: {reason}")]
    RegistryUnavailable { reason: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Catalog file error: {0}")]
    CatalogError(#[from] toml::de::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("Empty target set: at least one service endpoint is required")]
    EmptyTargetSet,

    #[error("Configuration error in '{field}' (value: '{value}'): {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, PsicquicError>;
