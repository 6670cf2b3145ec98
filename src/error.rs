use thiserror::Error;

/// Every failure the translator can report to the chat surface.
///
/// The `Display` strings are what the user sees inline, so they keep the
/// wording of the hosted application ("Error making request", "HTTP Error").
#[derive(Debug, Error)]
pub enum TranslatorError {
    #[error("Error making request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("❌ HTTP Error: {status} - {reason}")]
    Status { status: u16, reason: String },

    #[error("Error making request: failed to decode agent response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Error making request: stream error: {0}")]
    Stream(String),

    #[error("Error processing events: {0}")]
    Event(String),

    #[error("Error executing SQL: {0}")]
    Query(String),

    #[error("Failed to connect to Snowflake: {0}")]
    Connection(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<snowflake_connector_rs::Error> for TranslatorError {
    fn from(err: snowflake_connector_rs::Error) -> Self {
        TranslatorError::Query(err.to_string())
    }
}

pub type Result<T, E = TranslatorError> = std::result::Result<T, E>;
