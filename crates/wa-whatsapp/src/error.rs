//! Error types for wa-whatsapp

use thiserror::Error;

/// wa-whatsapp error type
#[derive(Error, Debug)]
pub enum WhatsAppError {
    #[error("WhatsApp credentials not set (FACEBOOK_ACCESS_TOKEN / FACEBOOK_PHONE_NUMBER_ID)")]
    CredentialsNotSet,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("WhatsApp API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl From<reqwest::Error> for WhatsAppError {
    fn from(err: reqwest::Error) -> Self {
        WhatsAppError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for WhatsAppError {
    fn from(err: serde_json::Error) -> Self {
        WhatsAppError::InvalidPayload(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, WhatsAppError>;
