//! Weather-specific error types.

use nimbus_core::NetworkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeatherFetchError {
    #[error("City not found: {0}")]
    CityNotFound(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    #[error("Weather service unavailable")]
    ServiceUnavailable,

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed weather payload: {0}")]
    Decode(String),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

impl WeatherFetchError {
    /// User-friendly error message for display.
    pub fn user_message(&self) -> String {
        match self {
            Self::CityNotFound(city) => format!("City not found: {}", city),
            Self::InvalidApiKey => "Weather API key is invalid. Check settings.".to_string(),
            Self::RateLimited(secs) => format!("Too many requests. Please wait {} seconds.", secs),
            Self::ServiceUnavailable => {
                "Weather service unavailable. Please try again later.".to_string()
            }
            Self::Api(_) => "Weather service error. Please try again.".to_string(),
            Self::Decode(_) => "Received an unexpected response. Please try again.".to_string(),
            Self::Network(e) => e.user_message().to_string(),
        }
    }

    /// Whether a later attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::ServiceUnavailable | Self::Network(_)
        )
    }
}
