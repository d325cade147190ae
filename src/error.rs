#[cfg(feature = "api")]
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::fmt;
use thiserror::Error;

#[cfg(feature = "api")]
use crate::models::ErrorResponse;
use crate::models::UserInput;

/// Errors raised while loading artifacts or running a prediction
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("failed to load artifact {name}: {reason}")]
    ArtifactLoad { name: String, reason: String },

    #[error("failed to parse artifact {name}: {source}")]
    ArtifactParse {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid model {name}: {reason}")]
    InvalidModel { name: String, reason: String },

    #[error("feature order mismatch: {0}")]
    FeatureOrderMismatch(String),

    #[error("distance {0} is not covered by the loaded artifacts")]
    UnsupportedDistance(String),

    #[error("tier level {0} is out of range")]
    InvalidTierInput(u8),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, PredictionError>;

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Invalid request data
    ValidationError(String),
    /// Artifacts missing or broken; no prediction can be produced
    PredictionUnavailable(String),
    /// Internal server error
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::PredictionUnavailable(msg) => write!(f, "Prediction unavailable: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<PredictionError> for AppError {
    fn from(err: PredictionError) -> Self {
        match err {
            PredictionError::InvalidInput(msg) => AppError::ValidationError(msg),
            PredictionError::UnsupportedDistance(_) => AppError::ValidationError(err.to_string()),
            PredictionError::InvalidTierInput(_) => AppError::InternalError(err.to_string()),
            other => AppError::PredictionUnavailable(other.to_string()),
        }
    }
}

#[cfg(feature = "api")]
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::PredictionUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_code, message) = match self {
            AppError::ValidationError(msg) => ("validation_error", msg.clone()),
            AppError::PredictionUnavailable(_) => {
                ("prediction_unavailable", "prediction unavailable".to_string())
            }
            AppError::InternalError(msg) => ("internal_error", msg.clone()),
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: error_code.to_string(),
            message,
        })
    }
}

/// Validation functions
pub fn validate_age(age: u32) -> std::result::Result<(), AppError> {
    if !(10..=100).contains(&age) {
        return Err(AppError::ValidationError(format!(
            "Age must be between 10 and 100, got {}",
            age
        )));
    }
    Ok(())
}

pub fn validate_positive(field: &str, value: f64) -> std::result::Result<(), AppError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(AppError::ValidationError(format!(
            "{} must be a positive number, got {}",
            field, value
        )));
    }
    Ok(())
}

/// Validate every supplied field of a user input
pub fn validate_user_input(input: &UserInput) -> std::result::Result<(), AppError> {
    if let Some(age) = input.age {
        validate_age(age)?;
    }
    if let Some(ftp) = input.ftp_watts {
        validate_positive("ftp_watts", ftp)?;
    }
    if let Some(weight) = input.weight_kg {
        validate_positive("weight_kg", weight)?;
    }
    if let Some(css) = input.css_sec_per_100m {
        validate_positive("css_sec_per_100m", css)?;
    }
    if let Some(pace) = input.threshold_pace_sec_per_km {
        validate_positive("threshold_pace_sec_per_km", pace)?;
    }
    for result in &input.prior_results {
        validate_positive("finish_seconds", result.finish_seconds)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DistanceCategory, PriorResult};

    #[test]
    fn test_validate_age_valid() {
        assert!(validate_age(10).is_ok());
        assert!(validate_age(45).is_ok());
        assert!(validate_age(100).is_ok());
    }

    #[test]
    fn test_validate_age_invalid() {
        assert!(validate_age(0).is_err());
        assert!(validate_age(9).is_err());
        assert!(validate_age(101).is_err());
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive("ftp_watts", 250.0).is_ok());
        assert!(validate_positive("ftp_watts", 0.0).is_err());
        assert!(validate_positive("ftp_watts", -5.0).is_err());
        assert!(validate_positive("ftp_watts", f64::NAN).is_err());
    }

    #[test]
    fn test_validate_user_input_checks_prior_results() {
        let input = UserInput {
            prior_results: vec![PriorResult {
                distance: DistanceCategory::Sprint,
                finish_seconds: -1.0,
            }],
            ..Default::default()
        };
        assert!(validate_user_input(&input).is_err());
        assert!(validate_user_input(&UserInput::default()).is_ok());
    }

    #[test]
    fn test_prediction_error_maps_to_app_error() {
        let err: AppError = PredictionError::ArtifactLoad {
            name: "swim_sec_70.3.json".to_string(),
            reason: "not found".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::PredictionUnavailable(_)));

        let err: AppError = PredictionError::InvalidInput("bad".to_string()).into();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn test_error_display() {
        let err = AppError::ValidationError("test error".to_string());
        assert!(err.to_string().contains("Validation error"));

        let err = PredictionError::FeatureOrderMismatch("unknown feature foo".to_string());
        assert!(err.to_string().contains("unknown feature foo"));
    }

    #[cfg(feature = "api")]
    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::ValidationError("".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::PredictionUnavailable("".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::InternalError("".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
