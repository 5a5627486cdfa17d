use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for the ride-share backend
#[derive(Debug)]
pub enum RideShareError {
    // HTTP and API errors
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    InternalServer(String),

    // Lifecycle errors
    InvalidState(String),
    UserNotFound(String),
    DriverNotFound(String),
    RideRequestNotFound(String),
    RideNotFound(String),
    PaymentNotFound(String),

    // Store errors
    StoreConnection(String),
    StoreQuery(String),
    StoreSerialization(String),

    // External service errors
    PaymentGateway(String),
    Notification(String),

    // Network and HTTP client errors
    NetworkTimeout,
    NetworkConnection(String),
    HttpClient(String),

    // Serialization and parsing errors
    JsonParsing(String),
    JsonSerialization(String),
    InvalidFormat(String),

    // Validation errors
    ValidationFailed(Vec<ValidationError>),

    // Configuration errors
    ConfigurationError(String),

    // Authentication errors
    TokenInvalid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl fmt::Display for RideShareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RideShareError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            RideShareError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            RideShareError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            RideShareError::NotFound(msg) => write!(f, "Not found: {}", msg),
            RideShareError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            RideShareError::InternalServer(msg) => write!(f, "Internal server error: {}", msg),

            RideShareError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            RideShareError::UserNotFound(id) => write!(f, "User not found: {}", id),
            RideShareError::DriverNotFound(id) => write!(f, "Driver not found: {}", id),
            RideShareError::RideRequestNotFound(id) => write!(f, "Ride request not found: {}", id),
            RideShareError::RideNotFound(id) => write!(f, "Ride not found: {}", id),
            RideShareError::PaymentNotFound(id) => write!(f, "Payment not found: {}", id),

            RideShareError::StoreConnection(msg) => write!(f, "Store connection error: {}", msg),
            RideShareError::StoreQuery(msg) => write!(f, "Store query error: {}", msg),
            RideShareError::StoreSerialization(msg) => write!(f, "Store serialization error: {}", msg),

            RideShareError::PaymentGateway(msg) => write!(f, "Payment gateway error: {}", msg),
            RideShareError::Notification(msg) => write!(f, "Notification error: {}", msg),

            RideShareError::NetworkTimeout => write!(f, "Network request timed out"),
            RideShareError::NetworkConnection(msg) => write!(f, "Network connection error: {}", msg),
            RideShareError::HttpClient(msg) => write!(f, "HTTP client error: {}", msg),

            RideShareError::JsonParsing(msg) => write!(f, "JSON parsing error: {}", msg),
            RideShareError::JsonSerialization(msg) => write!(f, "JSON serialization error: {}", msg),
            RideShareError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),

            RideShareError::ValidationFailed(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }

            RideShareError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),

            RideShareError::TokenInvalid => write!(f, "Authentication token is invalid"),
        }
    }
}

impl std::error::Error for RideShareError {}

impl RideShareError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RideShareError::BadRequest(_)
            | RideShareError::ValidationFailed(_)
            | RideShareError::InvalidFormat(_)
            | RideShareError::JsonParsing(_) => StatusCode::BAD_REQUEST,

            RideShareError::Unauthorized(_)
            | RideShareError::TokenInvalid => StatusCode::UNAUTHORIZED,

            RideShareError::Forbidden(_) => StatusCode::FORBIDDEN,

            RideShareError::NotFound(_)
            | RideShareError::UserNotFound(_)
            | RideShareError::DriverNotFound(_)
            | RideShareError::RideRequestNotFound(_)
            | RideShareError::RideNotFound(_)
            | RideShareError::PaymentNotFound(_) => StatusCode::NOT_FOUND,

            RideShareError::Conflict(_) | RideShareError::InvalidState(_) => StatusCode::CONFLICT,

            RideShareError::NetworkTimeout => StatusCode::GATEWAY_TIMEOUT,
            RideShareError::PaymentGateway(_) => StatusCode::BAD_GATEWAY,

            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            RideShareError::BadRequest(_) => "bad_request",
            RideShareError::Unauthorized(_) => "unauthorized",
            RideShareError::Forbidden(_) => "forbidden",
            RideShareError::NotFound(_) => "not_found",
            RideShareError::Conflict(_) => "conflict",
            RideShareError::InvalidState(_) => "invalid_state",
            RideShareError::UserNotFound(_) => "user_not_found",
            RideShareError::DriverNotFound(_) => "driver_not_found",
            RideShareError::RideRequestNotFound(_) => "ride_request_not_found",
            RideShareError::RideNotFound(_) => "ride_not_found",
            RideShareError::PaymentNotFound(_) => "payment_not_found",
            RideShareError::ValidationFailed(_) => "validation_failed",
            RideShareError::InvalidFormat(_) | RideShareError::JsonParsing(_) => "invalid_format",
            RideShareError::TokenInvalid => "token_invalid",
            RideShareError::NetworkTimeout => "gateway_timeout",
            RideShareError::PaymentGateway(_) => "payment_gateway_error",
            _ => "internal_error",
        }
    }
}

impl IntoResponse for RideShareError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let (message, details) = match self {
            RideShareError::ValidationFailed(errors) => (
                "Validation errors occurred".to_string(),
                serde_json::to_value(&errors).ok(),
            ),
            // Store and serialization internals stay out of client responses
            RideShareError::StoreConnection(_)
            | RideShareError::StoreQuery(_)
            | RideShareError::StoreSerialization(_)
            | RideShareError::JsonSerialization(_) => ("Internal server error".to_string(), None),
            other => (other.to_string(), None),
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        };

        (status, axum::Json(error_response)).into_response()
    }
}

// Convenience type alias for Results
pub type RideShareResult<T> = Result<T, RideShareError>;

impl From<redis::RedisError> for RideShareError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::IoError => RideShareError::StoreConnection(err.to_string()),
            redis::ErrorKind::AuthenticationFailed => {
                RideShareError::StoreConnection("Authentication failed".to_string())
            }
            _ => RideShareError::StoreQuery(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for RideShareError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RideShareError::NetworkTimeout
        } else if err.is_connect() {
            RideShareError::NetworkConnection(err.to_string())
        } else {
            RideShareError::HttpClient(err.to_string())
        }
    }
}

impl From<bcrypt::BcryptError> for RideShareError {
    fn from(err: bcrypt::BcryptError) -> Self {
        RideShareError::InternalServer(format!("Password hashing failed: {}", err))
    }
}

impl From<tokio::task::JoinError> for RideShareError {
    fn from(err: tokio::task::JoinError) -> Self {
        RideShareError::InternalServer(format!("Background task failed: {}", err))
    }
}

impl From<serde_json::Error> for RideShareError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            RideShareError::JsonParsing(err.to_string())
        } else {
            RideShareError::JsonSerialization(err.to_string())
        }
    }
}

impl From<chrono::ParseError> for RideShareError {
    fn from(err: chrono::ParseError) -> Self {
        RideShareError::InvalidFormat(format!("Invalid date/time format: {}", err))
    }
}

// Helper functions for creating common errors
impl RideShareError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        RideShareError::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        RideShareError::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        RideShareError::Forbidden(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        RideShareError::NotFound(resource.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        RideShareError::Conflict(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        RideShareError::InvalidState(msg.into())
    }

    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        RideShareError::ValidationFailed(vec![ValidationError {
            field: field.into(),
            message: message.into(),
        }])
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RideShareError::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = RideShareError::RideNotFound("rid-250101-abc12".to_string());
        assert_eq!(error.to_string(), "Ride not found: rid-250101-abc12");
    }

    #[test]
    fn test_validation_error() {
        let error = RideShareError::validation_error("phone_number", "Invalid Kenyan phone number");
        match error {
            RideShareError::ValidationFailed(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "phone_number");
                assert_eq!(errors[0].message, "Invalid Kenyan phone number");
            }
            _ => panic!("Expected ValidationFailed error"),
        }
    }

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(RideShareError::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(RideShareError::unauthorized("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(RideShareError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(RideShareError::RideNotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(RideShareError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(RideShareError::invalid_state("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            RideShareError::StoreQuery("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_helper_functions() {
        assert!(matches!(RideShareError::bad_request("test"), RideShareError::BadRequest(_)));
        assert!(matches!(RideShareError::not_found("test"), RideShareError::NotFound(_)));
        assert_eq!(
            RideShareError::from(bcrypt::BcryptError::CostNotAllowed(2)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(RideShareError::conflict("test").is_conflict());
    }
}
