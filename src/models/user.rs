// src/models/user.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{RideShareError, RideShareResult, ValidationError};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Passenger, // Someone requesting rides
    Driver,    // Someone offering rides
    Admin,     // Platform administrator, never self-registered
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Passenger => "passenger",
            UserType::Driver => "driver",
            UserType::Admin => "admin",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub user_type: UserType,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String, // Always normalized to 254XXXXXXXXX
    pub is_email_verified: bool,
    pub rating: f64,          // Mean of all reviews received, 0.0 until the first one
    pub device_tokens: Vec<String>, // For push notifications
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Password material, kept apart from [`User`] so it never reaches a response.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Credentials {
    pub user_id: String,
    // bcrypt string; carries its own salt and cost
    pub password_hash: String,
}

/// A bearer token issued at login.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub user_type: UserType,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub user_id: String,
    pub user_type: UserType,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }

    pub fn require(&self, user_type: UserType, action: &str) -> RideShareResult<()> {
        if self.user_type != user_type {
            return Err(RideShareError::forbidden(format!(
                "Only {}s can {}",
                user_type.as_str(),
                action
            )));
        }
        Ok(())
    }

    /// Self or admin.
    pub fn require_self_or_admin(&self, user_id: &str) -> RideShareResult<()> {
        if self.user_id != user_id && !self.is_admin() {
            return Err(RideShareError::forbidden("Access denied"));
        }
        Ok(())
    }
}

// Request/Response Models
#[derive(Debug, Serialize, Deserialize)]
pub struct UserRegistration {
    pub user_type: UserType,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub password: String,
}

impl UserRegistration {
    pub const MIN_PASSWORD_LEN: usize = 6;

    pub fn validate(&self) -> RideShareResult<()> {
        let mut errors = Vec::new();

        if self.user_type == UserType::Admin {
            errors.push(ValidationError {
                field: "user_type".to_string(),
                message: "user_type must be driver or passenger".to_string(),
            });
        }
        if self.first_name.trim().is_empty() {
            errors.push(required("first_name"));
        }
        if self.last_name.trim().is_empty() {
            errors.push(required("last_name"));
        }
        if !looks_like_email(&self.email) {
            errors.push(ValidationError {
                field: "email".to_string(),
                message: "Invalid email address".to_string(),
            });
        }
        if self.password.chars().count() < Self::MIN_PASSWORD_LEN {
            errors.push(ValidationError {
                field: "password".to_string(),
                message: format!("Password must be at least {} characters", Self::MIN_PASSWORD_LEN),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RideShareError::ValidationFailed(errors))
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserLogin {
    pub email: String,
    pub password: String,
    pub device_token: Option<String>, // For push notifications
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct UserResponse {
    pub id: String,
    pub user_type: UserType,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub is_email_verified: bool,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            user_type: user.user_type,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone_number: user.phone_number,
            is_email_verified: user.is_email_verified,
            rating: user.rating,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: UserResponse,
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

fn required(field: &str) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: format!("{} is required", field),
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> UserRegistration {
        UserRegistration {
            user_type: UserType::Passenger,
            first_name: "Wanjiku".to_string(),
            last_name: "Kamau".to_string(),
            email: "wanjiku@example.co.ke".to_string(),
            phone_number: "0712345678".to_string(),
            password: "secret1".to_string(),
        }
    }

    #[test]
    fn valid_registration_passes() {
        assert!(registration().validate().is_ok());
    }

    #[test]
    fn registration_collects_every_problem() {
        let bad = UserRegistration {
            user_type: UserType::Admin,
            first_name: " ".to_string(),
            email: "not-an-email".to_string(),
            password: "123".to_string(),
            ..registration()
        };
        match bad.validate() {
            Err(RideShareError::ValidationFailed(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["user_type", "first_name", "email", "password"]);
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn principal_role_and_ownership_checks() {
        let passenger = Principal { user_id: "usr-1".into(), user_type: UserType::Passenger };
        let admin = Principal { user_id: "usr-9".into(), user_type: UserType::Admin };

        assert!(passenger.require(UserType::Passenger, "request rides").is_ok());
        assert!(matches!(
            passenger.require(UserType::Driver, "accept rides"),
            Err(RideShareError::Forbidden(_))
        ));
        assert!(passenger.require_self_or_admin("usr-1").is_ok());
        assert!(passenger.require_self_or_admin("usr-2").is_err());
        assert!(admin.require_self_or_admin("usr-2").is_ok());
    }

    #[test]
    fn user_type_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&UserType::Passenger).unwrap(), "\"passenger\"");
        let parsed: UserType = serde_json::from_str("\"driver\"").unwrap();
        assert_eq!(parsed, UserType::Driver);
    }
}
