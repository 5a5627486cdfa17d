// src/services/identity_service.rs
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;

use crate::{
    config::AdminSeed,
    errors::{RideShareError, RideShareResult},
    models::{
        outcome::Outcome,
        user::{
            Credentials, LoginResponse, Principal, Session, User, UserLogin, UserRegistration,
            UserResponse, UserType, UserUpdate,
        },
    },
    services::{
        messaging_service::{notify_best_effort, NotificationTemplate, Notifier},
        repository::{Precondition, Record, Repository, WriteBatch},
    },
    utils::{
        id_generator::{IdGenerator, IdType},
        phone::parse_kenyan_mobile,
    },
};

const SESSION_TOKEN_LEN: usize = 32;

/// Resolves a bearer token to the caller.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, token: &str) -> RideShareResult<Principal>;
}

#[async_trait]
pub trait UserOperations: Send + Sync {
    async fn register_user(&self, registration: UserRegistration) -> RideShareResult<Outcome<UserResponse>>;
    async fn login_user(&self, login: UserLogin) -> RideShareResult<LoginResponse>;
    async fn get_user(&self, caller: &Principal, user_id: &str) -> RideShareResult<UserResponse>;
    async fn update_user(&self, caller: &Principal, user_id: &str, update: UserUpdate) -> RideShareResult<UserResponse>;
}

pub struct IdentityService {
    repository: Arc<dyn Repository>,
    notifier: Arc<dyn Notifier>,
    session_ttl: Duration,
    hash_cost: u32,
}

impl IdentityService {
    pub fn new(
        repository: Arc<dyn Repository>,
        notifier: Arc<dyn Notifier>,
        session_ttl_hours: i64,
        hash_cost: u32,
    ) -> Self {
        Self {
            repository,
            notifier,
            session_ttl: Duration::hours(session_ttl_hours),
            hash_cost,
        }
    }

    /// bcrypt the password off the async runtime.
    async fn new_credentials(&self, user_id: &str, password: &str) -> RideShareResult<Credentials> {
        let password = password.to_string();
        let cost = self.hash_cost;
        let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
        Ok(Credentials {
            user_id: user_id.to_string(),
            password_hash,
        })
    }

    async fn verify_password(credentials: &Credentials, password: &str) -> RideShareResult<bool> {
        let password = password.to_string();
        let hash = credentials.password_hash.clone();
        Ok(tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??)
    }

    async fn load_user(&self, user_id: &str) -> RideShareResult<User> {
        self.repository
            .get_user(user_id)
            .await?
            .ok_or_else(|| RideShareError::UserNotFound(user_id.to_string()))
    }

    /// Create the configured admin account unless its email is already taken.
    pub async fn seed_admin(&self, seed: &AdminSeed) -> RideShareResult<()> {
        let email = seed.email.trim().to_lowercase();
        if self.repository.find_user_by_email(&email).await?.is_some() {
            tracing::debug!("Admin account {} already present", email);
            return Ok(());
        }

        let now = Utc::now();
        let admin = User {
            id: IdGenerator::generate(IdType::User),
            user_type: UserType::Admin,
            first_name: "Platform".to_string(),
            last_name: "Admin".to_string(),
            email: email.clone(),
            phone_number: parse_kenyan_mobile("ADMIN_PHONE", &seed.phone_number)?,
            is_email_verified: true,
            rating: 0.0,
            device_tokens: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let credentials = self.new_credentials(&admin.id, &seed.password).await?;

        let batch = WriteBatch::new()
            .guard(Precondition::EmailUnclaimed { email: email.clone() })
            .put(Record::User(admin))
            .put(Record::Credentials(credentials));

        match self.repository.commit(batch).await {
            Ok(()) => {
                tracing::info!("Seeded admin account {}", email);
                Ok(())
            }
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl IdentityProvider for IdentityService {
    async fn authenticate(&self, token: &str) -> RideShareResult<Principal> {
        let session = self
            .repository
            .get_session(token)
            .await?
            .ok_or(RideShareError::TokenInvalid)?;

        Ok(Principal {
            user_id: session.user_id,
            user_type: session.user_type,
        })
    }
}

#[async_trait]
impl UserOperations for IdentityService {
    async fn register_user(&self, registration: UserRegistration) -> RideShareResult<Outcome<UserResponse>> {
        registration.validate()?;
        let phone_number = parse_kenyan_mobile("phone_number", &registration.phone_number)?;
        let email = registration.email.trim().to_lowercase();

        tracing::info!("Registering {} {}", registration.user_type.as_str(), email);

        let now = Utc::now();
        let user = User {
            id: IdGenerator::generate(IdType::User),
            user_type: registration.user_type,
            first_name: registration.first_name.trim().to_string(),
            last_name: registration.last_name.trim().to_string(),
            email: email.clone(),
            phone_number: phone_number.clone(),
            is_email_verified: false,
            rating: 0.0,
            device_tokens: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let credentials = self.new_credentials(&user.id, &registration.password).await?;

        let batch = WriteBatch::new()
            .guard(Precondition::EmailUnclaimed { email })
            .guard(Precondition::PhoneUnclaimed {
                phone: phone_number,
                except_user: None,
            })
            .put(Record::User(user.clone()))
            .put(Record::Credentials(credentials));
        self.repository.commit(batch).await?;

        tracing::info!("User registered successfully: {}", user.id);

        let warning = notify_best_effort(
            self.notifier.as_ref(),
            &user.id,
            NotificationTemplate::Welcome,
            json!({ "first_name": user.first_name }),
        )
        .await;

        Ok(Outcome::new(UserResponse::from(user)).warn_if(warning))
    }

    async fn login_user(&self, login: UserLogin) -> RideShareResult<LoginResponse> {
        let email = login.email.trim().to_lowercase();
        let invalid = || RideShareError::unauthorized("Invalid email or password");

        let mut user = self.repository.find_user_by_email(&email).await?.ok_or_else(invalid)?;
        let credentials = self.repository.get_credentials(&user.id).await?.ok_or_else(invalid)?;

        if !Self::verify_password(&credentials, &login.password).await? {
            tracing::warn!("Failed login for {}", email);
            return Err(invalid());
        }

        let now = Utc::now();
        let session = Session {
            token: nanoid::nanoid!(SESSION_TOKEN_LEN),
            user_id: user.id.clone(),
            user_type: user.user_type,
            created_at: now,
            expires_at: now + self.session_ttl,
        };

        let mut batch = WriteBatch::new().put(Record::Session(session.clone()));
        if let Some(token) = login.device_token.filter(|t| !t.trim().is_empty()) {
            if !user.device_tokens.contains(&token) {
                batch = batch.guard(Precondition::UserUnchanged {
                    id: user.id.clone(),
                    updated_at: user.updated_at,
                });
                user.device_tokens.push(token);
                user.updated_at = now;
                batch = batch.put(Record::User(user.clone()));
            }
        }
        self.repository.commit(batch).await?;

        tracing::info!("User logged in: {}", user.id);

        Ok(LoginResponse {
            user: UserResponse::from(user),
            access_token: session.token,
            token_type: "Bearer".to_string(),
            expires_at: session.expires_at,
        })
    }

    async fn get_user(&self, caller: &Principal, user_id: &str) -> RideShareResult<UserResponse> {
        caller.require_self_or_admin(user_id)?;
        tracing::debug!("Getting user: {}", user_id);
        Ok(UserResponse::from(self.load_user(user_id).await?))
    }

    async fn update_user(&self, caller: &Principal, user_id: &str, update: UserUpdate) -> RideShareResult<UserResponse> {
        if caller.user_id != user_id {
            return Err(RideShareError::forbidden("You can only update your own profile"));
        }

        let mut user = self.load_user(user_id).await?;
        let mut batch = WriteBatch::new().guard(Precondition::UserUnchanged {
            id: user.id.clone(),
            updated_at: user.updated_at,
        });

        if let Some(first_name) = update.first_name {
            if first_name.trim().is_empty() {
                return Err(RideShareError::validation_error("first_name", "first_name cannot be empty"));
            }
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = update.last_name {
            if last_name.trim().is_empty() {
                return Err(RideShareError::validation_error("last_name", "last_name cannot be empty"));
            }
            user.last_name = last_name.trim().to_string();
        }
        if let Some(phone) = update.phone_number {
            let phone = parse_kenyan_mobile("phone_number", &phone)?;
            batch = batch.guard(Precondition::PhoneUnclaimed {
                phone: phone.clone(),
                except_user: Some(user.id.clone()),
            });
            user.phone_number = phone;
        }

        user.updated_at = Utc::now();
        self.repository.commit(batch.put(Record::User(user.clone()))).await?;

        tracing::info!("User updated: {}", user.id);
        Ok(UserResponse::from(user))
    }
}
