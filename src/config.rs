// src/config.rs
use std::env;
use std::fmt;
use std::str::FromStr;

use crate::errors::{RideShareError, RideShareResult};

pub const DEFAULT_FCM_URL: &str = "https://fcm.googleapis.com/fcm/send";
const MPESA_PRODUCTION_URL: &str = "https://api.safaricom.co.ke";
const MPESA_SANDBOX_URL: &str = "https://sandbox.safaricom.co.ke";
const MIN_PASSWORD_HASH_COST: u32 = 4;
const MAX_PASSWORD_HASH_COST: u32 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development, // Mock gateway, no outbound calls
    Sandbox,     // Safaricom sandbox
    Production,
}

impl FromStr for Environment {
    type Err = RideShareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "sandbox" => Ok(Environment::Sandbox),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(RideShareError::ConfigurationError(format!(
                "ENVIRONMENT must be development, sandbox or production, got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Development => "development",
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

impl FromStr for StoreBackend {
    type Err = RideShareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            other => Err(RideShareError::ConfigurationError(format!(
                "STORE_BACKEND must be memory or redis, got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
}

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub passkey: String,
    pub shortcode: String,
    pub callback_url: String,
    pub timeout_secs: u64,
}

impl MpesaConfig {
    pub fn base_url(&self, environment: Environment) -> &'static str {
        match environment {
            Environment::Production => MPESA_PRODUCTION_URL,
            _ => MPESA_SANDBOX_URL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub server_key: String,
    pub url: String,
}

/// Admin account created at startup when both credentials are set.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub phone_number: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub mpesa: MpesaConfig,
    pub fcm: Option<FcmConfig>,
    pub environment: Environment,
    pub session_ttl_hours: i64,
    pub password_hash_cost: u32,
    pub bootstrap_admin: Option<AdminSeed>,
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                redis_url: "redis://127.0.0.1/".to_string(),
            },
            mpesa: MpesaConfig {
                consumer_key: String::new(),
                consumer_secret: String::new(),
                passkey: String::new(),
                shortcode: String::new(),
                callback_url: String::new(),
                timeout_secs: 30,
            },
            fcm: None,
            environment: Environment::Development,
            session_ttl_hours: 24,
            password_hash_cost: bcrypt::DEFAULT_COST,
            bootstrap_admin: None,
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Load config from environment variables
    pub fn from_env() -> RideShareResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> RideShareResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let environment = match get("ENVIRONMENT") {
            Some(v) => v.parse()?,
            None => defaults.environment,
        };

        let config = Self {
            server: ServerConfig {
                host: get("HOST").unwrap_or(defaults.server.host),
                port: parse_or("PORT", get("PORT"), defaults.server.port)?,
            },
            store: StoreConfig {
                backend: match get("STORE_BACKEND") {
                    Some(v) => v.parse()?,
                    None => defaults.store.backend,
                },
                redis_url: get("REDIS_URL").unwrap_or(defaults.store.redis_url),
            },
            mpesa: MpesaConfig {
                consumer_key: get("MPESA_CONSUMER_KEY").unwrap_or_default(),
                consumer_secret: get("MPESA_CONSUMER_SECRET").unwrap_or_default(),
                passkey: get("MPESA_PASSKEY").unwrap_or_default(),
                shortcode: get("MPESA_SHORTCODE").unwrap_or_default(),
                callback_url: get("MPESA_CALLBACK_URL").unwrap_or_default(),
                timeout_secs: parse_or("MPESA_TIMEOUT_SECS", get("MPESA_TIMEOUT_SECS"), defaults.mpesa.timeout_secs)?,
            },
            fcm: get("FCM_SERVER_KEY").map(|server_key| FcmConfig {
                server_key,
                url: get("FCM_URL").unwrap_or_else(|| DEFAULT_FCM_URL.to_string()),
            }),
            environment,
            session_ttl_hours: parse_or("SESSION_TTL_HOURS", get("SESSION_TTL_HOURS"), defaults.session_ttl_hours)?,
            password_hash_cost: parse_or("PASSWORD_HASH_COST", get("PASSWORD_HASH_COST"), defaults.password_hash_cost)?,
            bootstrap_admin: match (get("ADMIN_EMAIL"), get("ADMIN_PASSWORD")) {
                (Some(email), Some(password)) => Some(AdminSeed {
                    email,
                    password,
                    phone_number: get("ADMIN_PHONE").unwrap_or_else(|| "254700000000".to_string()),
                }),
                _ => None,
            },
            log_json: parse_or("LOG_JSON", get("LOG_JSON"), false)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RideShareResult<()> {
        if self.session_ttl_hours <= 0 {
            return Err(RideShareError::ConfigurationError(
                "SESSION_TTL_HOURS must be positive".to_string(),
            ));
        }

        if !(MIN_PASSWORD_HASH_COST..=MAX_PASSWORD_HASH_COST).contains(&self.password_hash_cost) {
            return Err(RideShareError::ConfigurationError(format!(
                "PASSWORD_HASH_COST must be between {} and {}",
                MIN_PASSWORD_HASH_COST, MAX_PASSWORD_HASH_COST
            )));
        }

        if self.environment != Environment::Development {
            let missing: Vec<&str> = [
                ("MPESA_CONSUMER_KEY", &self.mpesa.consumer_key),
                ("MPESA_CONSUMER_SECRET", &self.mpesa.consumer_secret),
                ("MPESA_PASSKEY", &self.mpesa.passkey),
                ("MPESA_SHORTCODE", &self.mpesa.shortcode),
                ("MPESA_CALLBACK_URL", &self.mpesa.callback_url),
            ]
            .into_iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(key, _)| key)
            .collect();

            if !missing.is_empty() {
                return Err(RideShareError::ConfigurationError(format!(
                    "{} environment requires {}",
                    self.environment,
                    missing.join(", ")
                )));
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> RideShareResult<T> {
    match value {
        Some(raw) => raw.trim().parse().map_err(|_| {
            RideShareError::ConfigurationError(format!("{} has an invalid value '{}'", key, raw))
        }),
        None => Ok(default),
    }
}
