// src/utils/id_generator.rs
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdType {
    User,
    RideRequest,
    Ride,
    Payment,
    Review,
}

impl IdType {
    pub fn to_prefix(&self) -> &'static str {
        match self {
            IdType::User => "usr",
            IdType::RideRequest => "req",
            IdType::Ride => "rid",
            IdType::Payment => "pay",
            IdType::Review => "rev",
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_prefix())
    }
}

pub struct IdGenerator;

impl IdGenerator {
    /// Generate a unique ID with format: {prefix}-{yymmdd}-{random_suffix}
    pub fn generate(id_type: IdType) -> String {
        Self::generate_with_timestamp(id_type, Utc::now())
    }

    /// Generate ID with a specific timestamp (useful for testing)
    pub fn generate_with_timestamp(id_type: IdType, timestamp: DateTime<Utc>) -> String {
        let date_part = timestamp.format("%y%m%d").to_string();
        let random_suffix = Self::generate_random_suffix();

        format!("{}-{}-{}", id_type.to_prefix(), date_part, random_suffix)
    }

    /// 8 characters: 4 hex followed by 4 alphanumeric, or the reverse
    fn generate_random_suffix() -> String {
        if rand::random::<bool>() {
            format!(
                "{}{}",
                Self::generate_hex_chars(4),
                Self::generate_alphanumeric_chars(4)
            )
        } else {
            format!(
                "{}{}",
                Self::generate_alphanumeric_chars(4),
                Self::generate_hex_chars(4)
            )
        }
    }

    fn generate_hex_chars(n: usize) -> String {
        const HEX_CHARS: &[u8] = b"0123456789abcdef";
        Self::generate_from_chars(HEX_CHARS, n)
    }

    fn generate_alphanumeric_chars(n: usize) -> String {
        const ALPHANUMERIC_CHARS: &[u8] =
            b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        Self::generate_from_chars(ALPHANUMERIC_CHARS, n)
    }

    fn generate_from_chars(charset: &[u8], n: usize) -> String {
        let mut rng = rand::rng();
        (0..n)
            .map(|_| charset[rng.random_range(0..charset.len())] as char)
            .collect()
    }
}
