// src/services/repository.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    errors::RideShareResult,
    models::{
        driver::Driver,
        payment::{Payment, PaymentStatus},
        review::Review,
        ride::{Ride, RideRequest, RideRequestStatus, RideStatus},
        user::{Credentials, Session, User},
    },
};

/// A condition the store must observe, under the same lock or WATCH as the
/// writes, for a [`WriteBatch`] to be applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    RideRequestStatus { id: String, expected: RideRequestStatus },
    RideStatus { id: String, expected: RideStatus },
    RideNotStarted { id: String },
    RideStarted { id: String },
    DriverAvailable { id: String, expected: bool },
    DriverAbsent { id: String },
    /// Optimistic check for read-modify-write of a driver record.
    DriverUnchanged { id: String, updated_at: DateTime<Utc> },
    UserUnchanged { id: String, updated_at: DateTime<Utc> },
    PaymentStatus { id: String, expected: PaymentStatus },
    NoPaymentForRide { ride_id: String },
    NoRideForRequest { request_id: String },
    NoReview { ride_id: String, reviewer_id: String },
    ReviewCount { reviewed_id: String, expected: usize },
    EmailUnclaimed { email: String },
    PhoneUnclaimed { phone: String, except_user: Option<String> },
    PlateUnclaimed { plate: String },
}

impl Precondition {
    /// Message carried by the `Conflict` returned when this guard fails.
    pub fn describe(&self) -> String {
        match self {
            Precondition::RideRequestStatus { id, expected } => {
                format!("Ride request {} is no longer {}", id, expected)
            }
            Precondition::RideStatus { id, expected } => format!("Ride {} is not {}", id, expected),
            Precondition::RideNotStarted { id } => format!("Ride {} has already started", id),
            Precondition::RideStarted { id } => format!("Ride {} has not started", id),
            Precondition::DriverAvailable { id, expected: true } => {
                format!("Driver {} is not available", id)
            }
            Precondition::DriverAvailable { id, expected: false } => {
                format!("Driver {} is already available", id)
            }
            Precondition::DriverAbsent { id } => format!("Driver profile already exists for {}", id),
            Precondition::DriverUnchanged { id, .. } => {
                format!("Driver {} was modified concurrently, please retry", id)
            }
            Precondition::UserUnchanged { id, .. } => {
                format!("User {} was modified concurrently, please retry", id)
            }
            Precondition::PaymentStatus { id, .. } => format!("Payment {} changed concurrently", id),
            Precondition::NoPaymentForRide { ride_id } => {
                format!("A payment already exists for ride {}", ride_id)
            }
            Precondition::NoRideForRequest { request_id } => {
                format!("Ride request {} already has a ride", request_id)
            }
            Precondition::NoReview { ride_id, .. } => {
                format!("You have already reviewed ride {}", ride_id)
            }
            Precondition::ReviewCount { reviewed_id, .. } => {
                format!("Reviews for {} changed concurrently", reviewed_id)
            }
            Precondition::EmailUnclaimed { .. } => "Email is already registered".to_string(),
            Precondition::PhoneUnclaimed { .. } => "Phone number is already registered".to_string(),
            Precondition::PlateUnclaimed { plate } => {
                format!("License plate {} is already registered", plate)
            }
        }
    }
}

/// A full entity to insert or overwrite. Stores keep their own secondary
/// indexes (email, phone, plate, transaction reference) in step with it.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    User(User),
    Credentials(Credentials),
    Session(Session),
    Driver(Driver),
    RideRequest(RideRequest),
    Ride(Ride),
    Payment(Payment),
    Review(Review),
}

impl Record {
    pub fn kind(&self) -> &'static str {
        match self {
            Record::User(_) => "user",
            Record::Credentials(_) => "credentials",
            Record::Session(_) => "session",
            Record::Driver(_) => "driver",
            Record::RideRequest(_) => "ride_request",
            Record::Ride(_) => "ride",
            Record::Payment(_) => "payment",
            Record::Review(_) => "review",
        }
    }
}

/// All-or-nothing unit of work.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub guards: Vec<Precondition>,
    pub writes: Vec<Record>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(mut self, precondition: Precondition) -> Self {
        self.guards.push(precondition);
        self
    }

    pub fn put(mut self, record: Record) -> Self {
        self.writes.push(record);
        self
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_user(&self, id: &str) -> RideShareResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> RideShareResult<Option<User>>;
    async fn get_credentials(&self, user_id: &str) -> RideShareResult<Option<Credentials>>;
    /// Expired sessions read as absent.
    async fn get_session(&self, token: &str) -> RideShareResult<Option<Session>>;

    async fn get_driver(&self, driver_id: &str) -> RideShareResult<Option<Driver>>;
    async fn list_drivers(&self) -> RideShareResult<Vec<Driver>>;

    async fn get_ride_request(&self, id: &str) -> RideShareResult<Option<RideRequest>>;
    async fn get_ride(&self, id: &str) -> RideShareResult<Option<Ride>>;
    async fn find_ride_by_request(&self, request_id: &str) -> RideShareResult<Option<Ride>>;
    async fn list_rides(&self) -> RideShareResult<Vec<Ride>>;
    /// Rides where the user is driver or passenger.
    async fn list_rides_for_user(&self, user_id: &str) -> RideShareResult<Vec<Ride>>;

    async fn get_payment(&self, id: &str) -> RideShareResult<Option<Payment>>;
    async fn find_payment_by_ride(&self, ride_id: &str) -> RideShareResult<Option<Payment>>;
    async fn find_payment_by_transaction(&self, transaction_id: &str) -> RideShareResult<Option<Payment>>;

    async fn list_reviews_for(&self, reviewed_id: &str) -> RideShareResult<Vec<Review>>;

    /// Apply every write if every guard holds; otherwise nothing and `Conflict`.
    async fn commit(&self, batch: WriteBatch) -> RideShareResult<()>;

    async fn health_check(&self) -> RideShareResult<()>;
}

/// Key layout shared by the Redis store.
pub struct StoreKeys;

impl StoreKeys {
    pub fn user(id: &str) -> String {
        format!("user:{}", id)
    }

    pub fn user_by_email(email: &str) -> String {
        format!("user:email:{}", email.to_lowercase())
    }

    pub fn user_by_phone(phone: &str) -> String {
        format!("user:phone:{}", phone)
    }

    pub fn credentials(user_id: &str) -> String {
        format!("credentials:{}", user_id)
    }

    pub fn session(token: &str) -> String {
        format!("session:{}", token)
    }

    pub fn driver(id: &str) -> String {
        format!("driver:{}", id)
    }

    pub fn driver_by_plate(plate: &str) -> String {
        format!("driver:plate:{}", plate)
    }

    pub fn all_drivers() -> String {
        "drivers:all".to_string()
    }

    pub fn ride_request(id: &str) -> String {
        format!("ride_request:{}", id)
    }

    pub fn ride(id: &str) -> String {
        format!("ride:{}", id)
    }

    pub fn ride_by_request(request_id: &str) -> String {
        format!("ride:request:{}", request_id)
    }

    pub fn all_rides() -> String {
        "rides:all".to_string()
    }

    pub fn user_rides(user_id: &str) -> String {
        format!("user:rides:{}", user_id)
    }

    pub fn payment(id: &str) -> String {
        format!("payment:{}", id)
    }

    pub fn payment_by_ride(ride_id: &str) -> String {
        format!("payment:ride:{}", ride_id)
    }

    pub fn payment_by_transaction(transaction_id: &str) -> String {
        format!("payment:tx:{}", transaction_id)
    }

    pub fn review(id: &str) -> String {
        format!("review:{}", id)
    }

    pub fn review_by_reviewer(ride_id: &str, reviewer_id: &str) -> String {
        format!("review:ride:{}:{}", ride_id, reviewer_id)
    }

    pub fn reviews_of(user_id: &str) -> String {
        format!("reviews:reviewed:{}", user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_keys_are_case_insensitive() {
        assert_eq!(
            StoreKeys::user_by_email("Wanjiku@Example.co.ke"),
            "user:email:wanjiku@example.co.ke"
        );
    }

    #[test]
    fn batch_builder_keeps_order() {
        let batch = WriteBatch::new()
            .guard(Precondition::RideStarted { id: "rid-1".into() })
            .guard(Precondition::NoPaymentForRide { ride_id: "rid-1".into() });
        assert_eq!(batch.guards.len(), 2);
        assert!(batch.writes.is_empty());
        assert_eq!(batch.guards[0].describe(), "Ride rid-1 has not started");
    }
}
