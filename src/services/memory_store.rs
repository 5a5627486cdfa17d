// src/services/memory_store.rs
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{
    errors::{RideShareError, RideShareResult},
    models::{
        driver::{normalize_plate, Driver},
        payment::Payment,
        review::Review,
        ride::{Ride, RideRequest},
        user::{Credentials, Session, User},
    },
    services::repository::{Precondition, Record, Repository, WriteBatch},
};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    credentials: HashMap<String, Credentials>,
    sessions: HashMap<String, Session>,
    drivers: HashMap<String, Driver>,
    ride_requests: HashMap<String, RideRequest>,
    rides: HashMap<String, Ride>,
    payments: HashMap<String, Payment>,
    reviews: HashMap<String, Review>,
}

impl Tables {
    fn holds(&self, guard: &Precondition) -> bool {
        match guard {
            Precondition::RideRequestStatus { id, expected } => self
                .ride_requests
                .get(id)
                .is_some_and(|r| r.status == *expected),
            Precondition::RideStatus { id, expected } => {
                self.rides.get(id).is_some_and(|r| r.status == *expected)
            }
            Precondition::RideNotStarted { id } => {
                self.rides.get(id).is_some_and(|r| !r.is_started())
            }
            Precondition::RideStarted { id } => self.rides.get(id).is_some_and(|r| r.is_started()),
            Precondition::DriverAvailable { id, expected } => self
                .drivers
                .get(id)
                .is_some_and(|d| d.is_available == *expected),
            Precondition::DriverAbsent { id } => !self.drivers.contains_key(id),
            Precondition::DriverUnchanged { id, updated_at } => self
                .drivers
                .get(id)
                .is_some_and(|d| d.updated_at == *updated_at),
            Precondition::UserUnchanged { id, updated_at } => self
                .users
                .get(id)
                .is_some_and(|u| u.updated_at == *updated_at),
            Precondition::PaymentStatus { id, expected } => self
                .payments
                .get(id)
                .is_some_and(|p| p.payment_status == *expected),
            Precondition::NoPaymentForRide { ride_id } => {
                !self.payments.values().any(|p| &p.ride_id == ride_id)
            }
            Precondition::NoRideForRequest { request_id } => {
                !self.rides.values().any(|r| &r.request_id == request_id)
            }
            Precondition::NoReview { ride_id, reviewer_id } => !self
                .reviews
                .values()
                .any(|r| &r.ride_id == ride_id && &r.reviewer_id == reviewer_id),
            Precondition::ReviewCount { reviewed_id, expected } => {
                self.reviews.values().filter(|r| &r.reviewed_id == reviewed_id).count() == *expected
            }
            Precondition::EmailUnclaimed { email } => !self
                .users
                .values()
                .any(|u| u.email.eq_ignore_ascii_case(email)),
            Precondition::PhoneUnclaimed { phone, except_user } => !self.users.values().any(|u| {
                &u.phone_number == phone && except_user.as_deref() != Some(u.id.as_str())
            }),
            Precondition::PlateUnclaimed { plate } => {
                let plate = normalize_plate(plate);
                !self
                    .drivers
                    .values()
                    .any(|d| normalize_plate(&d.license_plate) == plate)
            }
        }
    }

    fn apply(&mut self, record: Record) {
        match record {
            Record::User(user) => {
                self.users.insert(user.id.clone(), user);
            }
            Record::Credentials(credentials) => {
                self.credentials.insert(credentials.user_id.clone(), credentials);
            }
            Record::Session(session) => {
                self.sessions.insert(session.token.clone(), session);
            }
            Record::Driver(driver) => {
                self.drivers.insert(driver.driver_id.clone(), driver);
            }
            Record::RideRequest(request) => {
                self.ride_requests.insert(request.id.clone(), request);
            }
            Record::Ride(ride) => {
                self.rides.insert(ride.id.clone(), ride);
            }
            Record::Payment(payment) => {
                self.payments.insert(payment.id.clone(), payment);
            }
            Record::Review(review) => {
                self.reviews.insert(review.id.clone(), review);
            }
        }
    }
}

/// In-process store for development and tests. Every commit holds the write
/// lock while it checks guards and applies writes.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn get_user(&self, id: &str) -> RideShareResult<Option<User>> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RideShareResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_credentials(&self, user_id: &str) -> RideShareResult<Option<Credentials>> {
        Ok(self.tables.read().await.credentials.get(user_id).cloned())
    }

    async fn get_session(&self, token: &str) -> RideShareResult<Option<Session>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .get(token)
            .filter(|s| s.expires_at > Utc::now())
            .cloned())
    }

    async fn get_driver(&self, driver_id: &str) -> RideShareResult<Option<Driver>> {
        Ok(self.tables.read().await.drivers.get(driver_id).cloned())
    }

    async fn list_drivers(&self) -> RideShareResult<Vec<Driver>> {
        Ok(self.tables.read().await.drivers.values().cloned().collect())
    }

    async fn get_ride_request(&self, id: &str) -> RideShareResult<Option<RideRequest>> {
        Ok(self.tables.read().await.ride_requests.get(id).cloned())
    }

    async fn get_ride(&self, id: &str) -> RideShareResult<Option<Ride>> {
        Ok(self.tables.read().await.rides.get(id).cloned())
    }

    async fn find_ride_by_request(&self, request_id: &str) -> RideShareResult<Option<Ride>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rides
            .values()
            .find(|r| r.request_id == request_id)
            .cloned())
    }

    async fn list_rides(&self) -> RideShareResult<Vec<Ride>> {
        Ok(self.tables.read().await.rides.values().cloned().collect())
    }

    async fn list_rides_for_user(&self, user_id: &str) -> RideShareResult<Vec<Ride>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rides
            .values()
            .filter(|r| r.involves(user_id))
            .cloned()
            .collect())
    }

    async fn get_payment(&self, id: &str) -> RideShareResult<Option<Payment>> {
        Ok(self.tables.read().await.payments.get(id).cloned())
    }

    async fn find_payment_by_ride(&self, ride_id: &str) -> RideShareResult<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .find(|p| p.ride_id == ride_id)
            .cloned())
    }

    async fn find_payment_by_transaction(&self, transaction_id: &str) -> RideShareResult<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .find(|p| p.transaction_id.as_deref() == Some(transaction_id))
            .cloned())
    }

    async fn list_reviews_for(&self, reviewed_id: &str) -> RideShareResult<Vec<Review>> {
        let tables = self.tables.read().await;
        Ok(tables
            .reviews
            .values()
            .filter(|r| r.reviewed_id == reviewed_id)
            .cloned()
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> RideShareResult<()> {
        let mut tables = self.tables.write().await;

        if let Some(failed) = batch.guards.iter().find(|g| !tables.holds(g)) {
            tracing::debug!("Commit rejected: {:?}", failed);
            return Err(RideShareError::Conflict(failed.describe()));
        }

        let kinds: Vec<&str> = batch.writes.iter().map(Record::kind).collect();
        for record in batch.writes {
            tables.apply(record);
        }
        tracing::trace!("Committed {:?}", kinds);
        Ok(())
    }

    async fn health_check(&self) -> RideShareResult<()> {
        Ok(())
    }
}
