// src/services/redis_store.rs
use async_trait::async_trait;
use chrono::Utc;
use redis::{aio::Connection, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    errors::{RideShareError, RideShareResult},
    models::{
        driver::{normalize_plate, Driver},
        payment::Payment,
        review::Review,
        ride::{Ride, RideRequest},
        user::{Credentials, Session, User},
    },
    services::repository::{Precondition, Record, Repository, StoreKeys, WriteBatch},
};

const DEFAULT_COMMIT_ATTEMPTS: usize = 3;

/// Redis-backed store. Entities are JSON strings under `StoreKeys`; commits
/// use WATCH/MULTI/EXEC and retry when a watched key changes underneath.
pub struct RedisStore {
    client: Client,
    commit_attempts: usize,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> RideShareResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| RideShareError::StoreConnection(e.to_string()))?;
        let store = Self {
            client,
            commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
        };
        store.health_check().await?;
        tracing::info!("Connected to Redis at {}", redis_url);
        Ok(store)
    }

    async fn get_connection(&self) -> RideShareResult<Connection> {
        self.client
            .get_async_connection()
            .await
            .map_err(|e| RideShareError::StoreConnection(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(conn: &mut Connection, key: &str) -> RideShareResult<Option<T>> {
        let data: Option<String> = conn.get(key).await?;
        data.map(|json| decode(&json)).transpose()
    }

    async fn get_id(conn: &mut Connection, key: &str) -> RideShareResult<Option<String>> {
        Ok(conn.get(key).await?)
    }

    async fn exists(conn: &mut Connection, key: &str) -> RideShareResult<bool> {
        Ok(conn.exists(key).await?)
    }

    /// Load every entity whose id is a member of `set_key`.
    async fn get_members<T: DeserializeOwned>(
        conn: &mut Connection,
        set_key: &str,
        key_for: fn(&str) -> String,
    ) -> RideShareResult<Vec<T>> {
        let ids: Vec<String> = conn.smembers(set_key).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| key_for(id)).collect();
        let values: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(conn).await?;

        values
            .into_iter()
            .flatten()
            .map(|json| decode(&json))
            .collect()
    }

    async fn get_by_index<T: DeserializeOwned>(
        &self,
        index_key: &str,
        key_for: fn(&str) -> String,
    ) -> RideShareResult<Option<T>> {
        let mut conn = self.get_connection().await?;
        match Self::get_id(&mut conn, index_key).await? {
            Some(id) => Self::get_json(&mut conn, &key_for(&id)).await,
            None => Ok(None),
        }
    }

    fn guard_key(guard: &Precondition) -> String {
        match guard {
            Precondition::RideRequestStatus { id, .. } => StoreKeys::ride_request(id),
            Precondition::RideStatus { id, .. }
            | Precondition::RideNotStarted { id }
            | Precondition::RideStarted { id } => StoreKeys::ride(id),
            Precondition::DriverAvailable { id, .. }
            | Precondition::DriverAbsent { id }
            | Precondition::DriverUnchanged { id, .. } => StoreKeys::driver(id),
            Precondition::UserUnchanged { id, .. } => StoreKeys::user(id),
            Precondition::PaymentStatus { id, .. } => StoreKeys::payment(id),
            Precondition::NoPaymentForRide { ride_id } => StoreKeys::payment_by_ride(ride_id),
            Precondition::NoRideForRequest { request_id } => StoreKeys::ride_by_request(request_id),
            Precondition::NoReview { ride_id, reviewer_id } => {
                StoreKeys::review_by_reviewer(ride_id, reviewer_id)
            }
            Precondition::ReviewCount { reviewed_id, .. } => StoreKeys::reviews_of(reviewed_id),
            Precondition::EmailUnclaimed { email } => StoreKeys::user_by_email(email),
            Precondition::PhoneUnclaimed { phone, .. } => StoreKeys::user_by_phone(phone),
            Precondition::PlateUnclaimed { plate } => StoreKeys::driver_by_plate(&normalize_plate(plate)),
        }
    }

    fn record_key(record: &Record) -> String {
        match record {
            Record::User(user) => StoreKeys::user(&user.id),
            Record::Credentials(credentials) => StoreKeys::credentials(&credentials.user_id),
            Record::Session(session) => StoreKeys::session(&session.token),
            Record::Driver(driver) => StoreKeys::driver(&driver.driver_id),
            Record::RideRequest(request) => StoreKeys::ride_request(&request.id),
            Record::Ride(ride) => StoreKeys::ride(&ride.id),
            Record::Payment(payment) => StoreKeys::payment(&payment.id),
            Record::Review(review) => StoreKeys::review(&review.id),
        }
    }

    async fn holds(conn: &mut Connection, guard: &Precondition) -> RideShareResult<bool> {
        let key = Self::guard_key(guard);
        let holds = match guard {
            Precondition::RideRequestStatus { expected, .. } => {
                Self::get_json::<RideRequest>(conn, &key)
                    .await?
                    .is_some_and(|r| r.status == *expected)
            }
            Precondition::RideStatus { expected, .. } => Self::get_json::<Ride>(conn, &key)
                .await?
                .is_some_and(|r| r.status == *expected),
            Precondition::RideNotStarted { .. } => Self::get_json::<Ride>(conn, &key)
                .await?
                .is_some_and(|r| !r.is_started()),
            Precondition::RideStarted { .. } => Self::get_json::<Ride>(conn, &key)
                .await?
                .is_some_and(|r| r.is_started()),
            Precondition::DriverAvailable { expected, .. } => Self::get_json::<Driver>(conn, &key)
                .await?
                .is_some_and(|d| d.is_available == *expected),
            Precondition::DriverUnchanged { updated_at, .. } => Self::get_json::<Driver>(conn, &key)
                .await?
                .is_some_and(|d| d.updated_at == *updated_at),
            Precondition::UserUnchanged { updated_at, .. } => Self::get_json::<User>(conn, &key)
                .await?
                .is_some_and(|u| u.updated_at == *updated_at),
            Precondition::PaymentStatus { expected, .. } => Self::get_json::<Payment>(conn, &key)
                .await?
                .is_some_and(|p| p.payment_status == *expected),
            Precondition::ReviewCount { expected, .. } => {
                let count: usize = conn.scard(&key).await?;
                count == *expected
            }
            Precondition::PhoneUnclaimed { except_user, .. } => {
                match Self::get_id(conn, &key).await? {
                    None => true,
                    Some(owner) => except_user.as_deref() == Some(owner.as_str()),
                }
            }
            Precondition::DriverAbsent { .. }
            | Precondition::NoPaymentForRide { .. }
            | Precondition::NoRideForRequest { .. }
            | Precondition::NoReview { .. }
            | Precondition::EmailUnclaimed { .. }
            | Precondition::PlateUnclaimed { .. } => !Self::exists(conn, &key).await?,
        };
        Ok(holds)
    }

    /// Queue the commands for one record, dropping index entries that point
    /// at the record's previous contents.
    async fn stage(conn: &mut Connection, pipe: &mut redis::Pipeline, record: &Record) -> RideShareResult<()> {
        let key = Self::record_key(record);
        match record {
            Record::User(user) => {
                if let Some(old) = Self::get_json::<User>(conn, &key).await? {
                    if !old.email.eq_ignore_ascii_case(&user.email) {
                        pipe.del(StoreKeys::user_by_email(&old.email));
                    }
                    if old.phone_number != user.phone_number {
                        pipe.del(StoreKeys::user_by_phone(&old.phone_number));
                    }
                }
                pipe.set(&key, encode(user)?)
                    .set(StoreKeys::user_by_email(&user.email), &user.id)
                    .set(StoreKeys::user_by_phone(&user.phone_number), &user.id);
            }
            Record::Credentials(credentials) => {
                pipe.set(&key, encode(credentials)?);
            }
            Record::Session(session) => {
                let ttl = (session.expires_at - Utc::now()).num_seconds().max(1);
                pipe.cmd("SET").arg(&key).arg(encode(session)?).arg("EX").arg(ttl);
            }
            Record::Driver(driver) => {
                let plate = normalize_plate(&driver.license_plate);
                if let Some(old) = Self::get_json::<Driver>(conn, &key).await? {
                    let old_plate = normalize_plate(&old.license_plate);
                    if old_plate != plate {
                        pipe.del(StoreKeys::driver_by_plate(&old_plate));
                    }
                }
                pipe.set(&key, encode(driver)?)
                    .set(StoreKeys::driver_by_plate(&plate), &driver.driver_id)
                    .sadd(StoreKeys::all_drivers(), &driver.driver_id);
            }
            Record::RideRequest(request) => {
                pipe.set(&key, encode(request)?);
            }
            Record::Ride(ride) => {
                pipe.set(&key, encode(ride)?)
                    .set(StoreKeys::ride_by_request(&ride.request_id), &ride.id)
                    .sadd(StoreKeys::all_rides(), &ride.id)
                    .sadd(StoreKeys::user_rides(&ride.driver_id), &ride.id)
                    .sadd(StoreKeys::user_rides(&ride.passenger_id), &ride.id);
            }
            Record::Payment(payment) => {
                if let Some(old) = Self::get_json::<Payment>(conn, &key).await? {
                    if let Some(old_tx) = old.transaction_id.filter(|tx| Some(tx) != payment.transaction_id.as_ref()) {
                        pipe.del(StoreKeys::payment_by_transaction(&old_tx));
                    }
                }
                pipe.set(&key, encode(payment)?)
                    .set(StoreKeys::payment_by_ride(&payment.ride_id), &payment.id);
                if let Some(tx) = &payment.transaction_id {
                    pipe.set(StoreKeys::payment_by_transaction(tx), &payment.id);
                }
            }
            Record::Review(review) => {
                pipe.set(&key, encode(review)?)
                    .set(StoreKeys::review_by_reviewer(&review.ride_id, &review.reviewer_id), &review.id)
                    .sadd(StoreKeys::reviews_of(&review.reviewed_id), &review.id);
            }
        }
        Ok(())
    }

    /// One WATCH/MULTI/EXEC round. `Ok(false)` means a watched key moved.
    async fn try_commit(&self, batch: &WriteBatch) -> RideShareResult<bool> {
        let mut conn = self.get_connection().await?;

        let mut watched: Vec<String> = batch.guards.iter().map(Self::guard_key).collect();
        watched.extend(batch.writes.iter().map(Self::record_key));
        watched.sort();
        watched.dedup();

        if !watched.is_empty() {
            redis::cmd("WATCH").arg(&watched).query_async::<_, ()>(&mut conn).await?;
        }

        for guard in &batch.guards {
            if !Self::holds(&mut conn, guard).await? {
                redis::cmd("UNWATCH").query_async::<_, ()>(&mut conn).await?;
                return Err(RideShareError::Conflict(guard.describe()));
            }
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for record in &batch.writes {
            Self::stage(&mut conn, &mut pipe, record).await?;
        }

        let result: Option<Vec<redis::Value>> = pipe.query_async(&mut conn).await?;
        if result.is_some() {
            let kinds: Vec<&str> = batch.writes.iter().map(Record::kind).collect();
            tracing::trace!("Committed {:?}", kinds);
        }
        Ok(result.is_some())
    }
}

fn encode<T: Serialize>(value: &T) -> RideShareResult<String> {
    serde_json::to_string(value).map_err(|e| RideShareError::StoreSerialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(json: &str) -> RideShareResult<T> {
    serde_json::from_str(json).map_err(|e| RideShareError::StoreSerialization(e.to_string()))
}

#[async_trait]
impl Repository for RedisStore {
    async fn get_user(&self, id: &str) -> RideShareResult<Option<User>> {
        let mut conn = self.get_connection().await?;
        Self::get_json(&mut conn, &StoreKeys::user(id)).await
    }

    async fn find_user_by_email(&self, email: &str) -> RideShareResult<Option<User>> {
        self.get_by_index(&StoreKeys::user_by_email(email), StoreKeys::user).await
    }

    async fn get_credentials(&self, user_id: &str) -> RideShareResult<Option<Credentials>> {
        let mut conn = self.get_connection().await?;
        Self::get_json(&mut conn, &StoreKeys::credentials(user_id)).await
    }

    async fn get_session(&self, token: &str) -> RideShareResult<Option<Session>> {
        let mut conn = self.get_connection().await?;
        let session: Option<Session> = Self::get_json(&mut conn, &StoreKeys::session(token)).await?;
        Ok(session.filter(|s| s.expires_at > Utc::now()))
    }

    async fn get_driver(&self, driver_id: &str) -> RideShareResult<Option<Driver>> {
        let mut conn = self.get_connection().await?;
        Self::get_json(&mut conn, &StoreKeys::driver(driver_id)).await
    }

    async fn list_drivers(&self) -> RideShareResult<Vec<Driver>> {
        let mut conn = self.get_connection().await?;
        Self::get_members(&mut conn, &StoreKeys::all_drivers(), StoreKeys::driver).await
    }

    async fn get_ride_request(&self, id: &str) -> RideShareResult<Option<RideRequest>> {
        let mut conn = self.get_connection().await?;
        Self::get_json(&mut conn, &StoreKeys::ride_request(id)).await
    }

    async fn get_ride(&self, id: &str) -> RideShareResult<Option<Ride>> {
        let mut conn = self.get_connection().await?;
        Self::get_json(&mut conn, &StoreKeys::ride(id)).await
    }

    async fn find_ride_by_request(&self, request_id: &str) -> RideShareResult<Option<Ride>> {
        self.get_by_index(&StoreKeys::ride_by_request(request_id), StoreKeys::ride).await
    }

    async fn list_rides(&self) -> RideShareResult<Vec<Ride>> {
        let mut conn = self.get_connection().await?;
        Self::get_members(&mut conn, &StoreKeys::all_rides(), StoreKeys::ride).await
    }

    async fn list_rides_for_user(&self, user_id: &str) -> RideShareResult<Vec<Ride>> {
        let mut conn = self.get_connection().await?;
        Self::get_members(&mut conn, &StoreKeys::user_rides(user_id), StoreKeys::ride).await
    }

    async fn get_payment(&self, id: &str) -> RideShareResult<Option<Payment>> {
        let mut conn = self.get_connection().await?;
        Self::get_json(&mut conn, &StoreKeys::payment(id)).await
    }

    async fn find_payment_by_ride(&self, ride_id: &str) -> RideShareResult<Option<Payment>> {
        self.get_by_index(&StoreKeys::payment_by_ride(ride_id), StoreKeys::payment).await
    }

    async fn find_payment_by_transaction(&self, transaction_id: &str) -> RideShareResult<Option<Payment>> {
        self.get_by_index(&StoreKeys::payment_by_transaction(transaction_id), StoreKeys::payment)
            .await
    }

    async fn list_reviews_for(&self, reviewed_id: &str) -> RideShareResult<Vec<Review>> {
        let mut conn = self.get_connection().await?;
        Self::get_members(&mut conn, &StoreKeys::reviews_of(reviewed_id), StoreKeys::review).await
    }

    async fn commit(&self, batch: WriteBatch) -> RideShareResult<()> {
        for attempt in 1..=self.commit_attempts {
            if self.try_commit(&batch).await? {
                return Ok(());
            }
            tracing::debug!("Watched keys changed, retrying commit (attempt {})", attempt);
        }

        tracing::warn!("Commit abandoned after {} attempts", self.commit_attempts);
        Err(RideShareError::conflict("Concurrent update, please retry"))
    }

    async fn health_check(&self) -> RideShareResult<()> {
        let mut conn = self.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
