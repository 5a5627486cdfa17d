// src/services/ride_service.rs
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::{
    errors::{RideShareError, RideShareResult},
    models::{
        outcome::Outcome,
        payment::{Payment, PaymentMethod, PaymentStatus, CURRENCY_KES},
        review::{mean_rating, CreateReview, Review},
        ride::{
            CreateRideRequest, FareEstimate, FareEstimateQuery, Ride, RideCompletion, RideRequest,
            RideRequestStatus, RideStatus, check_coordinates,
        },
        user::{Principal, UserType},
    },
    services::{
        messaging_service::{notify_best_effort, NotificationTemplate, Notifier},
        repository::{Precondition, Record, Repository, WriteBatch},
    },
    utils::{
        geo::{calculate_fare_with_time, distance_km, estimate_duration_minutes, estimate_fare, is_rush_hour},
        id_generator::{IdGenerator, IdType},
    },
};

#[async_trait]
pub trait RideOperations: Send + Sync {
    async fn create_ride_request(&self, caller: &Principal, request: CreateRideRequest) -> RideShareResult<RideRequest>;
    async fn get_ride_request(&self, caller: &Principal, request_id: &str) -> RideShareResult<RideRequest>;
    async fn accept_ride_request(&self, caller: &Principal, request_id: &str) -> RideShareResult<Outcome<Ride>>;
    async fn reject_ride_request(&self, caller: &Principal, request_id: &str) -> RideShareResult<Outcome<RideRequest>>;
    async fn cancel_ride_request(&self, caller: &Principal, request_id: &str) -> RideShareResult<RideRequest>;
    async fn start_ride(&self, caller: &Principal, ride_id: &str) -> RideShareResult<Ride>;
    async fn end_ride(&self, caller: &Principal, ride_id: &str) -> RideShareResult<Outcome<RideCompletion>>;
    async fn get_ride(&self, caller: &Principal, ride_id: &str) -> RideShareResult<Ride>;
    async fn get_rides_for_user(&self, caller: &Principal, user_id: &str) -> RideShareResult<Vec<Ride>>;
    async fn create_review(&self, caller: &Principal, review: CreateReview) -> RideShareResult<Review>;
    async fn get_reviews_for_user(&self, user_id: &str) -> RideShareResult<Vec<Review>>;
    fn estimate_fare(&self, query: &FareEstimateQuery) -> RideShareResult<FareEstimate>;
}

pub struct RideService {
    repository: Arc<dyn Repository>,
    notifier: Arc<dyn Notifier>,
}

impl RideService {
    pub fn new(repository: Arc<dyn Repository>, notifier: Arc<dyn Notifier>) -> Self {
        Self { repository, notifier }
    }

    async fn load_request(&self, request_id: &str) -> RideShareResult<RideRequest> {
        self.repository
            .get_ride_request(request_id)
            .await?
            .ok_or_else(|| RideShareError::RideRequestNotFound(request_id.to_string()))
    }

    async fn load_ride(&self, ride_id: &str) -> RideShareResult<Ride> {
        self.repository
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| RideShareError::RideNotFound(ride_id.to_string()))
    }

    fn require_assigned_driver(caller: &Principal, ride: &Ride) -> RideShareResult<()> {
        if caller.user_type != UserType::Driver || caller.user_id != ride.driver_id {
            return Err(RideShareError::forbidden("Only the assigned driver can do this"));
        }
        Ok(())
    }

    /// Move a pending request to `next`, failing with `Conflict` if someone
    /// else moved it first.
    async fn close_pending(&self, mut request: RideRequest, next: RideRequestStatus) -> RideShareResult<RideRequest> {
        if request.status != RideRequestStatus::Pending {
            return Err(RideShareError::conflict(format!(
                "Ride request {} is {}, not pending",
                request.id, request.status
            )));
        }
        request.status = next;
        request.updated_at = Utc::now();

        let batch = WriteBatch::new()
            .guard(Precondition::RideRequestStatus {
                id: request.id.clone(),
                expected: RideRequestStatus::Pending,
            })
            .put(Record::RideRequest(request.clone()));
        self.repository.commit(batch).await?;
        Ok(request)
    }
}

#[async_trait]
impl RideOperations for RideService {
    async fn create_ride_request(&self, caller: &Principal, request: CreateRideRequest) -> RideShareResult<RideRequest> {
        caller.require(UserType::Passenger, "request rides")?;
        request.validate()?;

        let distance = distance_km(
            request.pickup_latitude,
            request.pickup_longitude,
            request.dropoff_latitude,
            request.dropoff_longitude,
        );
        let now = Utc::now();
        let ride_request = RideRequest {
            id: IdGenerator::generate(IdType::RideRequest),
            passenger_id: caller.user_id.clone(),
            pickup_latitude: request.pickup_latitude,
            pickup_longitude: request.pickup_longitude,
            dropoff_latitude: request.dropoff_latitude,
            dropoff_longitude: request.dropoff_longitude,
            pickup_address: request.pickup_address.unwrap_or_default(),
            dropoff_address: request.dropoff_address.unwrap_or_default(),
            status: RideRequestStatus::Pending,
            estimated_fare: estimate_fare(distance),
            estimated_distance_km: distance,
            estimated_duration_minutes: estimate_duration_minutes(distance),
            requested_at: now,
            updated_at: now,
        };

        self.repository
            .commit(WriteBatch::new().put(Record::RideRequest(ride_request.clone())))
            .await?;

        tracing::info!(
            "Ride request {} created by {}: {:.2} km, KES {:.2}",
            ride_request.id,
            caller.user_id,
            distance,
            ride_request.estimated_fare
        );
        Ok(ride_request)
    }

    async fn get_ride_request(&self, caller: &Principal, request_id: &str) -> RideShareResult<RideRequest> {
        tracing::debug!("Getting ride request: {}", request_id);
        let request = self.load_request(request_id).await?;

        // Drivers browse requests before any of them is assigned.
        if caller.user_type != UserType::Driver {
            caller.require_self_or_admin(&request.passenger_id)?;
        }
        Ok(request)
    }

    async fn accept_ride_request(&self, caller: &Principal, request_id: &str) -> RideShareResult<Outcome<Ride>> {
        caller.require(UserType::Driver, "accept ride requests")?;

        let request = self.load_request(request_id).await?;
        if request.status != RideRequestStatus::Pending {
            return Err(RideShareError::conflict(format!(
                "Ride request {} is {}, not pending",
                request.id, request.status
            )));
        }

        let mut driver = self
            .repository
            .get_driver(&caller.user_id)
            .await?
            .ok_or_else(|| RideShareError::forbidden("Complete driver onboarding before accepting rides"))?;

        if !driver.is_approved {
            return Err(RideShareError::forbidden("Driver is not approved"));
        }
        if !driver.is_available {
            return Err(RideShareError::forbidden("Driver is not available"));
        }
        let now = Utc::now();
        let ride = Ride {
            id: IdGenerator::generate(IdType::Ride),
            request_id: request.id.clone(),
            driver_id: driver.driver_id.clone(),
            passenger_id: request.passenger_id.clone(),
            status: RideStatus::InProgress,
            start_time: None,
            end_time: None,
            actual_fare: None,
            actual_distance_km: None,
            actual_duration_minutes: None,
            created_at: now,
            updated_at: now,
        };

        let previous_driver = driver.updated_at;
        driver.is_available = false;
        driver.updated_at = now;

        let mut accepted = request;
        accepted.status = RideRequestStatus::Accepted;
        accepted.updated_at = now;

        let batch = WriteBatch::new()
            .guard(Precondition::RideRequestStatus {
                id: accepted.id.clone(),
                expected: RideRequestStatus::Pending,
            })
            .guard(Precondition::NoRideForRequest { request_id: accepted.id.clone() })
            .guard(Precondition::DriverAvailable { id: driver.driver_id.clone(), expected: true })
            .guard(Precondition::DriverUnchanged { id: driver.driver_id.clone(), updated_at: previous_driver })
            .put(Record::RideRequest(accepted.clone()))
            .put(Record::Ride(ride.clone()))
            .put(Record::Driver(driver));

        if let Err(e) = self.repository.commit(batch).await {
            tracing::warn!("Driver {} lost ride request {}: {}", caller.user_id, request_id, e);
            return Err(e);
        }

        tracing::info!("Ride request {} accepted by {}, ride {}", request_id, caller.user_id, ride.id);

        let warning = notify_best_effort(
            self.notifier.as_ref(),
            &ride.passenger_id,
            NotificationTemplate::RideAccepted,
            json!({ "ride_id": ride.id, "driver_id": ride.driver_id, "request_id": accepted.id }),
        )
        .await;

        Ok(Outcome::new(ride).warn_if(warning))
    }

    async fn reject_ride_request(&self, caller: &Principal, request_id: &str) -> RideShareResult<Outcome<RideRequest>> {
        caller.require(UserType::Driver, "reject ride requests")?;

        let request = self.load_request(request_id).await?;
        let rejected = self.close_pending(request, RideRequestStatus::Rejected).await?;
        tracing::info!("Ride request {} rejected by {}", request_id, caller.user_id);

        let warning = notify_best_effort(
            self.notifier.as_ref(),
            &rejected.passenger_id,
            NotificationTemplate::RideRejected,
            json!({ "request_id": rejected.id }),
        )
        .await;

        Ok(Outcome::new(rejected).warn_if(warning))
    }

    async fn cancel_ride_request(&self, caller: &Principal, request_id: &str) -> RideShareResult<RideRequest> {
        let request = self.load_request(request_id).await?;
        if caller.user_id != request.passenger_id {
            return Err(RideShareError::forbidden("Only the requesting passenger can cancel"));
        }

        let cancelled = self.close_pending(request, RideRequestStatus::Cancelled).await?;
        tracing::info!("Ride request {} cancelled", request_id);
        Ok(cancelled)
    }

    async fn start_ride(&self, caller: &Principal, ride_id: &str) -> RideShareResult<Ride> {
        let mut ride = self.load_ride(ride_id).await?;
        Self::require_assigned_driver(caller, &ride)?;

        if ride.status != RideStatus::InProgress {
            return Err(RideShareError::invalid_state(format!("Ride {} is {}", ride_id, ride.status)));
        }
        if ride.is_started() {
            return Err(RideShareError::conflict(format!("Ride {} has already started", ride_id)));
        }

        let now = Utc::now();
        ride.start_time = Some(now);
        ride.updated_at = now;

        let batch = WriteBatch::new()
            .guard(Precondition::RideStatus { id: ride.id.clone(), expected: RideStatus::InProgress })
            .guard(Precondition::RideNotStarted { id: ride.id.clone() })
            .put(Record::Ride(ride.clone()));
        self.repository.commit(batch).await?;

        tracing::info!("Ride {} started by {}", ride_id, caller.user_id);
        Ok(ride)
    }

    async fn end_ride(&self, caller: &Principal, ride_id: &str) -> RideShareResult<Outcome<RideCompletion>> {
        let mut ride = self.load_ride(ride_id).await?;
        Self::require_assigned_driver(caller, &ride)?;

        let start_time = match (ride.status, ride.start_time) {
            (RideStatus::InProgress, Some(start)) => start,
            (RideStatus::InProgress, None) => {
                return Err(RideShareError::invalid_state(format!("Ride {} has not started", ride_id)));
            }
            (status, _) => {
                return Err(RideShareError::invalid_state(format!("Ride {} is {}", ride_id, status)));
            }
        };

        let mut request = self.load_request(&ride.request_id).await?;
        let mut driver = self
            .repository
            .get_driver(&ride.driver_id)
            .await?
            .ok_or_else(|| RideShareError::DriverNotFound(ride.driver_id.clone()))?;

        let now = Utc::now();
        let fare = request.estimated_fare;

        ride.status = RideStatus::Completed;
        ride.end_time = Some(now);
        ride.actual_fare = Some(fare);
        ride.actual_distance_km = Some(request.estimated_distance_km);
        ride.actual_duration_minutes = Some((now - start_time).num_minutes());
        ride.updated_at = now;

        request.status = RideRequestStatus::Completed;
        request.updated_at = now;

        let previous_driver = driver.updated_at;
        driver.is_available = true;
        driver.updated_at = now;

        let payment = Payment {
            id: IdGenerator::generate(IdType::Payment),
            ride_id: ride.id.clone(),
            amount: fare,
            currency: CURRENCY_KES.to_string(),
            payment_method: PaymentMethod::Mpesa,
            transaction_id: None,
            payment_status: PaymentStatus::Pending,
            payment_date: now,
            created_at: now,
            updated_at: now,
        };

        let batch = WriteBatch::new()
            .guard(Precondition::RideStatus { id: ride.id.clone(), expected: RideStatus::InProgress })
            .guard(Precondition::RideStarted { id: ride.id.clone() })
            .guard(Precondition::NoPaymentForRide { ride_id: ride.id.clone() })
            .guard(Precondition::DriverUnchanged { id: driver.driver_id.clone(), updated_at: previous_driver })
            .put(Record::Ride(ride.clone()))
            .put(Record::RideRequest(request))
            .put(Record::Driver(driver))
            .put(Record::Payment(payment.clone()));
        self.repository.commit(batch).await?;

        tracing::info!("Ride {} completed, fare KES {:.2}, payment {}", ride_id, fare, payment.id);

        let warning = notify_best_effort(
            self.notifier.as_ref(),
            &ride.passenger_id,
            NotificationTemplate::RideCompleted,
            json!({ "ride_id": ride.id, "fare": fare, "payment_id": payment.id }),
        )
        .await;

        Ok(Outcome::new(RideCompletion {
            ride,
            payment_id: payment.id,
            total_fare: fare,
        })
        .warn_if(warning))
    }

    async fn get_ride(&self, caller: &Principal, ride_id: &str) -> RideShareResult<Ride> {
        tracing::debug!("Getting ride: {}", ride_id);
        let ride = self.load_ride(ride_id).await?;
        if !ride.involves(&caller.user_id) && !caller.is_admin() {
            return Err(RideShareError::forbidden("Access denied"));
        }
        Ok(ride)
    }

    async fn get_rides_for_user(&self, caller: &Principal, user_id: &str) -> RideShareResult<Vec<Ride>> {
        if caller.user_id != user_id {
            return Err(RideShareError::forbidden("You can only list your own rides"));
        }
        let mut rides = self.repository.list_rides_for_user(user_id).await?;
        rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tracing::debug!("Found {} rides for user {}", rides.len(), user_id);
        Ok(rides)
    }

    async fn create_review(&self, caller: &Principal, review: CreateReview) -> RideShareResult<Review> {
        review.validate()?;

        let ride = self.load_ride(&review.ride_id).await?;
        if !ride.involves(&caller.user_id) {
            return Err(RideShareError::forbidden("Only ride participants can leave a review"));
        }
        if ride.status != RideStatus::Completed {
            return Err(RideShareError::invalid_state("Only completed rides can be reviewed"));
        }
        if review.reviewed_id == caller.user_id || !ride.involves(&review.reviewed_id) {
            return Err(RideShareError::bad_request("reviewed_id must be the other participant of the ride"));
        }

        let mut reviewed = self
            .repository
            .get_user(&review.reviewed_id)
            .await?
            .ok_or_else(|| RideShareError::UserNotFound(review.reviewed_id.clone()))?;
        let mut reviews = self.repository.list_reviews_for(&reviewed.id).await?;
        let existing = reviews.len();

        let now = Utc::now();
        let created = Review {
            id: IdGenerator::generate(IdType::Review),
            ride_id: ride.id.clone(),
            reviewer_id: caller.user_id.clone(),
            reviewed_id: reviewed.id.clone(),
            rating: review.rating,
            comment: review.comment.unwrap_or_default(),
            created_at: now,
        };
        reviews.push(created.clone());

        let previous_user = reviewed.updated_at;
        reviewed.rating = mean_rating(&reviews);
        reviewed.updated_at = now;
        let new_rating = reviewed.rating;

        let batch = WriteBatch::new()
            .guard(Precondition::NoReview { ride_id: ride.id.clone(), reviewer_id: caller.user_id.clone() })
            .guard(Precondition::ReviewCount { reviewed_id: reviewed.id.clone(), expected: existing })
            .guard(Precondition::UserUnchanged { id: reviewed.id.clone(), updated_at: previous_user })
            .put(Record::Review(created.clone()))
            .put(Record::User(reviewed));
        self.repository.commit(batch).await?;

        tracing::info!(
            "Review {} on ride {}: {} rated {} ({:.2} overall)",
            created.id,
            ride.id,
            created.reviewed_id,
            created.rating,
            new_rating
        );
        Ok(created)
    }

    async fn get_reviews_for_user(&self, user_id: &str) -> RideShareResult<Vec<Review>> {
        let mut reviews = self.repository.list_reviews_for(user_id).await?;
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    fn estimate_fare(&self, query: &FareEstimateQuery) -> RideShareResult<FareEstimate> {
        let mut errors = Vec::new();
        check_coordinates("pickup_", query.pickup_latitude, query.pickup_longitude, &mut errors);
        check_coordinates("dropoff_", query.dropoff_latitude, query.dropoff_longitude, &mut errors);
        if !errors.is_empty() {
            return Err(RideShareError::ValidationFailed(errors));
        }

        let distance = distance_km(
            query.pickup_latitude,
            query.pickup_longitude,
            query.dropoff_latitude,
            query.dropoff_longitude,
        );
        let duration = estimate_duration_minutes(distance);
        let rush = is_rush_hour(Utc::now());

        Ok(FareEstimate {
            distance_km: distance,
            duration_minutes: duration,
            estimated_fare: estimate_fare(distance),
            time_based_fare: calculate_fare_with_time(distance, duration, rush),
            is_rush_hour: rush,
            currency: CURRENCY_KES.to_string(),
        })
    }
}
