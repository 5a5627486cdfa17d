// src/services/driver_service.rs
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::{
    errors::{RideShareError, RideShareResult},
    models::{
        driver::{
            normalize_plate, Driver, DriverApprovalUpdate, DriverAvailabilityUpdate, DriverLocation,
            DriverLocationUpdate, DriverOnboarding, NearbyDriver, NearbyDriversQuery,
        },
        ride::{check_coordinates, RideStatus},
        user::{Principal, UserType},
    },
    services::repository::{Precondition, Record, Repository, WriteBatch},
    utils::geo::distance_km,
};

pub const DEFAULT_SEARCH_RADIUS_KM: f64 = 5.0;

#[async_trait]
pub trait DriverOperations: Send + Sync {
    async fn onboard_driver(&self, caller: &Principal, onboarding: DriverOnboarding) -> RideShareResult<Driver>;
    async fn get_driver(&self, driver_id: &str) -> RideShareResult<Driver>;
    async fn set_approval(&self, caller: &Principal, driver_id: &str, update: DriverApprovalUpdate) -> RideShareResult<Driver>;
    async fn update_location(&self, caller: &Principal, driver_id: &str, update: DriverLocationUpdate) -> RideShareResult<DriverLocation>;
    async fn get_location(&self, driver_id: &str) -> RideShareResult<DriverLocation>;
    async fn set_availability(&self, caller: &Principal, driver_id: &str, update: DriverAvailabilityUpdate) -> RideShareResult<Driver>;
    async fn find_nearby_drivers(&self, query: NearbyDriversQuery) -> RideShareResult<Vec<NearbyDriver>>;
}

pub struct DriverService {
    repository: Arc<dyn Repository>,
}

impl DriverService {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    async fn load_driver(&self, driver_id: &str) -> RideShareResult<Driver> {
        self.repository
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| RideShareError::DriverNotFound(driver_id.to_string()))
    }

    fn require_own_profile(caller: &Principal, driver_id: &str, action: &str) -> RideShareResult<()> {
        if caller.user_type != UserType::Driver || caller.user_id != driver_id {
            return Err(RideShareError::forbidden(format!("You can only {} for yourself", action)));
        }
        Ok(())
    }

    /// Overwrite a driver read earlier, failing if anyone wrote it since.
    async fn save(&self, previous_updated_at: chrono::DateTime<Utc>, driver: &Driver) -> RideShareResult<()> {
        let batch = WriteBatch::new()
            .guard(Precondition::DriverUnchanged {
                id: driver.driver_id.clone(),
                updated_at: previous_updated_at,
            })
            .put(Record::Driver(driver.clone()));
        self.repository.commit(batch).await
    }
}

#[async_trait]
impl DriverOperations for DriverService {
    async fn onboard_driver(&self, caller: &Principal, onboarding: DriverOnboarding) -> RideShareResult<Driver> {
        caller.require(UserType::Driver, "onboard as drivers")?;
        onboarding.validate()?;

        tracing::info!("Onboarding driver: {}", caller.user_id);

        let now = Utc::now();
        let driver = Driver {
            driver_id: caller.user_id.clone(),
            vehicle_make: onboarding.vehicle_make.trim().to_string(),
            vehicle_model: onboarding.vehicle_model.trim().to_string(),
            vehicle_year: onboarding.vehicle_year,
            license_plate: normalize_plate(&onboarding.license_plate),
            driver_license_number: onboarding.driver_license_number.trim().to_string(),
            insurance_details: onboarding.insurance_details.unwrap_or_default().trim().to_string(),
            is_approved: false,
            is_available: false,
            current_latitude: None,
            current_longitude: None,
            last_location_update: None,
            created_at: now,
            updated_at: now,
        };

        let batch = WriteBatch::new()
            .guard(Precondition::DriverAbsent { id: driver.driver_id.clone() })
            .guard(Precondition::PlateUnclaimed { plate: driver.license_plate.clone() })
            .put(Record::Driver(driver.clone()));
        self.repository.commit(batch).await?;

        tracing::info!("Driver onboarded, awaiting approval: {}", driver.driver_id);
        Ok(driver)
    }

    async fn get_driver(&self, driver_id: &str) -> RideShareResult<Driver> {
        tracing::debug!("Getting driver: {}", driver_id);
        self.load_driver(driver_id).await
    }

    async fn set_approval(&self, caller: &Principal, driver_id: &str, update: DriverApprovalUpdate) -> RideShareResult<Driver> {
        caller.require(UserType::Admin, "approve drivers")?;

        let mut driver = self.load_driver(driver_id).await?;
        let previous = driver.updated_at;
        driver.is_approved = update.is_approved;
        if !update.is_approved {
            // Unapproved drivers are never offered requests.
            driver.is_available = false;
        }
        driver.updated_at = Utc::now();
        self.save(previous, &driver).await?;

        tracing::info!("Driver {} approval set to {} by {}", driver_id, update.is_approved, caller.user_id);
        Ok(driver)
    }

    async fn update_location(&self, caller: &Principal, driver_id: &str, update: DriverLocationUpdate) -> RideShareResult<DriverLocation> {
        Self::require_own_profile(caller, driver_id, "update the location")?;
        update.validate()?;

        let mut driver = self.load_driver(driver_id).await?;
        let previous = driver.updated_at;
        let now = Utc::now();
        driver.current_latitude = Some(update.latitude);
        driver.current_longitude = Some(update.longitude);
        driver.last_location_update = Some(now);
        driver.updated_at = now;
        self.save(previous, &driver).await?;

        tracing::debug!("Driver {} at {:.6},{:.6}", driver_id, update.latitude, update.longitude);
        Ok(DriverLocation {
            driver_id: driver.driver_id,
            latitude: update.latitude,
            longitude: update.longitude,
            last_location_update: Some(now),
        })
    }

    async fn get_location(&self, driver_id: &str) -> RideShareResult<DriverLocation> {
        let driver = self.load_driver(driver_id).await?;
        let (latitude, longitude) = driver
            .position()
            .ok_or_else(|| RideShareError::not_found("Driver location not available"))?;

        Ok(DriverLocation {
            driver_id: driver.driver_id,
            latitude,
            longitude,
            last_location_update: driver.last_location_update,
        })
    }

    async fn set_availability(&self, caller: &Principal, driver_id: &str, update: DriverAvailabilityUpdate) -> RideShareResult<Driver> {
        Self::require_own_profile(caller, driver_id, "change availability")?;

        let mut driver = self.load_driver(driver_id).await?;
        if update.is_available {
            if !driver.is_approved {
                return Err(RideShareError::forbidden("Driver is not approved"));
            }
            let busy = self
                .repository
                .list_rides_for_user(driver_id)
                .await?
                .iter()
                .any(|r| r.driver_id == driver_id && r.status == RideStatus::InProgress);
            if busy {
                return Err(RideShareError::invalid_state(
                    "Cannot go available while a ride is in progress",
                ));
            }
        }

        let previous = driver.updated_at;
        driver.is_available = update.is_available;
        driver.updated_at = Utc::now();
        self.save(previous, &driver).await?;

        tracing::info!("Driver {} availability: {}", driver_id, update.is_available);
        Ok(driver)
    }

    async fn find_nearby_drivers(&self, query: NearbyDriversQuery) -> RideShareResult<Vec<NearbyDriver>> {
        let mut errors = Vec::new();
        check_coordinates("", query.latitude, query.longitude, &mut errors);
        if !errors.is_empty() {
            return Err(RideShareError::ValidationFailed(errors));
        }
        let radius = query.radius.unwrap_or(DEFAULT_SEARCH_RADIUS_KM);
        if !radius.is_finite() || radius <= 0.0 {
            return Err(RideShareError::validation_error("radius", "Radius must be a positive number of kilometres"));
        }

        let candidates: Vec<(Driver, f64)> = self
            .repository
            .list_drivers()
            .await?
            .into_iter()
            .filter(Driver::can_accept_rides)
            .filter_map(|d| {
                let (lat, lon) = d.position()?;
                let distance = distance_km(query.latitude, query.longitude, lat, lon);
                (distance <= radius).then_some((d, distance))
            })
            .collect();

        let mut nearby = Vec::with_capacity(candidates.len());
        for (driver, distance) in candidates {
            // Drivers whose user record is gone are skipped.
            let Some(user) = self.repository.get_user(&driver.driver_id).await? else {
                continue;
            };
            let (latitude, longitude) = driver.position().unwrap_or_default();
            nearby.push(NearbyDriver {
                driver_id: driver.driver_id,
                first_name: user.first_name,
                last_name: user.last_name,
                rating: user.rating,
                vehicle_make: driver.vehicle_make,
                vehicle_model: driver.vehicle_model,
                license_plate: driver.license_plate,
                latitude,
                longitude,
                distance_km: distance,
            });
        }

        nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        tracing::debug!("Found {} drivers within {} km", nearby.len(), radius);
        Ok(nearby)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::User;
    use crate::services::memory_store::MemoryStore;

    fn principal(id: &str, user_type: UserType) -> Principal {
        Principal { user_id: id.to_string(), user_type }
    }

    fn onboarding(plate: &str) -> DriverOnboarding {
        DriverOnboarding {
            vehicle_make: "Toyota".into(),
            vehicle_model: "Axio".into(),
            vehicle_year: Some(2018),
            license_plate: plate.into(),
            driver_license_number: "DL-001".into(),
            insurance_details: Some("Jubilee 2025".into()),
        }
    }

    async fn seed_user(store: &MemoryStore, id: &str, name: &str) {
        let now = Utc::now();
        let user = User {
            id: id.into(),
            user_type: UserType::Driver,
            first_name: name.into(),
            last_name: "Mwangi".into(),
            email: format!("{}@example.co.ke", id),
            phone_number: "254700000001".into(),
            is_email_verified: false,
            rating: 4.5,
            device_tokens: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        store.commit(WriteBatch::new().put(Record::User(user))).await.unwrap();
    }

    async fn ready_driver(service: &DriverService, id: &str, plate: &str, lat: f64, lon: f64) {
        let me = principal(id, UserType::Driver);
        let admin = principal("usr-admin", UserType::Admin);
        service.onboard_driver(&me, onboarding(plate)).await.unwrap();
        service.set_approval(&admin, id, DriverApprovalUpdate { is_approved: true }).await.unwrap();
        service.set_availability(&me, id, DriverAvailabilityUpdate { is_available: true }).await.unwrap();
        service.update_location(&me, id, DriverLocationUpdate { latitude: lat, longitude: lon }).await.unwrap();
    }

    #[tokio::test]
    async fn onboarding_is_driver_only_and_once() {
        let service = DriverService::new(Arc::new(MemoryStore::new()));
        let passenger = principal("usr-p", UserType::Passenger);
        assert!(matches!(
            service.onboard_driver(&passenger, onboarding("KCA 001A")).await,
            Err(RideShareError::Forbidden(_))
        ));

        let driver = principal("usr-d", UserType::Driver);
        let created = service.onboard_driver(&driver, onboarding("kca 001a")).await.unwrap();
        assert_eq!(created.license_plate, "KCA001A");
        assert!(!created.is_approved);
        assert!(!created.is_available);

        assert!(service.onboard_driver(&driver, onboarding("KCB 002B")).await.unwrap_err().is_conflict());

        let other = principal("usr-e", UserType::Driver);
        assert!(service.onboard_driver(&other, onboarding("KCA001A")).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn only_admins_approve_and_unapproved_cannot_go_available() {
        let service = DriverService::new(Arc::new(MemoryStore::new()));
        let me = principal("usr-d", UserType::Driver);
        service.onboard_driver(&me, onboarding("KCA 001A")).await.unwrap();

        assert!(service.set_approval(&me, "usr-d", DriverApprovalUpdate { is_approved: true }).await.is_err());
        assert!(matches!(
            service.set_availability(&me, "usr-d", DriverAvailabilityUpdate { is_available: true }).await,
            Err(RideShareError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn location_round_trip_and_ownership() {
        let service = DriverService::new(Arc::new(MemoryStore::new()));
        let me = principal("usr-d", UserType::Driver);
        service.onboard_driver(&me, onboarding("KCA 001A")).await.unwrap();

        assert!(service.get_location("usr-d").await.is_err());
        service
            .update_location(&me, "usr-d", DriverLocationUpdate { latitude: -1.2921, longitude: 36.8219 })
            .await
            .unwrap();
        let location = service.get_location("usr-d").await.unwrap();
        assert_eq!((location.latitude, location.longitude), (-1.2921, 36.8219));

        let intruder = principal("usr-x", UserType::Driver);
        assert!(matches!(
            service
                .update_location(&intruder, "usr-d", DriverLocationUpdate { latitude: 0.0, longitude: 0.0 })
                .await,
            Err(RideShareError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn nearby_filters_by_radius_and_sorts() {
        let store = Arc::new(MemoryStore::new());
        seed_user(&store, "usr-near", "Kamau").await;
        seed_user(&store, "usr-mid", "Otieno").await;
        seed_user(&store, "usr-far", "Kiprop").await;
        let service = DriverService::new(store.clone());

        // Nairobi CBD, Westlands (~3.5 km), Thika (~40 km)
        ready_driver(&service, "usr-mid", "KCB 200B", -1.2676, 36.8108).await;
        ready_driver(&service, "usr-near", "KCA 100A", -1.2864, 36.8172).await;
        ready_driver(&service, "usr-far", "KCC 300C", -1.0333, 37.0693).await;

        let found = service
            .find_nearby_drivers(NearbyDriversQuery { latitude: -1.2921, longitude: 36.8219, radius: None })
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|d| d.driver_id.as_str()).collect();
        assert_eq!(ids, vec!["usr-near", "usr-mid"]);
        assert_eq!(found[0].first_name, "Kamau");

        let bad = service
            .find_nearby_drivers(NearbyDriversQuery { latitude: -1.29, longitude: 36.82, radius: Some(-1.0) })
            .await;
        assert!(bad.is_err());
    }
}
