// src/services/report_service.rs
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use futures::future::join_all;
use std::sync::Arc;

use crate::{
    errors::{RideShareError, RideShareResult},
    models::{
        compliance::{CommissionBreakdown, ComplianceReport, NtsaRideData},
        ride::{Ride, RideStatus},
        user::{Principal, UserType},
    },
    services::repository::Repository,
};

const UNKNOWN_DRIVER: &str = "Unknown Driver";
const UNKNOWN_LOCATION: &str = "Unknown";

pub struct ReportService {
    repository: Arc<dyn Repository>,
}

/// Inclusive reporting window. A bare date covers the whole UTC day.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    pub fn parse(start: &str, end: &str) -> RideShareResult<Self> {
        let start_at = parse_bound("start_date", start, NaiveTime::MIN)?;
        let end_at = parse_bound("end_date", end, last_instant_of_day())?;
        if start_at > end_at {
            return Err(RideShareError::validation_error("end_date", "end_date must not precede start_date"));
        }
        Ok(Self { start: start_at, end: end_at })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

fn last_instant_of_day() -> NaiveTime {
    NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN)
}

fn parse_bound(field: &str, raw: &str, time_of_day: NaiveTime) -> RideShareResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(time_of_day)));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RideShareError::validation_error(field, format!("{} must be YYYY-MM-DD or RFC 3339", field)))
}

fn format_point(latitude: f64, longitude: f64) -> String {
    format!("{:.6},{:.6}", latitude, longitude)
}

impl ReportService {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// NTSA report over completed rides created inside the window. Driver or
    /// request lookups that are missing or fail degrade to placeholders.
    pub async fn generate_compliance_report(
        &self,
        caller: &Principal,
        start_date: &str,
        end_date: &str,
    ) -> RideShareResult<ComplianceReport> {
        caller.require(UserType::Admin, "generate compliance reports")?;
        let window = ReportWindow::parse(start_date, end_date)?;

        let mut rides: Vec<Ride> = self
            .repository
            .list_rides()
            .await?
            .into_iter()
            .filter(|r| r.status == RideStatus::Completed && window.contains(r.created_at))
            .collect();
        rides.sort_by_key(|r| r.created_at);

        let total_revenue: f64 = rides.iter().filter_map(|r| r.actual_fare).sum();
        let entries = join_all(rides.into_iter().map(|ride| self.describe_ride(ride))).await;

        tracing::info!(
            "NTSA report {} to {}: {} rides, KES {:.2}",
            start_date,
            end_date,
            entries.len(),
            total_revenue
        );

        Ok(ComplianceReport {
            report_period: format!("{} to {}", start_date, end_date),
            generated_at: Utc::now(),
            total_rides: entries.len(),
            total_revenue,
            rides: entries,
        })
    }

    async fn driver_name(&self, driver_id: &str) -> String {
        let user = match self.repository.get_driver(driver_id).await {
            Ok(Some(_)) => self.repository.get_user(driver_id).await,
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        match user {
            Ok(Some(user)) => user.full_name(),
            Ok(None) => UNKNOWN_DRIVER.to_string(),
            Err(e) => {
                tracing::warn!("Report lookup for driver {} failed: {}", driver_id, e);
                UNKNOWN_DRIVER.to_string()
            }
        }
    }

    async fn describe_ride(&self, ride: Ride) -> NtsaRideData {
        let driver_name = self.driver_name(&ride.driver_id).await;

        let (pickup_location, dropoff_location) = match self.repository.get_ride_request(&ride.request_id).await {
            Ok(Some(request)) => (
                format_point(request.pickup_latitude, request.pickup_longitude),
                format_point(request.dropoff_latitude, request.dropoff_longitude),
            ),
            Ok(None) => (UNKNOWN_LOCATION.to_string(), UNKNOWN_LOCATION.to_string()),
            Err(e) => {
                tracing::warn!("Report lookup for request {} failed: {}", ride.request_id, e);
                (UNKNOWN_LOCATION.to_string(), UNKNOWN_LOCATION.to_string())
            }
        };

        NtsaRideData {
            commission_amount: ride.actual_fare.map(|fare| CommissionBreakdown::for_fare(fare).commission_amount),
            ride_id: ride.id,
            driver_id: ride.driver_id,
            driver_name,
            passenger_id: ride.passenger_id,
            start_time: ride.start_time,
            end_time: ride.end_time,
            pickup_location,
            dropoff_location,
            distance_km: ride.actual_distance_km,
            duration_minutes: ride.actual_duration_minutes,
            fare: ride.actual_fare,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            driver::Driver,
            payment::Payment,
            review::Review,
            ride::RideRequest,
            user::{Credentials, Session, User},
        },
        services::{
            memory_store::MemoryStore,
            repository::{Record, WriteBatch},
        },
    };

    fn completed_ride(id: &str, created_at: DateTime<Utc>, fare: f64) -> Ride {
        Ride {
            id: id.into(),
            request_id: format!("req-of-{}", id),
            driver_id: "usr-ghost".into(),
            passenger_id: "usr-p".into(),
            status: RideStatus::Completed,
            start_time: Some(created_at),
            end_time: Some(created_at + chrono::Duration::minutes(12)),
            actual_fare: Some(fare),
            actual_distance_km: Some(4.0),
            actual_duration_minutes: Some(12),
            created_at,
            updated_at: created_at,
        }
    }

    fn admin() -> Principal {
        Principal { user_id: "usr-a".into(), user_type: UserType::Admin }
    }

    #[test]
    fn window_parsing() {
        let window = ReportWindow::parse("2025-01-01", "2025-01-31").unwrap();
        assert!(window.contains(Utc.with_ymd_and_hms(2025, 1, 31, 23, 0, 0).unwrap()));
        assert!(!window.contains(Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()));

        assert!(ReportWindow::parse("2025-02-01", "2025-01-01").is_err());
        assert!(ReportWindow::parse("last week", "2025-01-01").is_err());
        assert!(ReportWindow::parse("2025-01-01T00:00:00Z", "2025-01-01T12:00:00+03:00").is_ok());
    }

    #[tokio::test]
    async fn report_uses_placeholders_and_window() {
        let store = Arc::new(MemoryStore::new());
        let inside = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2025, 4, 10, 8, 0, 0).unwrap();
        let mut cancelled = completed_ride("rid-c", inside, 999.0);
        cancelled.status = RideStatus::Cancelled;

        store
            .commit(
                WriteBatch::new()
                    .put(Record::Ride(completed_ride("rid-1", inside, 200.0)))
                    .put(Record::Ride(completed_ride("rid-2", outside, 300.0)))
                    .put(Record::Ride(cancelled)),
            )
            .await
            .unwrap();

        let service = ReportService::new(store);
        let report = service
            .generate_compliance_report(&admin(), "2025-03-01", "2025-03-31")
            .await
            .unwrap();

        assert_eq!(report.report_period, "2025-03-01 to 2025-03-31");
        assert_eq!(report.total_rides, 1);
        assert!((report.total_revenue - 200.0).abs() < 1e-9);

        let entry = &report.rides[0];
        assert_eq!(entry.driver_name, "Unknown Driver");
        assert_eq!(entry.pickup_location, "Unknown");
        assert_eq!(entry.dropoff_location, "Unknown");
        assert!((entry.commission_amount.unwrap() - 36.0).abs() < 1e-9);
    }

    /// Store whose driver and request reads fail.
    struct FlakyLookups(MemoryStore);

    #[async_trait::async_trait]
    impl Repository for FlakyLookups {
        async fn get_user(&self, id: &str) -> RideShareResult<Option<User>> {
            self.0.get_user(id).await
        }
        async fn find_user_by_email(&self, email: &str) -> RideShareResult<Option<User>> {
            self.0.find_user_by_email(email).await
        }
        async fn get_credentials(&self, user_id: &str) -> RideShareResult<Option<Credentials>> {
            self.0.get_credentials(user_id).await
        }
        async fn get_session(&self, token: &str) -> RideShareResult<Option<Session>> {
            self.0.get_session(token).await
        }
        async fn get_driver(&self, _driver_id: &str) -> RideShareResult<Option<Driver>> {
            Err(RideShareError::StoreSerialization("bad driver record".into()))
        }
        async fn list_drivers(&self) -> RideShareResult<Vec<Driver>> {
            self.0.list_drivers().await
        }
        async fn get_ride_request(&self, _id: &str) -> RideShareResult<Option<RideRequest>> {
            Err(RideShareError::StoreConnection("connection reset".into()))
        }
        async fn get_ride(&self, id: &str) -> RideShareResult<Option<Ride>> {
            self.0.get_ride(id).await
        }
        async fn find_ride_by_request(&self, request_id: &str) -> RideShareResult<Option<Ride>> {
            self.0.find_ride_by_request(request_id).await
        }
        async fn list_rides(&self) -> RideShareResult<Vec<Ride>> {
            self.0.list_rides().await
        }
        async fn list_rides_for_user(&self, user_id: &str) -> RideShareResult<Vec<Ride>> {
            self.0.list_rides_for_user(user_id).await
        }
        async fn get_payment(&self, id: &str) -> RideShareResult<Option<Payment>> {
            self.0.get_payment(id).await
        }
        async fn find_payment_by_ride(&self, ride_id: &str) -> RideShareResult<Option<Payment>> {
            self.0.find_payment_by_ride(ride_id).await
        }
        async fn find_payment_by_transaction(&self, transaction_id: &str) -> RideShareResult<Option<Payment>> {
            self.0.find_payment_by_transaction(transaction_id).await
        }
        async fn list_reviews_for(&self, reviewed_id: &str) -> RideShareResult<Vec<Review>> {
            self.0.list_reviews_for(reviewed_id).await
        }
        async fn commit(&self, batch: WriteBatch) -> RideShareResult<()> {
            self.0.commit(batch).await
        }
        async fn health_check(&self) -> RideShareResult<()> {
            self.0.health_check().await
        }
    }

    #[tokio::test]
    async fn failed_lookups_degrade_to_placeholders() {
        let store = MemoryStore::new();
        let at = Utc.with_ymd_and_hms(2025, 5, 2, 9, 30, 0).unwrap();
        store
            .commit(
                WriteBatch::new()
                    .put(Record::Ride(completed_ride("rid-1", at, 250.0)))
                    .put(Record::Ride(completed_ride("rid-2", at + chrono::Duration::hours(1), 150.0))),
            )
            .await
            .unwrap();

        let service = ReportService::new(Arc::new(FlakyLookups(store)));
        let report = service
            .generate_compliance_report(&admin(), "2025-05-01", "2025-05-31")
            .await
            .unwrap();

        assert_eq!(report.total_rides, 2);
        assert!((report.total_revenue - 400.0).abs() < 1e-9);
        for entry in &report.rides {
            assert_eq!(entry.driver_name, "Unknown Driver");
            assert_eq!(entry.pickup_location, "Unknown");
            assert_eq!(entry.dropoff_location, "Unknown");
        }
        assert_eq!(report.rides[0].ride_id, "rid-1");
    }

    #[tokio::test]
    async fn only_admins_generate_reports() {
        let service = ReportService::new(Arc::new(MemoryStore::new()));
        let driver = Principal { user_id: "usr-d".into(), user_type: UserType::Driver };
        assert!(matches!(
            service.generate_compliance_report(&driver, "2025-01-01", "2025-01-31").await,
            Err(RideShareError::Forbidden(_))
        ));
    }
}
