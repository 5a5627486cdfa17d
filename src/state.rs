// src/state.rs
use std::sync::Arc;

use crate::{
    config::{AppConfig, Environment, StoreBackend},
    errors::RideShareResult,
    services::{
        compliance_service::{ComplianceOperations, ComplianceService},
        driver_service::{DriverOperations, DriverService},
        identity_service::IdentityService,
        memory_store::MemoryStore,
        messaging_service::{FcmNotifier, LogNotifier, Notifier},
        mpesa_gateway::{DarajaGateway, MockGateway, PaymentGateway},
        payment_service::{PaymentOperations, PaymentService},
        redis_store::RedisStore,
        report_service::ReportService,
        repository::Repository,
        ride_service::{RideOperations, RideService},
    },
};

pub struct AppState {
    pub repository: Arc<dyn Repository>,
    pub identity: Arc<IdentityService>,
    pub driver_service: Arc<dyn DriverOperations>,
    pub ride_service: Arc<dyn RideOperations>,
    pub payment_service: Arc<dyn PaymentOperations>,
    pub compliance_service: Arc<dyn ComplianceOperations>,
    pub report_service: Arc<ReportService>,
    pub config: AppConfig,
}

impl AppState {
    pub async fn new(config: AppConfig) -> RideShareResult<Self> {
        let repository: Arc<dyn Repository> = match config.store.backend {
            StoreBackend::Redis => Arc::new(RedisStore::connect(&config.store.redis_url).await?),
            StoreBackend::Memory => {
                tracing::warn!("STORE_BACKEND=memory, data will not survive a restart");
                Arc::new(MemoryStore::new())
            }
        };

        let notifier: Arc<dyn Notifier> = match config.fcm.clone() {
            Some(fcm) => Arc::new(FcmNotifier::new(fcm, repository.clone())),
            None => {
                tracing::warn!("FCM_SERVER_KEY not set, using log notifier");
                Arc::new(LogNotifier::new())
            }
        };

        let gateway: Arc<dyn PaymentGateway> = match config.environment {
            Environment::Development => {
                tracing::warn!("Development environment, M-Pesa calls are mocked");
                Arc::new(MockGateway::new())
            }
            environment => Arc::new(DarajaGateway::new(config.mpesa.clone(), environment)?),
        };

        Ok(Self::with_collaborators(config, repository, gateway, notifier))
    }

    /// Wire services around already-built collaborators.
    pub fn with_collaborators(
        config: AppConfig,
        repository: Arc<dyn Repository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let identity = Arc::new(IdentityService::new(
            repository.clone(),
            notifier.clone(),
            config.session_ttl_hours,
            config.password_hash_cost,
        ));
        let driver_service = Arc::new(DriverService::new(repository.clone()));
        let ride_service = Arc::new(RideService::new(repository.clone(), notifier.clone()));
        let payment_service = Arc::new(PaymentService::new(repository.clone(), gateway, notifier));
        let compliance_service = Arc::new(ComplianceService::new(repository.clone()));
        let report_service = Arc::new(ReportService::new(repository.clone()));

        Self {
            repository,
            identity,
            driver_service,
            ride_service,
            payment_service,
            compliance_service,
            report_service,
            config,
        }
    }
}
