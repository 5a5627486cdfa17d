pub mod compliance_service;
pub mod driver_service;
pub mod identity_service;
pub mod memory_store;
pub mod messaging_service;
pub mod mpesa_gateway;
pub mod payment_service;
pub mod redis_store;
pub mod report_service;
pub mod repository;
pub mod ride_service;
