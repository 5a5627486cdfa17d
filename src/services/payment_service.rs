// src/services/payment_service.rs
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    errors::{RideShareError, RideShareResult},
    models::{
        outcome::Outcome,
        payment::{Payment, PaymentMethod, PaymentStatus, StkPushRequest, StkPushResponse, CURRENCY_KES},
        ride::RideStatus,
        user::Principal,
    },
    services::{
        messaging_service::{notify_best_effort, NotificationTemplate, Notifier},
        mpesa_gateway::{account_reference, parse_stk_callback, PaymentGateway},
        repository::{Precondition, Record, Repository, WriteBatch},
    },
    utils::{
        id_generator::{IdGenerator, IdType},
        phone::parse_kenyan_mobile,
    },
};

const AMOUNT_TOLERANCE: f64 = 0.005;

#[async_trait]
pub trait PaymentOperations: Send + Sync {
    async fn initiate_stk_push(&self, caller: &Principal, request: StkPushRequest) -> RideShareResult<StkPushResponse>;
    async fn handle_callback(&self, payload: Value) -> RideShareResult<Outcome<Payment>>;
    async fn get_payment(&self, caller: &Principal, payment_id: &str) -> RideShareResult<Payment>;
}

pub struct PaymentService {
    repository: Arc<dyn Repository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
}

impl PaymentService {
    pub fn new(repository: Arc<dyn Repository>, gateway: Arc<dyn PaymentGateway>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            repository,
            gateway,
            notifier,
        }
    }

    async fn notify_passenger(&self, payment: &Payment) -> Option<String> {
        let passenger = match self.repository.get_ride(&payment.ride_id).await {
            Ok(Some(ride)) => ride.passenger_id,
            Ok(None) => return Some(format!("Ride {} not found for payment notification", payment.ride_id)),
            Err(e) => return Some(format!("Could not load ride for payment notification: {}", e)),
        };

        let template = match payment.payment_status {
            PaymentStatus::Completed => NotificationTemplate::PaymentCompleted,
            _ => NotificationTemplate::PaymentFailed,
        };
        notify_best_effort(
            self.notifier.as_ref(),
            &passenger,
            template,
            json!({
                "payment_id": payment.id,
                "ride_id": payment.ride_id,
                "amount": payment.amount,
                "receipt_number": payment.transaction_id,
            }),
        )
        .await
    }
}

#[async_trait]
impl PaymentOperations for PaymentService {
    async fn initiate_stk_push(&self, caller: &Principal, request: StkPushRequest) -> RideShareResult<StkPushResponse> {
        let phone = parse_kenyan_mobile("phone_number", &request.phone_number)?;

        let ride = self
            .repository
            .get_ride(&request.ride_id)
            .await?
            .ok_or_else(|| RideShareError::RideNotFound(request.ride_id.clone()))?;
        if caller.user_id != ride.passenger_id {
            return Err(RideShareError::forbidden("Only the ride's passenger can pay for it"));
        }
        if ride.status != RideStatus::Completed {
            return Err(RideShareError::invalid_state(format!("Ride {} is {}", ride.id, ride.status)));
        }

        let amount = ride
            .actual_fare
            .filter(|fare| fare.is_finite() && *fare > 0.0)
            .ok_or_else(|| RideShareError::invalid_state(format!("Ride {} has no fare to charge", ride.id)))?;
        if let Some(requested) = request.amount {
            if (requested - amount).abs() > AMOUNT_TOLERANCE {
                return Err(RideShareError::validation_error(
                    "amount",
                    format!("Amount must equal the ride fare of KES {:.2}", amount),
                ));
            }
        }

        let existing = self.repository.find_payment_by_ride(&ride.id).await?;
        if let Some(payment) = &existing {
            if payment.payment_status == PaymentStatus::Completed {
                return Err(RideShareError::conflict(format!("Payment for ride {} is already completed", ride.id)));
            }
        }

        let pending = self
            .gateway
            .initiate_push(&phone, amount, &account_reference(&ride.id))
            .await
            .map_err(|e| {
                tracing::error!("STK push for ride {} failed: {}", ride.id, e);
                RideShareError::from(e)
            })?;

        let now = Utc::now();
        let (payment, guard) = match existing {
            Some(mut payment) => {
                let guard = Precondition::PaymentStatus {
                    id: payment.id.clone(),
                    expected: payment.payment_status,
                };
                payment.amount = amount;
                payment.payment_method = PaymentMethod::Mpesa;
                payment.transaction_id = Some(pending.checkout_request_id.clone());
                payment.payment_status = PaymentStatus::Pending;
                payment.updated_at = now;
                (payment, guard)
            }
            None => {
                let payment = Payment {
                    id: IdGenerator::generate(IdType::Payment),
                    ride_id: ride.id.clone(),
                    amount,
                    currency: CURRENCY_KES.to_string(),
                    payment_method: PaymentMethod::Mpesa,
                    transaction_id: Some(pending.checkout_request_id.clone()),
                    payment_status: PaymentStatus::Pending,
                    payment_date: now,
                    created_at: now,
                    updated_at: now,
                };
                (payment, Precondition::NoPaymentForRide { ride_id: ride.id.clone() })
            }
        };

        let batch = WriteBatch::new().guard(guard).put(Record::Payment(payment.clone()));
        self.repository.commit(batch).await?;

        tracing::info!(
            "STK push sent for ride {}, payment {}, checkout {}",
            ride.id,
            payment.id,
            pending.checkout_request_id
        );

        Ok(StkPushResponse {
            message: "STK push sent".to_string(),
            payment_id: payment.id,
            checkout_request_id: pending.checkout_request_id,
            customer_message: pending.customer_message,
        })
    }

    async fn handle_callback(&self, payload: Value) -> RideShareResult<Outcome<Payment>> {
        let result = parse_stk_callback(payload)?;
        tracing::info!(
            "M-Pesa callback for {}: code {} ({})",
            result.checkout_request_id,
            result.result_code,
            result.result_description.as_deref().unwrap_or("")
        );

        let mut payment = self
            .repository
            .find_payment_by_transaction(&result.checkout_request_id)
            .await?
            .ok_or_else(|| RideShareError::PaymentNotFound(result.checkout_request_id.clone()))?;

        if payment.payment_status != PaymentStatus::Pending {
            tracing::warn!(
                "Ignoring callback for payment {}: already {:?}",
                payment.id,
                payment.payment_status
            );
            return Ok(Outcome::new(payment));
        }

        let now = Utc::now();
        if result.is_success() {
            payment.payment_status = PaymentStatus::Completed;
            if let Some(receipt) = result.receipt_number.clone() {
                payment.transaction_id = Some(receipt);
            }
            payment.payment_date = now;
        } else {
            payment.payment_status = PaymentStatus::Failed;
        }
        payment.updated_at = now;

        let batch = WriteBatch::new()
            .guard(Precondition::PaymentStatus {
                id: payment.id.clone(),
                expected: PaymentStatus::Pending,
            })
            .put(Record::Payment(payment.clone()));
        self.repository.commit(batch).await?;

        tracing::info!("Payment {} settled as {:?}", payment.id, payment.payment_status);

        let warning = self.notify_passenger(&payment).await;
        Ok(Outcome::new(payment).warn_if(warning))
    }

    async fn get_payment(&self, caller: &Principal, payment_id: &str) -> RideShareResult<Payment> {
        tracing::debug!("Getting payment: {}", payment_id);
        let payment = self
            .repository
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| RideShareError::PaymentNotFound(payment_id.to_string()))?;

        if !caller.is_admin() {
            let ride = self.repository.get_ride(&payment.ride_id).await?;
            if !ride.is_some_and(|r| r.involves(&caller.user_id)) {
                return Err(RideShareError::forbidden("Access denied"));
            }
        }
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ride::Ride;
    use crate::models::user::UserType;
    use crate::services::{memory_store::MemoryStore, messaging_service::LogNotifier, mpesa_gateway::MockGateway};

    fn completed_ride() -> Ride {
        let now = Utc::now();
        Ride {
            id: "rid-251016-abc".into(),
            request_id: "req-1".into(),
            driver_id: "usr-d".into(),
            passenger_id: "usr-p".into(),
            status: RideStatus::Completed,
            start_time: Some(now),
            end_time: Some(now),
            actual_fare: Some(240.0),
            actual_distance_km: Some(7.6),
            actual_duration_minutes: Some(20),
            created_at: now,
            updated_at: now,
        }
    }

    fn passenger() -> Principal {
        Principal { user_id: "usr-p".into(), user_type: UserType::Passenger }
    }

    fn push() -> StkPushRequest {
        StkPushRequest {
            ride_id: "rid-251016-abc".into(),
            phone_number: "0712 345 678".into(),
            amount: None,
        }
    }

    fn callback(checkout: &str, code: i64) -> Value {
        json!({
            "Body": { "stkCallback": {
                "CheckoutRequestID": checkout,
                "ResultCode": code,
                "ResultDesc": "done",
                "CallbackMetadata": { "Item": [ { "Name": "MpesaReceiptNumber", "Value": "QKX1ABC234" } ] }
            }}
        })
    }

    async fn service_with(gateway: MockGateway) -> (Arc<MemoryStore>, PaymentService) {
        let (store, service, _) = service_for(completed_ride(), gateway).await;
        (store, service)
    }

    async fn service_for(ride: Ride, gateway: MockGateway) -> (Arc<MemoryStore>, PaymentService, Arc<MockGateway>) {
        let store = Arc::new(MemoryStore::new());
        store.commit(WriteBatch::new().put(Record::Ride(ride))).await.unwrap();
        let gateway = Arc::new(gateway);
        let service = PaymentService::new(store.clone(), gateway.clone(), Arc::new(LogNotifier::new()));
        (store, service, gateway)
    }

    #[tokio::test]
    async fn passenger_cannot_choose_the_amount() {
        let (store, service) = service_with(MockGateway::new()).await;

        let cheap = StkPushRequest { amount: Some(1.0), ..push() };
        assert!(matches!(
            service.initiate_stk_push(&passenger(), cheap).await,
            Err(RideShareError::ValidationFailed(_))
        ));
        assert!(store.find_payment_by_ride("rid-251016-abc").await.unwrap().is_none());

        let exact = StkPushRequest { amount: Some(240.0), ..push() };
        let response = service.initiate_stk_push(&passenger(), exact).await.unwrap();
        let payment = store.get_payment(&response.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.amount, 240.0);
    }

    #[tokio::test]
    async fn fractional_fare_is_pushed_in_whole_shillings() {
        let ride = Ride { actual_fare: Some(237.6), ..completed_ride() };
        let (store, service, gateway) = service_for(ride, MockGateway::new()).await;

        let response = service.initiate_stk_push(&passenger(), push()).await.unwrap();
        assert_eq!(gateway.charged(), vec![238]);

        let payment = store.get_payment(&response.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.amount, 237.6);
    }

    #[tokio::test]
    async fn push_then_settle() {
        let (store, service) = service_with(MockGateway::new()).await;

        let response = service.initiate_stk_push(&passenger(), push()).await.unwrap();
        let payment = store.get_payment(&response.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.amount, 240.0);
        assert_eq!(payment.transaction_id.as_deref(), Some(response.checkout_request_id.as_str()));

        let settled = service.handle_callback(callback(&response.checkout_request_id, 0)).await.unwrap();
        assert_eq!(settled.value.payment_status, PaymentStatus::Completed);
        assert_eq!(settled.value.transaction_id.as_deref(), Some("QKX1ABC234"));

        assert!(service.initiate_stk_push(&passenger(), push()).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn failed_result_marks_payment_failed_and_can_be_retried() {
        let (_, service) = service_with(MockGateway::new()).await;
        let first = service.initiate_stk_push(&passenger(), push()).await.unwrap();
        let failed = service.handle_callback(callback(&first.checkout_request_id, 1032)).await.unwrap();
        assert_eq!(failed.value.payment_status, PaymentStatus::Failed);

        let retry = service.initiate_stk_push(&passenger(), push()).await.unwrap();
        assert_eq!(retry.payment_id, first.payment_id);
    }

    #[tokio::test]
    async fn unknown_reference_is_not_found() {
        let (_, service) = service_with(MockGateway::new()).await;
        assert!(matches!(
            service.handle_callback(callback("ws_CO_nothing", 0)).await,
            Err(RideShareError::PaymentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn gateway_failure_commits_nothing() {
        let (store, service) = service_with(MockGateway::failing()).await;
        assert!(matches!(
            service.initiate_stk_push(&passenger(), push()).await,
            Err(RideShareError::PaymentGateway(_))
        ));
        assert!(store.find_payment_by_ride("rid-251016-abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn push_checks_caller_and_phone() {
        let (_, service) = service_with(MockGateway::new()).await;
        let driver = Principal { user_id: "usr-d".into(), user_type: UserType::Driver };
        assert!(matches!(
            service.initiate_stk_push(&driver, push()).await,
            Err(RideShareError::Forbidden(_))
        ));

        let bad_phone = StkPushRequest { phone_number: "0201234567".into(), ..push() };
        assert!(service.initiate_stk_push(&passenger(), bad_phone).await.is_err());
    }
}
