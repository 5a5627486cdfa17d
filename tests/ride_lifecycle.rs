use serde_json::json;
use std::sync::Arc;

use kenya_rideshare::{
    config::AppConfig,
    models::{
        compliance::CommissionBreakdown,
        driver::{DriverApprovalUpdate, DriverAvailabilityUpdate, DriverLocationUpdate, DriverOnboarding},
        payment::{PaymentStatus, StkPushRequest},
        review::CreateReview,
        ride::{CreateRideRequest, RideRequestStatus, RideStatus},
        user::{Principal, UserLogin, UserRegistration, UserType},
    },
    services::{
        identity_service::{IdentityProvider, UserOperations},
        memory_store::MemoryStore,
        messaging_service::{LogNotifier, NotificationTemplate},
        mpesa_gateway::MockGateway,
        repository::Repository,
    },
    state::AppState,
    RideShareError,
};

struct Harness {
    state: AppState,
    store: Arc<MemoryStore>,
    notifier: Arc<LogNotifier>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(LogNotifier::new());
    let state = AppState::with_collaborators(
        AppConfig {
            password_hash_cost: 4,
            ..AppConfig::default()
        },
        store.clone(),
        Arc::new(MockGateway::new()),
        notifier.clone(),
    );
    Harness { state, store, notifier }
}

async fn sign_up(h: &Harness, user_type: UserType, email: &str, phone: &str) -> Principal {
    h.state
        .identity
        .register_user(UserRegistration {
            user_type,
            first_name: "Mercy".into(),
            last_name: "Chebet".into(),
            email: email.into(),
            phone_number: phone.into(),
            password: "matatu123".into(),
        })
        .await
        .unwrap();
    let login = h
        .state
        .identity
        .login_user(UserLogin {
            email: email.into(),
            password: "matatu123".into(),
            device_token: None,
        })
        .await
        .unwrap();
    h.state.identity.authenticate(&login.access_token).await.unwrap()
}

async fn admin(h: &Harness) -> Principal {
    let seed = kenya_rideshare::config::AdminSeed {
        email: "ops@example.co.ke".into(),
        password: "admin-secret".into(),
        phone_number: "254700000000".into(),
    };
    h.state.identity.seed_admin(&seed).await.unwrap();
    let login = h
        .state
        .identity
        .login_user(UserLogin {
            email: seed.email.clone(),
            password: seed.password.clone(),
            device_token: None,
        })
        .await
        .unwrap();
    h.state.identity.authenticate(&login.access_token).await.unwrap()
}

async fn ready_driver(h: &Harness, admin: &Principal, email: &str, phone: &str, plate: &str) -> Principal {
    let driver = sign_up(h, UserType::Driver, email, phone).await;
    let drivers = &h.state.driver_service;
    drivers
        .onboard_driver(
            &driver,
            DriverOnboarding {
                vehicle_make: "Toyota".into(),
                vehicle_model: "Probox".into(),
                vehicle_year: Some(2019),
                license_plate: plate.into(),
                driver_license_number: format!("DL-{}", plate),
                insurance_details: Some("Britam comprehensive".into()),
            },
        )
        .await
        .unwrap();
    drivers
        .set_approval(admin, &driver.user_id, DriverApprovalUpdate { is_approved: true })
        .await
        .unwrap();
    drivers
        .set_availability(&driver, &driver.user_id, DriverAvailabilityUpdate { is_available: true })
        .await
        .unwrap();
    drivers
        .update_location(&driver, &driver.user_id, DriverLocationUpdate { latitude: -1.2864, longitude: 36.8172 })
        .await
        .unwrap();
    driver
}

fn cbd_to_kilimani() -> CreateRideRequest {
    CreateRideRequest {
        pickup_latitude: -1.2921,
        pickup_longitude: 36.8219,
        dropoff_latitude: -1.2903,
        dropoff_longitude: 36.7856,
        pickup_address: Some("Moi Avenue".into()),
        dropoff_address: Some("Argwings Kodhek Road".into()),
    }
}

#[tokio::test]
async fn full_ride_lifecycle() {
    let h = harness();
    let admin = admin(&h).await;
    let passenger = sign_up(&h, UserType::Passenger, "mercy@example.co.ke", "0712000001").await;
    let driver = ready_driver(&h, &admin, "otieno@example.co.ke", "0712000002", "KDC 123X").await;

    let status = h
        .state
        .compliance_service
        .validate_driver_compliance(&driver, &driver.user_id)
        .await
        .unwrap();
    assert!(status.is_compliant, "{:?}", status.issues);

    let rides = &h.state.ride_service;
    let request = rides.create_ride_request(&passenger, cbd_to_kilimani()).await.unwrap();
    assert_eq!(request.status, RideRequestStatus::Pending);

    let ride = rides.accept_ride_request(&driver, &request.id).await.unwrap().value;
    assert_eq!(ride.status, RideStatus::InProgress);
    assert_eq!(ride.passenger_id, passenger.user_id);

    rides.start_ride(&driver, &ride.id).await.unwrap();
    let completion = rides.end_ride(&driver, &ride.id).await.unwrap().value;
    let fare = completion.ride.actual_fare.unwrap();
    assert_eq!(fare, completion.total_fare);

    let commission = CommissionBreakdown::for_fare(fare);
    assert!((commission.total_fare - fare).abs() < 1e-9);
    assert!((commission.commission_amount + commission.driver_earnings - fare).abs() < 1e-9);

    let push = h
        .state
        .payment_service
        .initiate_stk_push(
            &passenger,
            StkPushRequest {
                ride_id: ride.id.clone(),
                phone_number: "+254 712 000 001".into(),
                amount: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(push.payment_id, completion.payment_id);

    let settled = h
        .state
        .payment_service
        .handle_callback(json!({
            "Body": { "stkCallback": {
                "MerchantRequestID": "m-1",
                "CheckoutRequestID": push.checkout_request_id,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": { "Item": [
                    { "Name": "Amount", "Value": fare },
                    { "Name": "MpesaReceiptNumber", "Value": "RKT4XYZ9QP" }
                ]}
            }}
        }))
        .await
        .unwrap()
        .value;
    assert_eq!(settled.payment_status, PaymentStatus::Completed);
    assert_eq!(settled.transaction_id.as_deref(), Some("RKT4XYZ9QP"));

    let payment = h.state.payment_service.get_payment(&driver, &settled.id).await.unwrap();
    assert_eq!(payment.amount, fare);

    rides
        .create_review(
            &passenger,
            CreateReview {
                ride_id: ride.id.clone(),
                reviewed_id: driver.user_id.clone(),
                rating: 5.0,
                comment: Some("Asante sana".into()),
            },
        )
        .await
        .unwrap();
    let reviewed = h.store.get_user(&driver.user_id).await.unwrap().unwrap();
    assert_eq!(reviewed.rating, 5.0);

    let report = h
        .state
        .report_service
        .generate_compliance_report(&admin, "2000-01-01", "2999-12-31")
        .await
        .unwrap();
    assert_eq!(report.total_rides, 1);
    assert_eq!(report.rides[0].driver_name, "Mercy Chebet");
    assert!((report.total_revenue - fare).abs() < 1e-9);

    let kinds: Vec<_> = h.notifier.sent().into_iter().map(|n| n.template).collect();
    assert!(kinds.contains(&NotificationTemplate::RideAccepted));
    assert!(kinds.contains(&NotificationTemplate::RideCompleted));
    assert!(kinds.contains(&NotificationTemplate::PaymentCompleted));
}

#[tokio::test]
async fn concurrent_accepts_have_one_winner() {
    let h = harness();
    let admin = admin(&h).await;
    let passenger = sign_up(&h, UserType::Passenger, "amina@example.co.ke", "0712000010").await;
    let first = ready_driver(&h, &admin, "kip@example.co.ke", "0712000011", "KDA 001A").await;
    let second = ready_driver(&h, &admin, "wafula@example.co.ke", "0712000012", "KDB 002B").await;

    let request = h
        .state
        .ride_service
        .create_ride_request(&passenger, cbd_to_kilimani())
        .await
        .unwrap();

    let rides = h.state.ride_service.clone();
    let (a, b) = tokio::join!(
        rides.accept_ride_request(&first, &request.id),
        rides.accept_ride_request(&second, &request.id),
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(e) if e.is_conflict())));

    let created: Vec<_> = h
        .store
        .list_rides()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.request_id == request.id)
        .collect();
    assert_eq!(created.len(), 1);
}

#[tokio::test]
async fn ending_before_start_leaves_no_payment() {
    let h = harness();
    let admin = admin(&h).await;
    let passenger = sign_up(&h, UserType::Passenger, "baraka@example.co.ke", "0712000020").await;
    let driver = ready_driver(&h, &admin, "mutua@example.co.ke", "0712000021", "KDD 004D").await;

    let rides = &h.state.ride_service;
    let request = rides.create_ride_request(&passenger, cbd_to_kilimani()).await.unwrap();
    let ride = rides.accept_ride_request(&driver, &request.id).await.unwrap().value;

    assert!(matches!(
        rides.end_ride(&driver, &ride.id).await,
        Err(RideShareError::InvalidState(_))
    ));
    assert!(h.store.find_payment_by_ride(&ride.id).await.unwrap().is_none());

    // Busy drivers cannot take a second request.
    let another = rides.create_ride_request(&passenger, cbd_to_kilimani()).await.unwrap();
    assert!(matches!(
        rides.accept_ride_request(&driver, &another.id).await,
        Err(RideShareError::Forbidden(_))
    ));
}

#[tokio::test]
async fn vehicle_eligibility_rules() {
    let h = harness();
    let compliance = &h.state.compliance_service;

    let old = compliance.validate_vehicle_eligibility(2010, "Toyota", "Corolla");
    assert!(!old.is_eligible);
    assert!(!old.issues.is_empty());

    let new = compliance.validate_vehicle_eligibility(2020, "Toyota", "Corolla");
    assert!(new.is_eligible);
    assert!(new.issues.is_empty());
}
