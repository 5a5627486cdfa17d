// src/models/payment.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CURRENCY_KES: &str = "KES";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Mpesa, // Safaricom M-Pesa STK push
    Card,
    Cash,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Payment {
    pub id: String,
    pub ride_id: String,
    // The ride's actual fare. The STK push itself charges this rounded to
    // whole shillings, since M-Pesa takes no cents.
    pub amount: f64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    // Checkout request id while pending, M-Pesa receipt number once settled
    pub transaction_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Request/Response Models
#[derive(Debug, Serialize, Deserialize)]
pub struct StkPushRequest {
    pub ride_id: String,
    pub phone_number: String,
    pub amount: Option<f64>, // Must match the ride's actual fare when given
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StkPushResponse {
    pub message: String,
    pub payment_id: String,
    pub checkout_request_id: String,
    pub customer_message: String,
}

/// What the gateway hands back when a push is accepted for processing.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPayment {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub customer_message: String,
}

/// Parsed outcome of a gateway callback.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementResult {
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_description: Option<String>,
    pub receipt_number: Option<String>,
}

impl SettlementResult {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }
}
