// src/services/mpesa_gateway.rs
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{sync::Mutex, time::Duration};
use thiserror::Error;

use crate::{
    config::{Environment, MpesaConfig},
    errors::{RideShareError, RideShareResult},
    models::payment::{PendingPayment, SettlementResult},
    utils::geo::to_nairobi_time,
};

const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";
const TRANSACTION_DESC: &str = "Ride payment";
const RECEIPT_ITEM: &str = "MpesaReceiptNumber";
const ACCEPTED_MESSAGE: &str = "Success. Request accepted for processing";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("M-Pesa authentication failed: {0}")]
    Auth(String),

    #[error("M-Pesa request failed: {0}")]
    Request(String),

    #[error("M-Pesa rejected the request ({code}): {description}")]
    Rejected { code: String, description: String },

    #[error("M-Pesa request timed out")]
    Timeout,

    #[error("Unexpected M-Pesa response: {0}")]
    InvalidResponse(String),

    #[error("Malformed M-Pesa callback: {0}")]
    InvalidCallback(String),
}

impl From<GatewayError> for RideShareError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Timeout => RideShareError::NetworkTimeout,
            GatewayError::InvalidCallback(msg) => RideShareError::BadRequest(msg),
            other => RideShareError::PaymentGateway(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Request(err.to_string())
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Prompt `phone` (254XXXXXXXXX) to pay `amount` KES.
    async fn initiate_push(&self, phone: &str, amount: f64, account_reference: &str) -> Result<PendingPayment, GatewayError>;
}

/// `RIDE-` plus the first eight characters of the ride id.
pub fn account_reference(ride_id: &str) -> String {
    let short: String = ride_id.chars().take(8).collect();
    format!("RIDE-{}", short)
}

/// M-Pesa takes whole shillings; never push less than one.
pub fn whole_shillings(amount: f64) -> i64 {
    (amount.round() as i64).max(1)
}

pub fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

#[derive(Debug, Serialize)]
struct StkPushPayload<'a> {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: &'a str,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "TransactionType")]
    transaction_type: &'a str,
    #[serde(rename = "Amount")]
    amount: i64,
    #[serde(rename = "PartyA")]
    party_a: &'a str,
    #[serde(rename = "PartyB")]
    party_b: &'a str,
    #[serde(rename = "PhoneNumber")]
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    #[serde(rename = "AccountReference")]
    account_reference: &'a str,
    #[serde(rename = "TransactionDesc")]
    transaction_desc: &'a str,
}

#[derive(Debug, Deserialize)]
struct StkPushReply {
    #[serde(rename = "MerchantRequestID", default)]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID", default)]
    checkout_request_id: String,
    #[serde(rename = "ResponseCode", default)]
    response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    customer_message: String,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

/// Safaricom Daraja STK push client.
pub struct DarajaGateway {
    config: MpesaConfig,
    base_url: &'static str,
    client: reqwest::Client,
}

impl DarajaGateway {
    pub fn new(config: MpesaConfig, environment: Environment) -> RideShareResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.base_url(environment),
            config,
            client,
        })
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let url = format!("{}/oauth/v1/generate?grant_type=client_credentials", self.base_url);
        let credentials = STANDARD.encode(format!("{}:{}", self.config.consumer_key, self.config.consumer_secret));

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Basic {}", credentials))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("M-Pesa token request failed ({}): {}", status, error_text);
            return Err(GatewayError::Auth(format!("{}: {}", status, error_text)));
        }

        let token: AccessToken = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentGateway for DarajaGateway {
    async fn initiate_push(&self, phone: &str, amount: f64, account_reference: &str) -> Result<PendingPayment, GatewayError> {
        let token = self.access_token().await?;
        let timestamp = to_nairobi_time(Utc::now()).format("%Y%m%d%H%M%S").to_string();

        let payload = StkPushPayload {
            business_short_code: &self.config.shortcode,
            password: stk_password(&self.config.shortcode, &self.config.passkey, &timestamp),
            timestamp,
            transaction_type: TRANSACTION_TYPE,
            amount: whole_shillings(amount),
            party_a: phone,
            party_b: &self.config.shortcode,
            phone_number: phone,
            callback_url: &self.config.callback_url,
            account_reference,
            transaction_desc: TRANSACTION_DESC,
        };

        tracing::info!("Sending STK push of KES {} to {} ({})", payload.amount, phone, account_reference);

        let response = self
            .client
            .post(format!("{}/mpesa/stkpush/v1/processrequest", self.base_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!("STK push failed ({}): {}", status, body);
            return Err(GatewayError::Request(format!("{}: {}", status, body)));
        }

        let reply: StkPushReply =
            serde_json::from_str(&body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        if reply.response_code != "0" {
            return Err(GatewayError::Rejected {
                code: reply.response_code,
                description: reply.response_description,
            });
        }

        tracing::debug!("STK push accepted: {}", reply.checkout_request_id);
        Ok(PendingPayment {
            merchant_request_id: reply.merchant_request_id,
            checkout_request_id: reply.checkout_request_id,
            customer_message: reply.customer_message,
        })
    }
}

/// Accepts every push without calling Safaricom. Used in development.
#[derive(Debug, Default)]
pub struct MockGateway {
    failing: bool,
    charged: Mutex<Vec<i64>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway that refuses every push.
    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    /// Whole-shilling amounts of the pushes accepted so far.
    pub fn charged(&self) -> Vec<i64> {
        self.charged.lock().map(|charged| charged.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initiate_push(&self, phone: &str, amount: f64, account_reference: &str) -> Result<PendingPayment, GatewayError> {
        if self.failing {
            return Err(GatewayError::Request("mock gateway is offline".to_string()));
        }

        let ts = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let shillings = whole_shillings(amount);
        tracing::info!("[MOCK] STK push of KES {} to {} ({})", shillings, phone, account_reference);
        if let Ok(mut charged) = self.charged.lock() {
            charged.push(shillings);
        }
        Ok(PendingPayment {
            merchant_request_id: format!("mock_merchant_request_{}", ts),
            checkout_request_id: format!("mock_checkout_request_{}", ts),
            customer_message: ACCEPTED_MESSAGE.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CallbackEnvelope {
    #[serde(rename = "Body")]
    body: CallbackBody,
}

#[derive(Debug, Deserialize)]
struct CallbackBody {
    #[serde(rename = "stkCallback")]
    stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
struct StkCallback {
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata", default)]
    callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    items: Vec<CallbackItem>,
}

#[derive(Debug, Deserialize)]
struct CallbackItem {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value", default)]
    value: Option<Value>,
}

/// Parse the `Body.stkCallback` webhook Safaricom posts after a push.
pub fn parse_stk_callback(payload: Value) -> Result<SettlementResult, GatewayError> {
    let envelope: CallbackEnvelope =
        serde_json::from_value(payload).map_err(|e| GatewayError::InvalidCallback(e.to_string()))?;
    let callback = envelope.body.stk_callback;

    let receipt_number = callback
        .callback_metadata
        .into_iter()
        .flat_map(|m| m.items)
        .find(|item| item.name == RECEIPT_ITEM)
        .and_then(|item| match item.value {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        });

    Ok(SettlementResult {
        checkout_request_id: callback.checkout_request_id,
        result_code: callback.result_code,
        result_description: callback.result_desc,
        receipt_number,
    })
}
