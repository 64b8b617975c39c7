use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use payout_cell::models::{PayoutProvider, PayoutStatus};
use shared_models::error::AppError;

/// A provider confirmation after signature verification and parsing, reduced
/// to the fields reconciliation cares about.
#[derive(Debug, Clone)]
pub struct SettlementEvent {
    pub provider: PayoutProvider,
    pub reference: Option<String>,
    pub amount: Option<f64>,
    pub status_token: String,
    pub event_id: Option<String>,
}

/// What reconciling one event did. Everything except `Applied` leaves every
/// payout untouched.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Applied {
        payout_id: Uuid,
        status: PayoutStatus,
    },
    AlreadySettled {
        payout_id: Uuid,
    },
    NotFound,
    Ambiguous {
        candidates: usize,
    },
    Ignored {
        token: String,
    },
}

// ==============================================================================
// PROVIDER WEBHOOK PAYLOADS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct CardWebhookEvent {
    pub event: String,
    pub data: CardWebhookData,
}

#[derive(Debug, Deserialize)]
pub struct CardWebhookData {
    pub reference: Option<String>,
    pub transfer_code: Option<String>,
    pub status: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaypalWebhookEvent {
    pub id: Option<String>,
    pub event_type: String,
    pub resource: PaypalWebhookResource,
}

#[derive(Debug, Deserialize)]
pub struct PaypalWebhookResource {
    pub payout_batch_id: Option<String>,
    pub payout_item_id: Option<String>,
    pub transaction_status: Option<String>,
    pub payout_item: Option<PaypalPayoutItem>,
}

#[derive(Debug, Deserialize)]
pub struct PaypalPayoutItem {
    pub sender_item_id: Option<String>,
    pub amount: Option<PaypalAmount>,
}

#[derive(Debug, Deserialize)]
pub struct PaypalAmount {
    pub value: String,
    pub currency: String,
}

/// Mobile-money B2C result callback. The interesting fields hide in a
/// key/value parameter list; the amount accessor digs them out.
#[derive(Debug, Deserialize)]
pub struct MobileMoneyCallback {
    #[serde(rename = "Result")]
    pub result: MobileMoneyResult,
}

#[derive(Debug, Deserialize)]
pub struct MobileMoneyResult {
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: Option<String>,
    #[serde(rename = "OriginatorConversationID")]
    pub originator_conversation_id: Option<String>,
    #[serde(rename = "ConversationID")]
    pub conversation_id: Option<String>,
    #[serde(rename = "TransactionID")]
    pub transaction_id: Option<String>,
    #[serde(rename = "ResultParameters")]
    pub result_parameters: Option<MobileMoneyResultParameters>,
}

#[derive(Debug, Deserialize)]
pub struct MobileMoneyResultParameters {
    #[serde(rename = "ResultParameter")]
    pub result_parameter: Vec<MobileMoneyResultParameter>,
}

#[derive(Debug, Deserialize)]
pub struct MobileMoneyResultParameter {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: serde_json::Value,
}

impl MobileMoneyResult {
    pub fn transaction_amount(&self) -> Option<f64> {
        self.result_parameters
            .as_ref()?
            .result_parameter
            .iter()
            .find(|param| param.key == "TransactionAmount")
            .and_then(|param| param.value.as_f64())
    }
}

// ==============================================================================
// MANUAL BANK SETTLEMENT
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankSettlementOutcome {
    Settled,
    Failed,
}

impl BankSettlementOutcome {
    pub fn as_token(&self) -> &'static str {
        match self {
            BankSettlementOutcome::Settled => "settled",
            BankSettlementOutcome::Failed => "failed",
        }
    }
}

/// Admin confirmation that a manual bank transfer completed (or bounced).
#[derive(Debug, Deserialize)]
pub struct BankSettlementRequest {
    pub provider_reference: String,
    pub outcome: BankSettlementOutcome,
    pub reason: Option<String>,
}

// Error types specific to settlement processing
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        let message = err.to_string();
        match err {
            SettlementError::SignatureVerification(_) => AppError::Auth(message),
            SettlementError::InvalidPayload(_) => AppError::BadRequest(message),
            SettlementError::Database(_) => AppError::Database(message),
        }
    }
}
