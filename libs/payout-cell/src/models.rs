use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use thiserror::Error;

use shared_models::error::AppError;

/// Lifecycle of a payout. Created READY by the calculator, moved forward by
/// admin actions, settled PAID/FAILED by the reconciler or a manual override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Ready,
    Approved,
    Processing,
    Paid,
    Failed,
}

impl PayoutStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PayoutStatus::Paid | PayoutStatus::Failed)
    }

    /// Wire form used in PostgREST filters and stored rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Ready => "READY",
            PayoutStatus::Approved => "APPROVED",
            PayoutStatus::Processing => "PROCESSING",
            PayoutStatus::Paid => "PAID",
            PayoutStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment rail a payout settles through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutProvider {
    Card,
    Paypal,
    MobileMoney,
    BankTransfer,
}

impl PayoutProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutProvider::Card => "card",
            PayoutProvider::Paypal => "paypal",
            PayoutProvider::MobileMoney => "mobile_money",
            PayoutProvider::BankTransfer => "bank_transfer",
        }
    }
}

impl std::fmt::Display for PayoutProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One settlement obligation to one doctor for one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub consultations_count: i32,
    pub interactions_count: i32,
    pub amount_due: f64,
    pub currency: String,
    pub status: PayoutStatus,
    pub provider: Option<PayoutProvider>,
    pub provider_reference: Option<String>,
    pub approved_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payout {
    /// Audit-trail append. Notes are only ever extended, never rewritten.
    pub fn notes_with(&self, entry: &str) -> String {
        match &self.notes {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, entry),
            _ => entry.to_string(),
        }
    }
}

/// One billable consultation contributing to a payout. Written once with the
/// payout, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutItem {
    pub id: Uuid,
    pub payout_id: Uuid,
    pub consultation_id: Uuid,
    pub description: String,
    pub amount: f64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Fields for a payout row about to be inserted. The database fills id and
/// the audit timestamps.
#[derive(Debug, Clone)]
pub struct NewPayout {
    pub doctor_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub consultations_count: i32,
    pub interactions_count: i32,
    pub amount_due: f64,
    pub currency: String,
    pub status: PayoutStatus,
    pub provider: Option<PayoutProvider>,
    pub notes: String,
}

#[derive(Debug, Clone)]
pub struct NewPayoutItem {
    pub consultation_id: Uuid,
    pub description: String,
    pub amount: f64,
    pub currency: String,
}

/// A completed consultation as the billable-activity source reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct BillableConsultation {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub completed_at: DateTime<Utc>,
}

/// A doctor's payout destination: the preferred rail plus the account data
/// each rail needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProfile {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub provider: PayoutProvider,
    pub msisdn: Option<String>,
    pub paypal_email: Option<String>,
    pub bank_name: Option<String>,
    pub bank_account: Option<String>,
    pub card_recipient_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Admin command against a single payout. Closed set - the handler boundary
/// rejects anything else before the controller sees it.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PayoutCommand {
    Approve,
    Trigger,
    ManualOverride {
        status: PayoutStatus,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Approve,
    Trigger,
}

impl std::fmt::Display for BulkAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BulkAction::Approve => write!(f, "approve"),
            BulkAction::Trigger => write!(f, "trigger"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkActionRequest {
    pub action: BulkAction,
    pub payout_ids: Vec<Uuid>,
}

/// Per-id result of a bulk operation. One failing id never aborts the rest,
/// so the caller needs the outcome of each id individually.
#[derive(Debug, Clone, Serialize)]
pub struct BulkItemOutcome {
    pub payout_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PayoutStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BulkItemOutcome {
    pub fn success(payout_id: Uuid, status: PayoutStatus) -> Self {
        Self {
            payout_id,
            success: true,
            status: Some(status),
            error_code: None,
            message: None,
        }
    }

    pub fn failure(payout_id: Uuid, error: &PayoutError) -> Self {
        Self {
            payout_id,
            success: false,
            status: None,
            error_code: Some(error.code().to_string()),
            message: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratePayoutsRequest {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualPayoutItemRequest {
    pub consultation_id: Uuid,
    pub description: String,
    pub amount: f64,
}

/// Admin-created payout for operational corrections. `amount_due` is taken as
/// given and may deliberately differ from the sum of its items.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateManualPayoutRequest {
    pub doctor_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub amount_due: f64,
    pub provider: Option<PayoutProvider>,
    #[serde(default)]
    pub items: Vec<ManualPayoutItemRequest>,
    pub reason: String,
}

/// Filters for the list surface. Doctors are force-scoped to their own id by
/// the handler; admins may pass any combination.
#[derive(Debug, Clone, Default)]
pub struct PayoutListFilters {
    pub doctor_id: Option<Uuid>,
    pub status: Option<PayoutStatus>,
    pub provider: Option<PayoutProvider>,
    pub period_from: Option<DateTime<Utc>>,
    pub period_to: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub skip: Option<i32>,
}

// Error types specific to payout operations
#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("Payout not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Action '{action}' is not valid while the payout is {current}")]
    Conflict {
        current: PayoutStatus,
        action: String,
    },

    #[error("Transfer dispatch failed: {0}")]
    Dispatch(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl PayoutError {
    pub fn code(&self) -> &'static str {
        match self {
            PayoutError::NotFound(_) => "not_found",
            PayoutError::Validation(_) => "validation_error",
            PayoutError::Conflict { .. } => "conflict",
            PayoutError::Dispatch(_) => "dispatch_error",
            PayoutError::Database(_) => "database_error",
        }
    }

    pub fn conflict(current: PayoutStatus, action: &str) -> Self {
        PayoutError::Conflict {
            current,
            action: action.to_string(),
        }
    }
}

impl From<PayoutError> for AppError {
    fn from(err: PayoutError) -> Self {
        let message = err.to_string();
        match err {
            PayoutError::NotFound(_) => AppError::NotFound(message),
            PayoutError::Validation(_) => AppError::ValidationError(message),
            PayoutError::Conflict { .. } => AppError::Conflict(message),
            PayoutError::Dispatch(_) => AppError::Dispatch(message),
            PayoutError::Database(_) => AppError::Database(message),
        }
    }
}
