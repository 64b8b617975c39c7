use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use shared_config::AppConfig;

use crate::models::{PaymentProfile, Payout, PayoutError, PayoutProvider};

/// What a provider tells us synchronously at dispatch time. The settlement
/// outcome itself always arrives later through a webhook.
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    pub provider_reference: Option<String>,
    pub provider_status: Option<String>,
}

/// Initiates a transfer on one payment rail. Implementations wrap the
/// provider HTTP APIs; the payout id doubles as the provider-side idempotency
/// key so a retried trigger cannot double-pay.
#[async_trait]
pub trait TransferDispatcher: Send + Sync {
    async fn initiate(
        &self,
        payout: &Payout,
        profile: &PaymentProfile,
    ) -> Result<DispatchReceipt, PayoutError>;
}

pub fn dispatcher_for(
    provider: PayoutProvider,
    config: &AppConfig,
) -> Box<dyn TransferDispatcher> {
    match provider {
        PayoutProvider::Card => Box::new(CardTransferClient::new(config)),
        PayoutProvider::Paypal => Box::new(PaypalPayoutClient::new(config)),
        PayoutProvider::MobileMoney => Box::new(MobileMoneyClient::new(config)),
        PayoutProvider::BankTransfer => Box::new(BankTransferDispatcher),
    }
}

/// Dispatch is a network call; a stuck provider must surface as a retryable
/// error, not hang the admin request.
fn http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .expect("failed to construct HTTP client")
}

fn dispatch_error(provider: PayoutProvider, e: reqwest::Error) -> PayoutError {
    if e.is_timeout() {
        PayoutError::Dispatch(format!("{} transfer request timed out", provider))
    } else {
        PayoutError::Dispatch(format!("{} transfer request failed: {}", provider, e))
    }
}

// ==============================================================================
// CARD RAIL
// ==============================================================================

pub struct CardTransferClient {
    client: Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct CardTransferResponse {
    data: CardTransferData,
}

#[derive(Debug, Deserialize)]
struct CardTransferData {
    transfer_code: Option<String>,
    status: Option<String>,
}

impl CardTransferClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: http_client(config.transfer_dispatch_timeout_secs),
            base_url: config.card_api_base.clone(),
            secret_key: config.card_secret_key.clone(),
        }
    }
}

#[async_trait]
impl TransferDispatcher for CardTransferClient {
    async fn initiate(
        &self,
        payout: &Payout,
        profile: &PaymentProfile,
    ) -> Result<DispatchReceipt, PayoutError> {
        if self.base_url.is_empty() || self.secret_key.is_empty() {
            return Err(PayoutError::Dispatch(
                "card transfer dispatch is not configured".to_string(),
            ));
        }

        let recipient = profile.card_recipient_code.as_deref().ok_or_else(|| {
            PayoutError::Validation(format!(
                "Doctor {} has no card recipient code on file",
                payout.doctor_id
            ))
        })?;

        debug!("Dispatching card transfer for payout {}", payout.id);

        let response = self
            .client
            .post(format!("{}/transfer", self.base_url))
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .json(&json!({
                "amount": payout.amount_due,
                "currency": payout.currency,
                "recipient": recipient,
                "reference": payout.id,
                "reason": format!("Doctor payout {}", payout.id)
            }))
            .send()
            .await
            .map_err(|e| dispatch_error(PayoutProvider::Card, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PayoutError::Dispatch(format!(
                "card transfer rejected ({}): {}",
                status, body
            )));
        }

        let parsed: CardTransferResponse = response
            .json()
            .await
            .map_err(|e| dispatch_error(PayoutProvider::Card, e))?;

        info!(
            "Card transfer dispatched for payout {} (code {:?})",
            payout.id, parsed.data.transfer_code
        );

        Ok(DispatchReceipt {
            provider_reference: parsed.data.transfer_code,
            provider_status: parsed.data.status,
        })
    }
}

// ==============================================================================
// PAYPAL PAYOUTS
// ==============================================================================

pub struct PaypalPayoutClient {
    client: Client,
    base_url: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct PaypalPayoutResponse {
    batch_header: PaypalBatchHeader,
}

#[derive(Debug, Deserialize)]
struct PaypalBatchHeader {
    payout_batch_id: Option<String>,
    batch_status: Option<String>,
}

impl PaypalPayoutClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: http_client(config.transfer_dispatch_timeout_secs),
            base_url: config.paypal_api_base.clone(),
            api_token: config.paypal_api_token.clone(),
        }
    }
}

#[async_trait]
impl TransferDispatcher for PaypalPayoutClient {
    async fn initiate(
        &self,
        payout: &Payout,
        profile: &PaymentProfile,
    ) -> Result<DispatchReceipt, PayoutError> {
        if self.base_url.is_empty() || self.api_token.is_empty() {
            return Err(PayoutError::Dispatch(
                "paypal payout dispatch is not configured".to_string(),
            ));
        }

        let receiver = profile.paypal_email.as_deref().ok_or_else(|| {
            PayoutError::Validation(format!(
                "Doctor {} has no PayPal email on file",
                payout.doctor_id
            ))
        })?;

        debug!("Dispatching PayPal payout for payout {}", payout.id);

        let response = self
            .client
            .post(format!("{}/v1/payments/payouts", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_token))
            .json(&json!({
                "sender_batch_header": {
                    "sender_batch_id": payout.id,
                    "email_subject": "Your consultation payout"
                },
                "items": [{
                    "recipient_type": "EMAIL",
                    "receiver": receiver,
                    "sender_item_id": payout.id,
                    "amount": {
                        "value": format!("{:.2}", payout.amount_due),
                        "currency": payout.currency
                    }
                }]
            }))
            .send()
            .await
            .map_err(|e| dispatch_error(PayoutProvider::Paypal, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PayoutError::Dispatch(format!(
                "paypal payout rejected ({}): {}",
                status, body
            )));
        }

        let parsed: PaypalPayoutResponse = response
            .json()
            .await
            .map_err(|e| dispatch_error(PayoutProvider::Paypal, e))?;

        info!(
            "PayPal payout dispatched for payout {} (batch {:?})",
            payout.id, parsed.batch_header.payout_batch_id
        );

        Ok(DispatchReceipt {
            provider_reference: parsed.batch_header.payout_batch_id,
            provider_status: parsed.batch_header.batch_status,
        })
    }
}

// ==============================================================================
// MOBILE MONEY B2C
// ==============================================================================

pub struct MobileMoneyClient {
    client: Client,
    base_url: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct MobileMoneyResponse {
    #[serde(rename = "ConversationID")]
    conversation_id: Option<String>,
    #[serde(rename = "ResponseDescription")]
    response_description: Option<String>,
}

impl MobileMoneyClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: http_client(config.transfer_dispatch_timeout_secs),
            base_url: config.mobile_money_api_base.clone(),
            api_token: config.mobile_money_api_token.clone(),
        }
    }
}

#[async_trait]
impl TransferDispatcher for MobileMoneyClient {
    async fn initiate(
        &self,
        payout: &Payout,
        profile: &PaymentProfile,
    ) -> Result<DispatchReceipt, PayoutError> {
        if self.base_url.is_empty() || self.api_token.is_empty() {
            return Err(PayoutError::Dispatch(
                "mobile money dispatch is not configured".to_string(),
            ));
        }

        let msisdn = profile.msisdn.as_deref().ok_or_else(|| {
            PayoutError::Validation(format!(
                "Doctor {} has no mobile money number on file",
                payout.doctor_id
            ))
        })?;

        debug!("Dispatching mobile money B2C for payout {}", payout.id);

        let response = self
            .client
            .post(format!("{}/b2c/v1/paymentrequest", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_token))
            .json(&json!({
                "OriginatorConversationID": payout.id,
                "CommandID": "BusinessPayment",
                "Amount": payout.amount_due,
                "PartyB": msisdn,
                "Remarks": format!("Doctor payout {}", payout.id)
            }))
            .send()
            .await
            .map_err(|e| dispatch_error(PayoutProvider::MobileMoney, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PayoutError::Dispatch(format!(
                "mobile money transfer rejected ({}): {}",
                status, body
            )));
        }

        let parsed: MobileMoneyResponse = response
            .json()
            .await
            .map_err(|e| dispatch_error(PayoutProvider::MobileMoney, e))?;

        info!(
            "Mobile money transfer dispatched for payout {} (conversation {:?})",
            payout.id, parsed.conversation_id
        );

        Ok(DispatchReceipt {
            provider_reference: parsed.conversation_id,
            provider_status: parsed.response_description,
        })
    }
}

// ==============================================================================
// MANUAL BANK TRANSFER
// ==============================================================================

/// No network call: the rail is a human wiring money. Dispatch only stamps an
/// internal reference so the later manual settlement confirmation can find
/// the payout by exact match.
pub struct BankTransferDispatcher;

#[async_trait]
impl TransferDispatcher for BankTransferDispatcher {
    async fn initiate(
        &self,
        payout: &Payout,
        profile: &PaymentProfile,
    ) -> Result<DispatchReceipt, PayoutError> {
        if profile.bank_account.is_none() {
            return Err(PayoutError::Validation(format!(
                "Doctor {} has no bank account on file",
                payout.doctor_id
            )));
        }

        info!(
            "Payout {} queued for manual bank transfer to {} ({})",
            payout.id,
            profile.bank_name.as_deref().unwrap_or("unknown bank"),
            payout.doctor_id
        );

        Ok(DispatchReceipt {
            provider_reference: Some(format!("BANK-{}", payout.id)),
            provider_status: Some("manual".to_string()),
        })
    }
}
