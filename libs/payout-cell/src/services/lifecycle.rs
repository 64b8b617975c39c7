use chrono::Utc;
use futures::future::join_all;
use reqwest::Method;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    BulkAction, BulkItemOutcome, CreateManualPayoutRequest, NewPayout, NewPayoutItem,
    PaymentProfile, Payout, PayoutError, PayoutStatus,
};
use crate::services::dispatch::dispatcher_for;
use crate::services::store::PayoutStore;

/// Admin-facing state machine over payouts. Every transition is an explicit
/// admin action; the reconciler owns the terminal transitions.
pub struct PayoutLifecycleService {
    store: PayoutStore,
    supabase: SupabaseClient,
    config: AppConfig,
}

impl PayoutLifecycleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: PayoutStore::new(config),
            supabase: SupabaseClient::new(config),
            config: config.clone(),
        }
    }

    pub fn can_approve(status: &PayoutStatus) -> bool {
        matches!(status, PayoutStatus::Ready)
    }

    pub fn can_trigger(status: &PayoutStatus) -> bool {
        matches!(status, PayoutStatus::Ready | PayoutStatus::Approved)
    }

    /// READY -> APPROVED, recording the approving admin.
    pub async fn approve(
        &self,
        payout_id: Uuid,
        admin_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Payout, PayoutError> {
        let payout = self.store.get_payout(payout_id, auth_token).await?;

        if !Self::can_approve(&payout.status) {
            return Err(PayoutError::conflict(payout.status, "approve"));
        }

        let changes = json!({
            "status": PayoutStatus::Approved,
            "approved_by": admin_id,
            "notes": payout.notes_with(&format!("Approved by admin {}", admin_id)),
            "updated_at": Utc::now().to_rfc3339()
        });

        match self
            .store
            .transition(payout_id, &[PayoutStatus::Ready], changes, auth_token)
            .await?
        {
            Some(updated) => {
                info!("Payout {} approved by {}", payout_id, admin_id);
                Ok(updated)
            }
            None => {
                // Lost the race; report against whatever state won.
                let current = self.store.get_payout(payout_id, auth_token).await?;
                Err(PayoutError::conflict(current.status, "approve"))
            }
        }
    }

    /// APPROVED (or READY) -> PROCESSING. The payout only becomes PROCESSING
    /// once the provider confirms it accepted the transfer; a failed or
    /// timed-out dispatch leaves the record where it was, visible and
    /// retryable.
    pub async fn trigger(
        &self,
        payout_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Payout, PayoutError> {
        let payout = self.store.get_payout(payout_id, auth_token).await?;

        if !Self::can_trigger(&payout.status) {
            return Err(PayoutError::conflict(payout.status, "trigger"));
        }

        let profile = self.payment_profile(payout.doctor_id, auth_token).await?;
        let provider = payout.provider.unwrap_or(profile.provider);
        let dispatcher = dispatcher_for(provider, &self.config);

        let receipt = dispatcher.initiate(&payout, &profile).await?;

        let note = format!(
            "Transfer dispatched via {} (reference {})",
            provider,
            receipt.provider_reference.as_deref().unwrap_or("pending")
        );
        let changes = json!({
            "status": PayoutStatus::Processing,
            "provider": provider,
            "provider_reference": receipt.provider_reference,
            "notes": payout.notes_with(&note),
            "updated_at": Utc::now().to_rfc3339()
        });

        match self
            .store
            .transition(
                payout_id,
                &[PayoutStatus::Ready, PayoutStatus::Approved],
                changes,
                auth_token,
            )
            .await?
        {
            Some(updated) => {
                info!(
                    "Payout {} dispatched via {} (reference {:?})",
                    payout_id, provider, updated.provider_reference
                );
                Ok(updated)
            }
            None => {
                // The dispatch went out but the row moved under us. Keep the
                // reference in the log so an operator can reconcile by hand.
                warn!(
                    "Payout {} changed state during dispatch via {} (reference {:?})",
                    payout_id, provider, receipt.provider_reference
                );
                let current = self.store.get_payout(payout_id, auth_token).await?;
                Err(PayoutError::conflict(current.status, "trigger"))
            }
        }
    }

    /// Bypass the state machine for operational recovery. Unconditional, but
    /// always audited with the admin id and reason.
    pub async fn manual_override(
        &self,
        payout_id: Uuid,
        target: PayoutStatus,
        reason: &str,
        admin_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Payout, PayoutError> {
        if reason.trim().is_empty() {
            return Err(PayoutError::Validation(
                "A manual override requires a reason".to_string(),
            ));
        }

        let payout = self.store.get_payout(payout_id, auth_token).await?;

        let note = format!(
            "Manual override {} -> {} by admin {}: {}",
            payout.status, target, admin_id, reason
        );
        let mut changes = json!({
            "status": target,
            "notes": payout.notes_with(&note),
            "updated_at": Utc::now().to_rfc3339()
        });
        if target.is_terminal() {
            changes["processed_at"] = json!(Utc::now().to_rfc3339());
        }

        let updated = self.store.update_payout(payout_id, changes, auth_token).await?;
        info!(
            "Payout {} manually overridden to {} by {}",
            payout_id, target, admin_id
        );
        Ok(updated)
    }

    /// Apply `action` to each id independently. One failing id never aborts
    /// or rolls back its siblings; the caller gets a per-id outcome map.
    pub async fn bulk(
        &self,
        action: BulkAction,
        payout_ids: &[Uuid],
        admin_id: &str,
        auth_token: Option<&str>,
    ) -> Vec<BulkItemOutcome> {
        let tasks = payout_ids.iter().map(|&payout_id| async move {
            let result = match action {
                BulkAction::Approve => self.approve(payout_id, admin_id, auth_token).await,
                BulkAction::Trigger => self.trigger(payout_id, auth_token).await,
            };

            match result {
                Ok(payout) => BulkItemOutcome::success(payout_id, payout.status),
                Err(e) => {
                    warn!("Bulk {} failed for payout {}: {}", action, payout_id, e);
                    BulkItemOutcome::failure(payout_id, &e)
                }
            }
        });

        join_all(tasks).await
    }

    /// Admin-created payout for corrections. `amount_due` is taken as given
    /// and may deliberately differ from the sum of its items.
    pub async fn create_manual_payout(
        &self,
        request: CreateManualPayoutRequest,
        admin_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Payout, PayoutError> {
        if request.period_start >= request.period_end {
            return Err(PayoutError::Validation(
                "period_start must be before period_end".to_string(),
            ));
        }
        if request.amount_due < 0.0 {
            return Err(PayoutError::Validation(
                "amount_due must not be negative".to_string(),
            ));
        }
        if request.reason.trim().is_empty() {
            return Err(PayoutError::Validation(
                "A manual payout requires a reason".to_string(),
            ));
        }

        let count = request.items.len() as i32;
        let items: Vec<NewPayoutItem> = request
            .items
            .iter()
            .map(|item| NewPayoutItem {
                consultation_id: item.consultation_id,
                description: item.description.clone(),
                amount: item.amount,
                currency: self.config.settlement_currency.clone(),
            })
            .collect();

        let payout = NewPayout {
            doctor_id: request.doctor_id,
            period_start: request.period_start,
            period_end: request.period_end,
            consultations_count: count,
            interactions_count: count,
            amount_due: request.amount_due,
            currency: self.config.settlement_currency.clone(),
            status: PayoutStatus::Ready,
            provider: request.provider,
            notes: format!(
                "Manual payout created by admin {}: {}",
                admin_id, request.reason
            ),
        };

        match self
            .store
            .create_payout_with_items(payout, items, auth_token)
            .await?
        {
            Some(created) => {
                info!(
                    "Manual payout {} created by {} for doctor {}",
                    created.id, admin_id, request.doctor_id
                );
                Ok(created)
            }
            None => {
                let existing = self
                    .store
                    .find_by_doctor_and_period(
                        request.doctor_id,
                        request.period_start,
                        request.period_end,
                        auth_token,
                    )
                    .await?
                    .ok_or_else(|| {
                        PayoutError::Database(
                            "Duplicate payout reported but not found".to_string(),
                        )
                    })?;
                Err(PayoutError::conflict(existing.status, "create_manual"))
            }
        }
    }

    async fn payment_profile(
        &self,
        doctor_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<PaymentProfile, PayoutError> {
        let path = format!(
            "/rest/v1/doctor_payment_profiles?doctor_id=eq.{}",
            doctor_id
        );
        let profiles: Vec<PaymentProfile> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| PayoutError::Database(e.to_string()))?;

        profiles.into_iter().next().ok_or_else(|| {
            PayoutError::Validation(format!("Doctor {} has no payment profile", doctor_id))
        })
    }
}
