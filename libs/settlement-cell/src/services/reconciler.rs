use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use tracing::{error, info, warn};

use payout_cell::models::{PayoutProvider, PayoutStatus};
use payout_cell::services::store::PayoutStore;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{ReconcileOutcome, SettlementError, SettlementEvent};
use crate::services::matching::{
    AmountToleranceMatch, ExactReferenceMatch, MatchOutcome, MatchStrategy, OPEN_STATUSES,
};

/// Applies asynchronous provider confirmations to payouts. All four provider
/// handlers converge here once their payloads are verified and normalized.
pub struct SettlementReconciler {
    store: PayoutStore,
    supabase: SupabaseClient,
}

impl SettlementReconciler {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: PayoutStore::new(config),
            supabase: SupabaseClient::new(config),
        }
    }

    /// Match the event to a payout and apply the status transition. Anything
    /// that cannot be applied safely leaves every payout untouched and is
    /// recorded for manual audit.
    pub async fn reconcile(
        &self,
        event: SettlementEvent,
    ) -> Result<ReconcileOutcome, SettlementError> {
        let Some(target) = map_status(event.provider, &event.status_token) else {
            warn!(
                "Unmapped {} status token '{}', leaving state unchanged (reference {:?})",
                event.provider, event.status_token, event.reference
            );
            return Ok(ReconcileOutcome::Ignored {
                token: event.status_token.clone(),
            });
        };

        let (payout, exact) = match ExactReferenceMatch.find_match(&self.store, &event).await? {
            MatchOutcome::Matched { payout, exact } => (payout, exact),
            MatchOutcome::Ambiguous { candidates } => {
                // Reference collisions cannot happen with a unique reference
                // column, but refuse to guess if they somehow do.
                self.record_unmatched(&event, "ambiguous").await;
                return Ok(ReconcileOutcome::Ambiguous { candidates });
            }
            MatchOutcome::NoMatch => {
                // Only the mobile-money rail is allowed the amount fallback;
                // every other provider echoes our reference reliably.
                if event.provider != PayoutProvider::MobileMoney {
                    self.record_unmatched(&event, "no_match").await;
                    return Ok(ReconcileOutcome::NotFound);
                }

                match AmountToleranceMatch::default()
                    .find_match(&self.store, &event)
                    .await?
                {
                    MatchOutcome::Matched { payout, exact } => (payout, exact),
                    MatchOutcome::NoMatch => {
                        self.record_unmatched(&event, "no_match").await;
                        return Ok(ReconcileOutcome::NotFound);
                    }
                    MatchOutcome::Ambiguous { candidates } => {
                        self.record_unmatched(&event, "ambiguous").await;
                        return Ok(ReconcileOutcome::Ambiguous { candidates });
                    }
                }
            }
        };

        if payout.status.is_terminal() {
            info!(
                "Payout {} already {}, ignoring duplicate {} confirmation",
                payout.id, payout.status, event.provider
            );
            return Ok(ReconcileOutcome::AlreadySettled {
                payout_id: payout.id,
            });
        }

        let note = format!(
            "Reconciled to {} via {}: status token '{}' (reference {}, event {})",
            target,
            event.provider,
            event.status_token,
            event.reference.as_deref().unwrap_or("none"),
            event.event_id.as_deref().unwrap_or("none"),
        );

        let mut changes = json!({
            "status": target,
            "notes": payout.notes_with(&note),
            "updated_at": Utc::now().to_rfc3339()
        });
        if target.is_terminal() {
            changes["processed_at"] = json!(Utc::now().to_rfc3339());
        }
        // An exact match refreshes the reference; an amount match only fills
        // a missing one - a provider-confirmed reference is never overwritten
        // by a lower-confidence path.
        if let Some(reference) = &event.reference {
            if exact || payout.provider_reference.is_none() {
                changes["provider_reference"] = json!(reference);
            }
        }

        match self
            .store
            .transition(payout.id, &OPEN_STATUSES, changes, None)
            .await
            .map_err(|e| SettlementError::Database(e.to_string()))?
        {
            Some(updated) => {
                info!(
                    "Payout {} reconciled to {} from {} event",
                    updated.id, updated.status, event.provider
                );
                Ok(ReconcileOutcome::Applied {
                    payout_id: updated.id,
                    status: updated.status,
                })
            }
            None => {
                // A concurrent delivery won the conditional update. The only
                // way out of the open set is a settlement, so this is the
                // duplicate-confirmation no-op.
                info!(
                    "Payout {} was settled concurrently, treating {} event as duplicate",
                    payout.id, event.provider
                );
                Ok(ReconcileOutcome::AlreadySettled {
                    payout_id: payout.id,
                })
            }
        }
    }

    /// Park an event we could not apply. The transport still gets a 2xx; the
    /// parked row plus the warning log is the trail for manual resolution.
    async fn record_unmatched(&self, event: &SettlementEvent, reason: &str) {
        warn!(
            "Unmatched {} settlement event ({}): reference {:?}, amount {:?}, token '{}', event id {:?}",
            event.provider, reason, event.reference, event.amount, event.status_token, event.event_id
        );

        let row = json!({
            "provider": event.provider,
            "provider_reference": event.reference,
            "amount": event.amount,
            "status_token": event.status_token,
            "event_id": event.event_id,
            "reason": reason,
            "received_at": Utc::now().to_rfc3339()
        });

        if let Err(e) = self
            .supabase
            .execute(Method::POST, "/rest/v1/unmatched_settlement_events", None, Some(row))
            .await
        {
            error!("Failed to record unmatched settlement event: {}", e);
        }
    }
}

/// Provider vocabulary to internal status. Unknown tokens map to None so a
/// new provider code can never silently read as success.
pub fn map_status(provider: PayoutProvider, token: &str) -> Option<PayoutStatus> {
    match provider {
        PayoutProvider::Card => match token {
            "success" | "transfer.success" => Some(PayoutStatus::Paid),
            "failed" | "transfer.failed" | "reversed" | "transfer.reversed" => {
                Some(PayoutStatus::Failed)
            }
            "pending" | "processing" | "transfer.pending" => Some(PayoutStatus::Processing),
            _ => None,
        },
        PayoutProvider::Paypal => match token.to_ascii_uppercase().as_str() {
            "SUCCESS" | "PAYMENT.PAYOUTS-ITEM.SUCCEEDED" => Some(PayoutStatus::Paid),
            "FAILED" | "RETURNED" | "BLOCKED" | "CANCELED" | "DENIED" | "REFUNDED"
            | "REVERSED" => Some(PayoutStatus::Failed),
            "PENDING" | "ONHOLD" | "UNCLAIMED" | "NEW" => Some(PayoutStatus::Processing),
            _ => None,
        },
        // Mobile money reports integer result codes: zero is success,
        // anything else a terminal failure. Non-numeric tokens are unmapped.
        PayoutProvider::MobileMoney => match token.parse::<i64>() {
            Ok(0) => Some(PayoutStatus::Paid),
            Ok(_) => Some(PayoutStatus::Failed),
            Err(_) => None,
        },
        PayoutProvider::BankTransfer => match token {
            "settled" | "paid" => Some(PayoutStatus::Paid),
            "failed" | "returned" => Some(PayoutStatus::Failed),
            "processing" => Some(PayoutStatus::Processing),
            _ => None,
        },
    }
}
