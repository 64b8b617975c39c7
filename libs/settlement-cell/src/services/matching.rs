use async_trait::async_trait;
use tracing::{info, warn};

use payout_cell::models::{Payout, PayoutStatus};
use payout_cell::services::store::PayoutStore;

use crate::models::{SettlementError, SettlementEvent};

/// Absolute tolerance, in settlement currency units, for the amount fallback.
pub const AMOUNT_TOLERANCE: f64 = 1.0;

/// Statuses a settlement confirmation may still land on.
pub const OPEN_STATUSES: [PayoutStatus; 3] = [
    PayoutStatus::Processing,
    PayoutStatus::Approved,
    PayoutStatus::Ready,
];

#[derive(Debug)]
pub enum MatchOutcome {
    /// `exact` records whether the match came from the provider reference;
    /// the reconciler only refreshes an existing reference on exact matches.
    Matched { payout: Payout, exact: bool },
    NoMatch,
    Ambiguous { candidates: usize },
}

/// How a provider event finds its payout. Exact reference matching is the
/// contract; the amount fallback exists only for rails that cannot echo a
/// stable reference and can be swapped out per provider without touching the
/// reconciler.
#[async_trait]
pub trait MatchStrategy: Send + Sync {
    async fn find_match(
        &self,
        store: &PayoutStore,
        event: &SettlementEvent,
    ) -> Result<MatchOutcome, SettlementError>;
}

pub struct ExactReferenceMatch;

#[async_trait]
impl MatchStrategy for ExactReferenceMatch {
    async fn find_match(
        &self,
        store: &PayoutStore,
        event: &SettlementEvent,
    ) -> Result<MatchOutcome, SettlementError> {
        let Some(reference) = event.reference.as_deref() else {
            return Ok(MatchOutcome::NoMatch);
        };

        match store
            .find_by_provider_reference(reference, None)
            .await
            .map_err(|e| SettlementError::Database(e.to_string()))?
        {
            Some(payout) => Ok(MatchOutcome::Matched {
                payout,
                exact: true,
            }),
            None => Ok(MatchOutcome::NoMatch),
        }
    }
}

/// Best-effort fallback: match on the reported amount among open payouts.
/// Inherently ambiguous when two payouts carry near-identical amounts in the
/// same window, so anything other than exactly one candidate refuses to
/// guess. Every decision is logged with all candidates considered.
pub struct AmountToleranceMatch {
    pub tolerance: f64,
}

impl Default for AmountToleranceMatch {
    fn default() -> Self {
        Self {
            tolerance: AMOUNT_TOLERANCE,
        }
    }
}

#[async_trait]
impl MatchStrategy for AmountToleranceMatch {
    async fn find_match(
        &self,
        store: &PayoutStore,
        event: &SettlementEvent,
    ) -> Result<MatchOutcome, SettlementError> {
        let Some(amount) = event.amount else {
            return Ok(MatchOutcome::NoMatch);
        };

        // Most recent first, straight from the store ordering.
        let candidates = store
            .find_settlement_candidates(&OPEN_STATUSES, None)
            .await
            .map_err(|e| SettlementError::Database(e.to_string()))?;

        let close = close_candidates(&candidates, amount, self.tolerance);

        match close.len() {
            0 => Ok(MatchOutcome::NoMatch),
            1 => {
                let payout = close[0];
                info!(
                    "Amount-tolerance match: reported {} matched payout {} (amount_due {}, created {})",
                    amount, payout.id, payout.amount_due, payout.created_at
                );
                Ok(MatchOutcome::Matched {
                    payout: payout.clone(),
                    exact: false,
                })
            }
            n => {
                let considered = close
                    .iter()
                    .map(|p| {
                        format!(
                            "{} ({} {}, created {})",
                            p.id, p.amount_due, p.currency, p.created_at
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                warn!(
                    "Ambiguous settlement amount {}: {} candidates within tolerance {}: {}",
                    amount, n, self.tolerance, considered
                );
                Ok(MatchOutcome::Ambiguous { candidates: n })
            }
        }
    }
}

fn close_candidates(candidates: &[Payout], amount: f64, tolerance: f64) -> Vec<&Payout> {
    candidates
        .iter()
        .filter(|payout| (payout.amount_due - amount).abs() < tolerance)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn payout_with_amount(amount_due: f64) -> Payout {
        Payout {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            period_start: Utc::now(),
            period_end: Utc::now(),
            consultations_count: 1,
            interactions_count: 1,
            amount_due,
            currency: "KES".to_string(),
            status: PayoutStatus::Processing,
            provider: None,
            provider_reference: None,
            approved_by: None,
            processed_at: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn exact_amount_is_within_tolerance() {
        let candidates = vec![payout_with_amount(1500.0), payout_with_amount(3000.0)];
        let close = close_candidates(&candidates, 1500.0, AMOUNT_TOLERANCE);

        assert_eq!(close.len(), 1);
        assert_eq!(close[0].amount_due, 1500.0);
    }

    #[test]
    fn near_amount_is_within_tolerance() {
        let candidates = vec![payout_with_amount(1500.0)];
        assert_eq!(close_candidates(&candidates, 1500.5, AMOUNT_TOLERANCE).len(), 1);
        assert_eq!(close_candidates(&candidates, 1499.1, AMOUNT_TOLERANCE).len(), 1);
    }

    #[test]
    fn tolerance_boundary_is_exclusive() {
        let candidates = vec![payout_with_amount(1500.0)];
        assert!(close_candidates(&candidates, 1501.0, AMOUNT_TOLERANCE).is_empty());
    }

    #[test]
    fn two_near_identical_amounts_both_qualify() {
        // The strategy reports both; the reconciler refuses to guess.
        let candidates = vec![payout_with_amount(1500.0), payout_with_amount(1500.2)];
        assert_eq!(close_candidates(&candidates, 1500.0, AMOUNT_TOLERANCE).len(), 2);
    }
}
