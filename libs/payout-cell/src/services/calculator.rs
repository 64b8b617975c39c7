use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use urlencoding::encode;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    BillableConsultation, NewPayout, NewPayoutItem, PaymentProfile, PayoutError, PayoutProvider,
    PayoutStatus,
};
use crate::services::store::PayoutStore;

/// Settings key read from the rate source.
pub const RATE_SETTING_KEY: &str = "PAYOUT_RATE_PER_CONSULTATION";

/// Fallback applied when the rate source has no usable value, in settlement
/// currency units per completed consultation.
pub const DEFAULT_RATE_PER_CONSULTATION: f64 = 500.0;

#[derive(Debug, Deserialize)]
struct RateSetting {
    #[allow(dead_code)]
    key: String,
    value: String,
}

/// Batch job that turns a period of completed consultations into READY
/// payouts, one per doctor.
pub struct PayoutCalculator {
    supabase: SupabaseClient,
    store: PayoutStore,
    settlement_currency: String,
}

impl PayoutCalculator {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            store: PayoutStore::new(config),
            settlement_currency: config.settlement_currency.clone(),
        }
    }

    /// Compute payouts for every doctor with completed consultations in the
    /// period. Returns the number of payouts created. Re-running for a period
    /// that was already processed creates nothing and is not an error.
    pub async fn compute_for_period(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<u32, PayoutError> {
        if period_start >= period_end {
            return Err(PayoutError::Validation(
                "period_start must be before period_end".to_string(),
            ));
        }

        info!(
            "Computing payouts for period {} to {}",
            period_start, period_end
        );

        let rate = self.current_rate().await;
        let consultations = self
            .completed_consultations(period_start, period_end)
            .await?;

        if consultations.is_empty() {
            info!("No billable consultations in period, nothing to do");
            return Ok(0);
        }

        let mut by_doctor: HashMap<Uuid, Vec<BillableConsultation>> = HashMap::new();
        for consultation in consultations {
            by_doctor
                .entry(consultation.doctor_id)
                .or_default()
                .push(consultation);
        }

        let mut created = 0u32;
        for (doctor_id, group) in by_doctor {
            match self
                .create_doctor_payout(doctor_id, &group, rate, period_start, period_end)
                .await
            {
                Ok(true) => created += 1,
                Ok(false) => {
                    debug!(
                        "Doctor {} already has a payout for this period, skipped",
                        doctor_id
                    );
                }
                Err(e) => {
                    // One doctor's failure must not sink the batch; log enough
                    // to replay this group by hand.
                    error!(
                        "Failed to create payout for doctor {} ({} consultations, period {} to {}): {}",
                        doctor_id,
                        group.len(),
                        period_start,
                        period_end,
                        e
                    );
                }
            }
        }

        info!("Created {} payouts for period", created);
        Ok(created)
    }

    /// Current per-consultation rate from the settings table, falling back to
    /// `DEFAULT_RATE_PER_CONSULTATION` when unset or unparseable.
    async fn current_rate(&self) -> f64 {
        let path = format!("/rest/v1/app_settings?key=eq.{}", RATE_SETTING_KEY);
        let rows: Vec<RateSetting> = match self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    "Could not read {} setting, using default rate {}: {}",
                    RATE_SETTING_KEY, DEFAULT_RATE_PER_CONSULTATION, e
                );
                return DEFAULT_RATE_PER_CONSULTATION;
            }
        };

        match rows.first().and_then(|row| row.value.parse::<f64>().ok()) {
            Some(rate) if rate > 0.0 => rate,
            _ => {
                warn!(
                    "{} is unset or invalid, using default rate {}",
                    RATE_SETTING_KEY, DEFAULT_RATE_PER_CONSULTATION
                );
                DEFAULT_RATE_PER_CONSULTATION
            }
        }
    }

    async fn completed_consultations(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Vec<BillableConsultation>, PayoutError> {
        let path = format!(
            "/rest/v1/consultations?status=eq.completed&doctor_id=not.is.null&completed_at=gte.{}&completed_at=lte.{}&select=id,doctor_id,patient_id,completed_at",
            encode(&period_start.to_rfc3339()),
            encode(&period_end.to_rfc3339()),
        );

        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| PayoutError::Database(e.to_string()))
    }

    /// Create one payout with one item per consultation. Returns false when
    /// the doctor already has a payout for the period (pre-check or unique
    /// key), whatever its status - corrections go through manual payouts.
    async fn create_doctor_payout(
        &self,
        doctor_id: Uuid,
        group: &[BillableConsultation],
        rate: f64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<bool, PayoutError> {
        if self
            .store
            .find_by_doctor_and_period(doctor_id, period_start, period_end, None)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        let count = group.len() as i32;
        let provider = self.preferred_provider(doctor_id).await;

        let payout = NewPayout {
            doctor_id,
            period_start,
            period_end,
            consultations_count: count,
            interactions_count: count,
            amount_due: rate * count as f64,
            currency: self.settlement_currency.clone(),
            status: PayoutStatus::Ready,
            provider,
            notes: format!(
                "Auto-generated payout for {} consultations between {} and {} at rate {}",
                count, period_start, period_end, rate
            ),
        };

        let items = group
            .iter()
            .map(|consultation| NewPayoutItem {
                consultation_id: consultation.id,
                description: format!(
                    "Consultation {} completed {}",
                    consultation.id,
                    consultation.completed_at.date_naive()
                ),
                amount: rate,
                currency: self.settlement_currency.clone(),
            })
            .collect();

        Ok(self
            .store
            .create_payout_with_items(payout, items, None)
            .await?
            .is_some())
    }

    /// The rail from the doctor's payment profile, if one is on file. A
    /// missing profile is not an error here; dispatch insists on it later.
    async fn preferred_provider(&self, doctor_id: Uuid) -> Option<PayoutProvider> {
        let path = format!(
            "/rest/v1/doctor_payment_profiles?doctor_id=eq.{}",
            doctor_id
        );
        let profiles: Vec<PaymentProfile> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .unwrap_or_default();

        profiles.first().map(|profile| profile.provider)
    }
}
