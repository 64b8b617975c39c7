use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, warn};
use urlencoding::encode;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    NewPayout, NewPayoutItem, Payout, PayoutError, PayoutItem, PayoutListFilters, PayoutStatus,
};

/// Storage handle for the payout aggregate. Constructed per service and
/// injected, never shared as a global.
pub struct PayoutStore {
    supabase: SupabaseClient,
}

impl PayoutStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub fn supabase(&self) -> &SupabaseClient {
        &self.supabase
    }

    pub async fn get_payout(
        &self,
        payout_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Payout, PayoutError> {
        debug!("Fetching payout: {}", payout_id);

        let path = format!("/rest/v1/payouts?id=eq.{}", payout_id);
        let result: Vec<Payout> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| PayoutError::Database(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| PayoutError::NotFound(payout_id.to_string()))
    }

    pub async fn get_items(
        &self,
        payout_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Vec<PayoutItem>, PayoutError> {
        let path = format!(
            "/rest/v1/payout_items?payout_id=eq.{}&order=created_at.asc",
            payout_id
        );
        self.supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| PayoutError::Database(e.to_string()))
    }

    pub async fn list_payouts(
        &self,
        filters: &PayoutListFilters,
        auth_token: Option<&str>,
    ) -> Result<Vec<Payout>, PayoutError> {
        let mut path = String::from("/rest/v1/payouts?order=created_at.desc");

        if let Some(doctor_id) = filters.doctor_id {
            path.push_str(&format!("&doctor_id=eq.{}", doctor_id));
        }
        if let Some(status) = filters.status {
            path.push_str(&format!("&status=eq.{}", status.as_str()));
        }
        if let Some(provider) = filters.provider {
            path.push_str(&format!("&provider=eq.{}", provider.as_str()));
        }
        if let Some(from) = filters.period_from {
            path.push_str(&format!("&period_start=gte.{}", encode(&from.to_rfc3339())));
        }
        if let Some(to) = filters.period_to {
            path.push_str(&format!("&period_end=lte.{}", encode(&to.to_rfc3339())));
        }
        if let Some(limit) = filters.limit {
            path.push_str(&format!("&limit={}", limit));
        }
        if let Some(skip) = filters.skip {
            path.push_str(&format!("&offset={}", skip));
        }

        self.supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| PayoutError::Database(e.to_string()))
    }

    pub async fn find_by_provider_reference(
        &self,
        reference: &str,
        auth_token: Option<&str>,
    ) -> Result<Option<Payout>, PayoutError> {
        let path = format!(
            "/rest/v1/payouts?provider_reference=eq.{}",
            encode(reference)
        );
        let result: Vec<Payout> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| PayoutError::Database(e.to_string()))?;

        Ok(result.into_iter().next())
    }

    pub async fn find_by_doctor_and_period(
        &self,
        doctor_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        auth_token: Option<&str>,
    ) -> Result<Option<Payout>, PayoutError> {
        let path = format!(
            "/rest/v1/payouts?doctor_id=eq.{}&period_start=eq.{}&period_end=eq.{}",
            doctor_id,
            encode(&period_start.to_rfc3339()),
            encode(&period_end.to_rfc3339()),
        );
        let result: Vec<Payout> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| PayoutError::Database(e.to_string()))?;

        Ok(result.into_iter().next())
    }

    /// Payouts still open for settlement matching, most recent first.
    pub async fn find_settlement_candidates(
        &self,
        statuses: &[PayoutStatus],
        auth_token: Option<&str>,
    ) -> Result<Vec<Payout>, PayoutError> {
        let status_list = statuses
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let path = format!(
            "/rest/v1/payouts?status=in.({})&order=created_at.desc",
            status_list
        );
        self.supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| PayoutError::Database(e.to_string()))
    }

    /// Insert a payout and its items. The `(doctor_id, period_start,
    /// period_end)` unique key is the serialization point against concurrent
    /// calculator runs: a duplicate insert is silently dropped by the
    /// database and reported here as `Ok(None)`.
    ///
    /// The two-step write is compensated: if the item batch fails, the parent
    /// row is deleted so no payout ever exists without its items.
    pub async fn create_payout_with_items(
        &self,
        payout: NewPayout,
        items: Vec<NewPayoutItem>,
        auth_token: Option<&str>,
    ) -> Result<Option<Payout>, PayoutError> {
        let payout_data = json!({
            "doctor_id": payout.doctor_id,
            "period_start": payout.period_start.to_rfc3339(),
            "period_end": payout.period_end.to_rfc3339(),
            "consultations_count": payout.consultations_count,
            "interactions_count": payout.interactions_count,
            "amount_due": payout.amount_due,
            "currency": payout.currency,
            "status": payout.status,
            "provider": payout.provider,
            "notes": payout.notes,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let mut headers = HeaderMap::new();
        headers.insert(
            "Prefer",
            HeaderValue::from_static("return=representation,resolution=ignore-duplicates"),
        );

        let path = "/rest/v1/payouts?on_conflict=doctor_id,period_start,period_end";
        let result: Vec<Payout> = self
            .supabase
            .request_with_headers(Method::POST, path, auth_token, Some(payout_data), Some(headers))
            .await
            .map_err(|e| PayoutError::Database(e.to_string()))?;

        let Some(created) = result.into_iter().next() else {
            debug!(
                "Payout for doctor {} and period already exists, skipping",
                payout.doctor_id
            );
            return Ok(None);
        };

        if !items.is_empty() {
            let item_rows: Value = items
                .iter()
                .map(|item| {
                    json!({
                        "payout_id": created.id,
                        "consultation_id": item.consultation_id,
                        "description": item.description,
                        "amount": item.amount,
                        "currency": item.currency,
                        "created_at": Utc::now().to_rfc3339()
                    })
                })
                .collect::<Vec<_>>()
                .into();

            if let Err(e) = self
                .supabase
                .execute(Method::POST, "/rest/v1/payout_items", auth_token, Some(item_rows))
                .await
            {
                warn!(
                    "Item write failed for payout {}, removing parent row: {}",
                    created.id, e
                );
                let cleanup_path = format!("/rest/v1/payouts?id=eq.{}", created.id);
                if let Err(cleanup_err) = self
                    .supabase
                    .execute(Method::DELETE, &cleanup_path, auth_token, None)
                    .await
                {
                    error!(
                        "Compensating delete failed for payout {}: {}",
                        created.id, cleanup_err
                    );
                }
                return Err(PayoutError::Database(format!(
                    "Failed to write payout items: {}",
                    e
                )));
            }
        }

        Ok(Some(created))
    }

    /// Conditional single-request update: the row is only written if its
    /// status is still one of `from`. Returns `None` when another writer got
    /// there first; the caller decides whether that is a conflict or a no-op.
    pub async fn transition(
        &self,
        payout_id: Uuid,
        from: &[PayoutStatus],
        changes: Value,
        auth_token: Option<&str>,
    ) -> Result<Option<Payout>, PayoutError> {
        let from_list = from
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let path = format!(
            "/rest/v1/payouts?id=eq.{}&status=in.({})",
            payout_id, from_list
        );

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let result: Vec<Payout> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, auth_token, Some(changes), Some(headers))
            .await
            .map_err(|e| PayoutError::Database(e.to_string()))?;

        Ok(result.into_iter().next())
    }

    /// Unconditional update, reserved for audited manual overrides.
    pub async fn update_payout(
        &self,
        payout_id: Uuid,
        changes: Value,
        auth_token: Option<&str>,
    ) -> Result<Payout, PayoutError> {
        let path = format!("/rest/v1/payouts?id=eq.{}", payout_id);

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let result: Vec<Payout> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, auth_token, Some(changes), Some(headers))
            .await
            .map_err(|e| PayoutError::Database(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| PayoutError::NotFound(payout_id.to_string()))
    }
}
