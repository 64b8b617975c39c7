use std::collections::HashMap;

use reqwest::Method;
use serde::Deserialize;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Payout, PayoutError, PayoutListFilters, PayoutStatus};
use crate::services::store::PayoutStore;

pub const EXPORT_HEADER: &str = "payoutId,payeeId,payeeName,periodStart,periodEnd,consultationsCount,amountDue,currency,status,providerReference,notes";

#[derive(Debug, Deserialize)]
struct DoctorName {
    id: Uuid,
    full_name: String,
}

/// Flat tabular extract of payouts for offline audit.
pub struct PayoutExportService {
    store: PayoutStore,
    supabase: SupabaseClient,
}

impl PayoutExportService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: PayoutStore::new(config),
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn export_csv(
        &self,
        status: Option<PayoutStatus>,
        auth_token: Option<&str>,
    ) -> Result<String, PayoutError> {
        let filters = PayoutListFilters {
            status,
            ..Default::default()
        };
        let payouts = self.store.list_payouts(&filters, auth_token).await?;
        let names = self.doctor_names(&payouts, auth_token).await?;

        Ok(render_csv(&payouts, &names))
    }

    async fn doctor_names(
        &self,
        payouts: &[Payout],
        auth_token: Option<&str>,
    ) -> Result<HashMap<Uuid, String>, PayoutError> {
        if payouts.is_empty() {
            return Ok(HashMap::new());
        }

        let mut ids: Vec<String> = payouts.iter().map(|p| p.doctor_id.to_string()).collect();
        ids.sort();
        ids.dedup();

        let path = format!(
            "/rest/v1/doctors?id=in.({})&select=id,full_name",
            ids.join(",")
        );
        let doctors: Vec<DoctorName> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| PayoutError::Database(e.to_string()))?;

        Ok(doctors.into_iter().map(|d| (d.id, d.full_name)).collect())
    }
}

fn render_csv(payouts: &[Payout], names: &HashMap<Uuid, String>) -> String {
    let mut csv = String::from(EXPORT_HEADER);
    csv.push('\n');

    for payout in payouts {
        let name = names.get(&payout.doctor_id).cloned().unwrap_or_default();
        let fields = [
            payout.id.to_string(),
            payout.doctor_id.to_string(),
            name,
            payout.period_start.to_rfc3339(),
            payout.period_end.to_rfc3339(),
            payout.consultations_count.to_string(),
            format!("{:.2}", payout.amount_due),
            payout.currency.clone(),
            payout.status.to_string(),
            payout.provider_reference.clone().unwrap_or_default(),
            payout.notes.clone().unwrap_or_default(),
        ];

        let row = fields
            .iter()
            .map(|field| escape_csv_field(field))
            .collect::<Vec<_>>()
            .join(",");
        csv.push_str(&row);
        csv.push('\n');
    }

    csv
}

/// RFC-4180 quoting: free-text fields may carry delimiters, quotes and
/// newlines without breaking the tabular format.
pub fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
