use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use tracing::warn;

use shared_config::AppConfig;

use crate::models::SettlementError;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Card rail signs the raw body with HMAC-SHA512, hex encoded, in
/// `x-card-signature`.
pub fn verify_card_signature(
    config: &AppConfig,
    body: &str,
    signature: Option<&str>,
) -> Result<(), SettlementError> {
    let secret = &config.card_secret_key;
    if secret.is_empty() {
        return unverified(config, "card");
    }

    let signature = signature.ok_or_else(|| {
        SettlementError::SignatureVerification("missing x-card-signature header".to_string())
    })?;

    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|_| SettlementError::SignatureVerification("invalid secret".to_string()))?;
    mac.update(body.as_bytes());
    let expected = hex_encode(&mac.finalize().into_bytes());

    if !signature.eq_ignore_ascii_case(&expected) {
        return Err(SettlementError::SignatureVerification(
            "card signature mismatch".to_string(),
        ));
    }

    Ok(())
}

/// PayPal transmission signature, simplified to an HMAC-SHA256 of the raw
/// body under the shared webhook secret, base64 in `paypal-transmission-sig`.
pub fn verify_paypal_signature(
    config: &AppConfig,
    body: &str,
    signature: Option<&str>,
) -> Result<(), SettlementError> {
    let secret = &config.paypal_webhook_secret;
    if secret.is_empty() {
        return unverified(config, "paypal");
    }

    let signature = signature.ok_or_else(|| {
        SettlementError::SignatureVerification(
            "missing paypal-transmission-sig header".to_string(),
        )
    })?;

    let provided = STANDARD.decode(signature).map_err(|_| {
        SettlementError::SignatureVerification("paypal signature is not valid base64".to_string())
    })?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SettlementError::SignatureVerification("invalid secret".to_string()))?;
    mac.update(body.as_bytes());

    mac.verify_slice(&provided).map_err(|_| {
        SettlementError::SignatureVerification("paypal signature mismatch".to_string())
    })
}

/// Mobile money cannot sign its callbacks; authenticity rests on a shared
/// bearer token in the Authorization header.
pub fn verify_mobile_money_token(
    config: &AppConfig,
    authorization: Option<&str>,
) -> Result<(), SettlementError> {
    let secret = &config.mobile_money_webhook_secret;
    if secret.is_empty() {
        return unverified(config, "mobile money");
    }

    let header = authorization.ok_or_else(|| {
        SettlementError::SignatureVerification("missing authorization header".to_string())
    })?;

    let token = header.strip_prefix("Bearer ").unwrap_or(header);
    if token != secret {
        return Err(SettlementError::SignatureVerification(
            "mobile money token mismatch".to_string(),
        ));
    }

    Ok(())
}

/// Missing secret: hard failure in production, warn-and-continue elsewhere so
/// local and staging setups keep working without provider credentials.
fn unverified(config: &AppConfig, provider: &str) -> Result<(), SettlementError> {
    if config.is_production() {
        Err(SettlementError::SignatureVerification(format!(
            "{} webhook secret is not configured",
            provider
        )))
    } else {
        warn!(
            "{} webhook secret is not configured; accepting unverified payload outside production",
            provider
        );
        Ok(())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_utils::test_utils::TestConfig;

    fn card_signature(secret: &str, body: &str) -> String {
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body.as_bytes());
        hex_encode(&mac.finalize().into_bytes())
    }

    fn paypal_signature(secret: &str, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn card_accepts_valid_signature() {
        let config = TestConfig::default().to_app_config();
        let body = r#"{"event":"transfer.success"}"#;
        let signature = card_signature(&config.card_secret_key, body);

        assert!(verify_card_signature(&config, body, Some(&signature)).is_ok());
    }

    #[test]
    fn card_rejects_tampered_body() {
        let config = TestConfig::default().to_app_config();
        let signature = card_signature(&config.card_secret_key, r#"{"amount":100}"#);

        let result = verify_card_signature(&config, r#"{"amount":999}"#, Some(&signature));
        assert!(result.is_err());
    }

    #[test]
    fn card_rejects_missing_header() {
        let config = TestConfig::default().to_app_config();
        assert!(verify_card_signature(&config, "{}", None).is_err());
    }

    #[test]
    fn paypal_accepts_valid_signature() {
        let config = TestConfig::default().to_app_config();
        let body = r#"{"event_type":"PAYMENT.PAYOUTS-ITEM.SUCCEEDED"}"#;
        let signature = paypal_signature(&config.paypal_webhook_secret, body);

        assert!(verify_paypal_signature(&config, body, Some(&signature)).is_ok());
    }

    #[test]
    fn paypal_rejects_garbage_signature() {
        let config = TestConfig::default().to_app_config();
        assert!(verify_paypal_signature(&config, "{}", Some("not-base64!!!")).is_err());
    }

    #[test]
    fn mobile_money_accepts_bearer_token() {
        let config = TestConfig::default().to_app_config();
        let header = format!("Bearer {}", config.mobile_money_webhook_secret);

        assert!(verify_mobile_money_token(&config, Some(&header)).is_ok());
    }

    #[test]
    fn mobile_money_rejects_wrong_token() {
        let config = TestConfig::default().to_app_config();
        assert!(verify_mobile_money_token(&config, Some("Bearer wrong")).is_err());
    }

    #[test]
    fn missing_secret_passes_outside_production() {
        let mut config = TestConfig::default().to_app_config();
        config.card_secret_key = String::new();

        assert!(verify_card_signature(&config, "{}", None).is_ok());
    }

    #[test]
    fn missing_secret_rejects_in_production() {
        let mut config = TestConfig::default().to_app_config();
        config.card_secret_key = String::new();
        config.environment = "production".to_string();

        assert!(verify_card_signature(&config, "{}", None).is_err());
    }
}
