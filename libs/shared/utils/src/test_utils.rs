use std::sync::Arc;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{JwtClaims, User};

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            environment: "test".to_string(),
            settlement_currency: "KES".to_string(),
            transfer_dispatch_timeout_secs: 5,
            card_api_base: "http://localhost:54322".to_string(),
            card_secret_key: "test-card-secret".to_string(),
            paypal_api_base: "http://localhost:54323".to_string(),
            paypal_api_token: "test-paypal-token".to_string(),
            paypal_webhook_secret: "test-paypal-webhook-secret".to_string(),
            mobile_money_api_base: "http://localhost:54324".to_string(),
            mobile_money_api_token: "test-mobile-money-token".to_string(),
            mobile_money_webhook_secret: "test-mobile-money-webhook-secret".to_string(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let claims = JwtClaims {
            sub: user.id.clone(),
            exp: Some(exp.timestamp() as u64),
            email: Some(user.email.clone()),
            role: Some(user.role.clone()),
            app_metadata: None,
            user_metadata: None,
            aud: Some("authenticated".to_string()),
            iat: Some(now.timestamp() as u64),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("test token encoding cannot fail")
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn payout_response(
        id: &str,
        doctor_id: &str,
        status: &str,
        amount_due: f64,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "doctor_id": doctor_id,
            "period_start": "2025-06-01T00:00:00Z",
            "period_end": "2025-07-01T00:00:00Z",
            "consultations_count": 3,
            "interactions_count": 3,
            "amount_due": amount_due,
            "currency": "KES",
            "status": status,
            "provider": "mobile_money",
            "provider_reference": null,
            "approved_by": null,
            "processed_at": null,
            "notes": "Auto-generated payout",
            "created_at": "2025-07-01T02:00:00Z",
            "updated_at": "2025-07-01T02:00:00Z"
        })
    }

    pub fn payout_item_response(payout_id: &str, amount: f64) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "payout_id": payout_id,
            "consultation_id": Uuid::new_v4(),
            "description": "Completed consultation",
            "amount": amount,
            "currency": "KES",
            "created_at": "2025-07-01T02:00:00Z"
        })
    }

    pub fn consultation_response(doctor_id: &str, completed_at: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "patient_id": Uuid::new_v4(),
            "status": "completed",
            "completed_at": completed_at
        })
    }

    pub fn doctor_response(id: &str, full_name: &str) -> serde_json::Value {
        json!({
            "id": id,
            "full_name": full_name,
            "email": "doctor@example.com"
        })
    }

    pub fn payment_profile_response(doctor_id: &str, provider: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "provider": provider,
            "msisdn": "254700000001",
            "paypal_email": "doctor@example.com",
            "bank_name": "Test Bank",
            "bank_account": "0123456789",
            "card_recipient_code": "RCP_test",
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn rate_setting_response(value: &str) -> serde_json::Value {
        json!({
            "key": "PAYOUT_RATE_PER_CONSULTATION",
            "value": value
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::validate_token;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(!app_config.supabase_jwt_secret.is_empty());
        assert!(!app_config.is_production());
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::doctor("doc@example.com");
        assert_eq!(user.email, "doc@example.com");
        assert_eq!(user.role, "doctor");

        let user_model = user.to_user();
        assert_eq!(user_model.email, Some(user.email.clone()));
        assert_eq!(user_model.role, Some(user.role.clone()));
        assert_eq!(user_model.id, user.id);
        assert!(user_model.is_doctor());
    }

    #[test]
    fn test_jwt_token_roundtrip() {
        let config = TestConfig::default();
        let user = TestUser::admin("admin@example.com");
        let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, Some(1));

        let validated = validate_token(&token, &config.jwt_secret).unwrap();
        assert_eq!(validated.id, user.id);
        assert!(validated.is_admin());
    }

    #[test]
    fn test_jwt_rejects_bad_signature() {
        let config = TestConfig::default();
        let user = TestUser::default();
        let token = JwtTestUtils::create_invalid_signature_token(&user);

        assert!(validate_token(&token, &config.jwt_secret).is_err());
    }

    #[test]
    fn test_jwt_rejects_expired() {
        let config = TestConfig::default();
        let user = TestUser::default();
        let token = JwtTestUtils::create_expired_token(&user, &config.jwt_secret);

        assert!(validate_token(&token, &config.jwt_secret).is_err());
    }
}
