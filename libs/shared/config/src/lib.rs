use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub environment: String,
    pub settlement_currency: String,
    pub transfer_dispatch_timeout_secs: u64,
    pub card_api_base: String,
    pub card_secret_key: String,
    pub paypal_api_base: String,
    pub paypal_api_token: String,
    pub paypal_webhook_secret: String,
    pub mobile_money_api_base: String,
    pub mobile_money_api_token: String,
    pub mobile_money_webhook_secret: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            environment: env::var("APP_ENV")
                .unwrap_or_else(|_| "development".to_string()),
            settlement_currency: env::var("SETTLEMENT_CURRENCY")
                .unwrap_or_else(|_| "KES".to_string()),
            transfer_dispatch_timeout_secs: env::var("TRANSFER_DISPATCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            card_api_base: env::var("CARD_API_BASE")
                .unwrap_or_else(|_| {
                    warn!("CARD_API_BASE not set, using empty value");
                    String::new()
                }),
            card_secret_key: env::var("CARD_SECRET_KEY")
                .unwrap_or_else(|_| {
                    warn!("CARD_SECRET_KEY not set, using empty value");
                    String::new()
                }),
            paypal_api_base: env::var("PAYPAL_API_BASE")
                .unwrap_or_else(|_| {
                    warn!("PAYPAL_API_BASE not set, using empty value");
                    String::new()
                }),
            paypal_api_token: env::var("PAYPAL_API_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("PAYPAL_API_TOKEN not set, using empty value");
                    String::new()
                }),
            paypal_webhook_secret: env::var("PAYPAL_WEBHOOK_SECRET")
                .unwrap_or_else(|_| {
                    warn!("PAYPAL_WEBHOOK_SECRET not set, using empty value");
                    String::new()
                }),
            mobile_money_api_base: env::var("MOBILE_MONEY_API_BASE")
                .unwrap_or_else(|_| {
                    warn!("MOBILE_MONEY_API_BASE not set, using empty value");
                    String::new()
                }),
            mobile_money_api_token: env::var("MOBILE_MONEY_API_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("MOBILE_MONEY_API_TOKEN not set, using empty value");
                    String::new()
                }),
            mobile_money_webhook_secret: env::var("MOBILE_MONEY_WEBHOOK_SECRET")
                .unwrap_or_else(|_| {
                    warn!("MOBILE_MONEY_WEBHOOK_SECRET not set, using empty value");
                    String::new()
                }),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_card_dispatch_configured(&self) -> bool {
        !self.card_api_base.is_empty() && !self.card_secret_key.is_empty()
    }

    pub fn is_paypal_dispatch_configured(&self) -> bool {
        !self.paypal_api_base.is_empty() && !self.paypal_api_token.is_empty()
    }

    pub fn is_mobile_money_dispatch_configured(&self) -> bool {
        !self.mobile_money_api_base.is_empty() && !self.mobile_money_api_token.is_empty()
    }
}
