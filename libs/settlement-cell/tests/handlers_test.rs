// Webhook handlers: signature gates, transport acks, manual bank settlement.

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::http::{HeaderMap, HeaderName};
use axum::Json;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::{Sha256, Sha512};
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use settlement_cell::handlers::{
    card_settlement_webhook, confirm_bank_settlement, mobile_money_settlement_webhook,
    paypal_settlement_webhook,
};
use settlement_cell::models::{BankSettlementOutcome, BankSettlementRequest};
use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

fn config_for(server: &MockServer) -> AppConfig {
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = server.uri();
    config
}

fn card_signature(secret: &str, body: &str) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn paypal_signature(secret: &str, body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

fn headers_with(name: &str, value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_bytes(name.as_bytes()).unwrap(),
        value.parse().unwrap(),
    );
    headers
}

async fn mount_unmatched_sink(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/unmatched_settlement_events"))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;
}

#[tokio::test]
async fn card_webhook_rejects_bad_signature() {
    let config = TestConfig::default().to_app_config();
    let body = json!({ "event": "transfer.success", "data": { "transfer_code": "TRF_1" } });

    let result = card_settlement_webhook(
        State(Arc::new(config)),
        headers_with("x-card-signature", "deadbeef"),
        body.to_string(),
    )
    .await;

    assert!(matches!(result, Err(AppError::Auth(_))));
}

#[tokio::test]
async fn card_webhook_acks_even_when_no_payout_matches() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    Mock::given(method("GET"))
        .and(path("/rest/v1/payouts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    mount_unmatched_sink(&mock_server).await;

    let body = json!({
        "event": "transfer.success",
        "data": { "transfer_code": "TRF_UNKNOWN", "status": "success", "amount": 1500.0 }
    })
    .to_string();
    let signature = card_signature(&config.card_secret_key, &body);

    let result = card_settlement_webhook(
        State(Arc::new(config)),
        headers_with("x-card-signature", &signature),
        body,
    )
    .await;

    // Unmatched is still a 2xx acknowledgment; the event is parked for audit.
    assert!(result.is_ok(), "Expected ack, got {:?}", result.err());
    let response = result.unwrap().0;
    assert_eq!(response["received"], true);
    assert_eq!(response["outcome"]["outcome"], "not_found");
}

#[tokio::test]
async fn paypal_webhook_applies_success_event() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);
    let payout_id = Uuid::new_v4().to_string();

    let mut processing = MockSupabaseResponses::payout_response(
        &payout_id,
        &Uuid::new_v4().to_string(),
        "PROCESSING",
        1500.0,
    );
    processing["provider_reference"] = json!("BATCH-42");

    Mock::given(method("GET"))
        .and(path("/rest/v1/payouts"))
        .and(query_param("provider_reference", "eq.BATCH-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([processing])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payouts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::payout_response(
                &payout_id,
                &Uuid::new_v4().to_string(),
                "PAID",
                1500.0
            )
        ])))
        .mount(&mock_server)
        .await;

    let body = json!({
        "id": "WH-777",
        "event_type": "PAYMENT.PAYOUTS-ITEM.SUCCEEDED",
        "resource": {
            "payout_batch_id": "BATCH-42",
            "payout_item_id": "ITEM-1",
            "transaction_status": "SUCCESS",
            "payout_item": {
                "sender_item_id": payout_id,
                "amount": { "value": "1500.00", "currency": "KES" }
            }
        }
    })
    .to_string();
    let signature = paypal_signature(&config.paypal_webhook_secret, &body);

    let result = paypal_settlement_webhook(
        State(Arc::new(config)),
        headers_with("paypal-transmission-sig", &signature),
        body,
    )
    .await;

    assert!(result.is_ok(), "Expected ack, got {:?}", result.err());
    let response = result.unwrap().0;
    assert_eq!(response["outcome"]["outcome"], "applied");
    assert_eq!(response["outcome"]["status"], "PAID");
}

#[tokio::test]
async fn mobile_money_webhook_answers_native_ack_shape() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    // No reference matches and no candidate is close enough
    Mock::given(method("GET"))
        .and(path("/rest/v1/payouts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    mount_unmatched_sink(&mock_server).await;

    let token = config.mobile_money_webhook_secret.clone();
    let body = json!({
        "Result": {
            "ResultCode": 0,
            "ResultDesc": "The service request is processed successfully.",
            "TransactionID": "TX-1",
            "ResultParameters": {
                "ResultParameter": [
                    { "Key": "TransactionAmount", "Value": 1500.0 }
                ]
            }
        }
    })
    .to_string();

    let result = mobile_money_settlement_webhook(
        State(Arc::new(config)),
        headers_with("authorization", &format!("Bearer {}", token)),
        body,
    )
    .await;

    assert!(result.is_ok(), "Expected ack, got {:?}", result.err());
    let response = result.unwrap().0;
    assert_eq!(response["ResultCode"], 0);
    assert_eq!(response["ResultDesc"], "Accepted");
}

#[tokio::test]
async fn mobile_money_webhook_rejects_wrong_token() {
    let config = TestConfig::default().to_app_config();

    let result = mobile_money_settlement_webhook(
        State(Arc::new(config)),
        headers_with("authorization", "Bearer wrong"),
        json!({ "Result": { "ResultCode": 0 } }).to_string(),
    )
    .await;

    assert!(matches!(result, Err(AppError::Auth(_))));
}

#[tokio::test]
async fn bank_settlement_requires_admin() {
    let config = TestConfig::default().to_app_config();
    let doctor = TestUser::doctor("doctor@example.com");

    let result = confirm_bank_settlement(
        State(Arc::new(config)),
        Extension(doctor.to_user()),
        Json(BankSettlementRequest {
            provider_reference: "BANK-123".to_string(),
            outcome: BankSettlementOutcome::Settled,
            reason: None,
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Auth(_))));
}

#[tokio::test]
async fn bank_settlement_surfaces_not_found_to_the_admin() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);
    let admin = TestUser::admin("admin@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/payouts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    mount_unmatched_sink(&mock_server).await;

    let result = confirm_bank_settlement(
        State(Arc::new(config)),
        Extension(admin.to_user()),
        Json(BankSettlementRequest {
            provider_reference: "BANK-MISSING".to_string(),
            outcome: BankSettlementOutcome::Settled,
            reason: None,
        }),
    )
    .await;

    // Unlike webhooks, the internal admin surface gets a real error.
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn bank_settlement_marks_payout_failed_with_reason() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);
    let admin = TestUser::admin("admin@example.com");
    let payout_id = Uuid::new_v4().to_string();

    let mut processing = MockSupabaseResponses::payout_response(
        &payout_id,
        &Uuid::new_v4().to_string(),
        "PROCESSING",
        1500.0,
    );
    processing["provider_reference"] = json!("BANK-123");

    Mock::given(method("GET"))
        .and(path("/rest/v1/payouts"))
        .and(query_param("provider_reference", "eq.BANK-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([processing])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payouts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::payout_response(
                &payout_id,
                &Uuid::new_v4().to_string(),
                "FAILED",
                1500.0
            )
        ])))
        .mount(&mock_server)
        .await;

    let result = confirm_bank_settlement(
        State(Arc::new(config.clone())),
        Extension(admin.to_user()),
        Json(BankSettlementRequest {
            provider_reference: "BANK-123".to_string(),
            outcome: BankSettlementOutcome::Failed,
            reason: Some("returned by beneficiary bank".to_string()),
        }),
    )
    .await;

    assert!(result.is_ok(), "Expected outcome, got {:?}", result.err());
    let response = result.unwrap().0;
    assert_eq!(response["outcome"], "applied");
    assert_eq!(response["status"], "FAILED");

    // The audit note names the admin and the stated reason
    let patch = mock_server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|req| req.method.as_str() == "PATCH")
        .expect("a PATCH was issued");
    let body: Value = serde_json::from_slice(&patch.body).unwrap();
    let notes = body["notes"].as_str().unwrap();
    assert!(notes.contains(&admin.id));
    assert!(notes.contains("returned by beneficiary bank"));
}
