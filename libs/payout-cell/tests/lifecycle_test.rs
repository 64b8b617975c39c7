// Lifecycle controller: state machine enforcement, dispatch, bulk fan-out.

use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use payout_cell::models::{BulkAction, PayoutError, PayoutStatus};
use payout_cell::services::lifecycle::PayoutLifecycleService;
use shared_config::AppConfig;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn config_for(server: &MockServer) -> AppConfig {
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = server.uri();
    config.mobile_money_api_base = server.uri();
    config
}

async fn mount_payout(server: &MockServer, payout_id: &str, doctor_id: &str, status: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/payouts"))
        .and(query_param("id", format!("eq.{}", payout_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::payout_response(payout_id, doctor_id, status, 1500.0)
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn approve_moves_ready_payout_to_approved() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    let payout_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4().to_string();
    mount_payout(&mock_server, &payout_id.to_string(), &doctor_id, "READY").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payouts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::payout_response(
                &payout_id.to_string(),
                &doctor_id,
                "APPROVED",
                1500.0
            )
        ])))
        .mount(&mock_server)
        .await;

    let lifecycle = PayoutLifecycleService::new(&config);
    let payout = lifecycle.approve(payout_id, "admin-1", None).await.unwrap();

    assert_eq!(payout.status, PayoutStatus::Approved);

    // The conditional update must carry the approver and filter on READY
    let patch = mock_server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|req| req.method.as_str() == "PATCH")
        .expect("a PATCH was issued");
    assert!(patch.url.query().unwrap().contains("status=in.%28READY%29")
        || patch.url.query().unwrap().contains("status=in.(READY)"));
    let body: Value = serde_json::from_slice(&patch.body).unwrap();
    assert_eq!(body["approved_by"], "admin-1");
    assert_eq!(body["status"], "APPROVED");
}

#[tokio::test]
async fn trigger_on_paid_payout_is_a_conflict_and_changes_nothing() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    let payout_id = Uuid::new_v4();
    mount_payout(
        &mock_server,
        &payout_id.to_string(),
        &Uuid::new_v4().to_string(),
        "PAID",
    )
    .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payouts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let lifecycle = PayoutLifecycleService::new(&config);
    let result = lifecycle.trigger(payout_id, None).await;

    match result {
        Err(PayoutError::Conflict { current, action }) => {
            assert_eq!(current, PayoutStatus::Paid);
            assert_eq!(action, "trigger");
        }
        other => panic!("Expected Conflict, got {:?}", other.map(|p| p.status)),
    }
    mock_server.verify().await;
}

#[tokio::test]
async fn trigger_dispatches_then_marks_processing_with_reference() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    let payout_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4().to_string();
    mount_payout(&mock_server, &payout_id.to_string(), &doctor_id, "APPROVED").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_payment_profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::payment_profile_response(&doctor_id, "mobile_money")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/b2c/v1/paymentrequest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ConversationID": "AG_20250701_000001",
            "OriginatorConversationID": payout_id,
            "ResponseCode": "0",
            "ResponseDescription": "Accept the service request successfully."
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payouts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::payout_response(
                &payout_id.to_string(),
                &doctor_id,
                "PROCESSING",
                1500.0
            )
        ])))
        .mount(&mock_server)
        .await;

    let lifecycle = PayoutLifecycleService::new(&config);
    let payout = lifecycle.trigger(payout_id, None).await.unwrap();

    assert_eq!(payout.status, PayoutStatus::Processing);

    let patch = mock_server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|req| req.method.as_str() == "PATCH")
        .expect("a PATCH was issued");
    let body: Value = serde_json::from_slice(&patch.body).unwrap();
    assert_eq!(body["status"], "PROCESSING");
    assert_eq!(body["provider_reference"], "AG_20250701_000001");
}

#[tokio::test]
async fn failed_dispatch_surfaces_error_and_leaves_payout_untouched() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    let payout_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4().to_string();
    mount_payout(&mock_server, &payout_id.to_string(), &doctor_id, "APPROVED").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_payment_profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::payment_profile_response(&doctor_id, "mobile_money")
        ])))
        .mount(&mock_server)
        .await;

    // Provider is down
    Mock::given(method("POST"))
        .and(path("/b2c/v1/paymentrequest"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    // No state write may happen; the payout stays APPROVED and retryable
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payouts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let lifecycle = PayoutLifecycleService::new(&config);
    let result = lifecycle.trigger(payout_id, None).await;

    assert!(matches!(result, Err(PayoutError::Dispatch(_))));
    mock_server.verify().await;
}

#[tokio::test]
async fn bulk_approve_isolates_failures_per_id() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    let p1 = Uuid::new_v4();
    let p2 = Uuid::new_v4();
    let p3 = Uuid::new_v4();
    let doctor_id = Uuid::new_v4().to_string();

    mount_payout(&mock_server, &p1.to_string(), &doctor_id, "READY").await;
    mount_payout(&mock_server, &p2.to_string(), &doctor_id, "PAID").await;
    mount_payout(&mock_server, &p3.to_string(), &doctor_id, "READY").await;

    for id in [p1, p3] {
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/payouts"))
            .and(query_param("id", format!("eq.{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockSupabaseResponses::payout_response(
                    &id.to_string(),
                    &doctor_id,
                    "APPROVED",
                    1500.0
                )
            ])))
            .mount(&mock_server)
            .await;
    }

    let lifecycle = PayoutLifecycleService::new(&config);
    let results = lifecycle
        .bulk(BulkAction::Approve, &[p1, p2, p3], "admin-1", None)
        .await;

    assert_eq!(results.len(), 3);

    let r1 = results.iter().find(|r| r.payout_id == p1).unwrap();
    assert!(r1.success);
    assert_eq!(r1.status, Some(PayoutStatus::Approved));

    let r2 = results.iter().find(|r| r.payout_id == p2).unwrap();
    assert!(!r2.success);
    assert_eq!(r2.error_code.as_deref(), Some("conflict"));
    assert!(r2.message.as_deref().unwrap().contains("PAID"));

    let r3 = results.iter().find(|r| r.payout_id == p3).unwrap();
    assert!(r3.success);
}

#[tokio::test]
async fn manual_override_to_paid_stamps_processed_at() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    let payout_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4().to_string();
    mount_payout(&mock_server, &payout_id.to_string(), &doctor_id, "PROCESSING").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payouts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::payout_response(
                &payout_id.to_string(),
                &doctor_id,
                "PAID",
                1500.0
            )
        ])))
        .mount(&mock_server)
        .await;

    let lifecycle = PayoutLifecycleService::new(&config);
    let payout = lifecycle
        .manual_override(
            payout_id,
            PayoutStatus::Paid,
            "provider portal shows settled",
            "admin-1",
            None,
        )
        .await
        .unwrap();

    assert_eq!(payout.status, PayoutStatus::Paid);

    let patch = mock_server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|req| req.method.as_str() == "PATCH")
        .expect("a PATCH was issued");
    let body: Value = serde_json::from_slice(&patch.body).unwrap();
    assert!(body.get("processed_at").is_some());
    assert!(body["notes"]
        .as_str()
        .unwrap()
        .contains("Manual override PROCESSING -> PAID by admin admin-1"));
}

#[tokio::test]
async fn manual_override_requires_a_reason() {
    let mock_server = MockServer::start().await;
    let config = config_for(&mock_server);

    let lifecycle = PayoutLifecycleService::new(&config);
    let result = lifecycle
        .manual_override(Uuid::new_v4(), PayoutStatus::Failed, "  ", "admin-1", None)
        .await;

    assert!(matches!(result, Err(PayoutError::Validation(_))));
}
