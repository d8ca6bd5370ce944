//! End-to-end payment lifecycle coverage: initiation, verification,
//! webhook reconciliation, and the transition rules that bind them.

mod common;

use common::{
    chapa_initialize_success, chapa_verify_body, TestApp, TEST_USER_EMAIL, TEST_USER_ID,
    TEST_USER_NAME,
};
use serde_json::json;
use staybook::models::PaymentStatus;
use uuid::Uuid;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHECKOUT_URL: &str = "https://checkout.chapa.co/checkout/payment/test-session";

async fn mount_initialize_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chapa_initialize_success(CHECKOUT_URL)))
        .mount(server)
        .await;
}

async fn mount_verify(server: &MockServer, reference: &str, provider_status: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/transaction/verify/{}", reference)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chapa_verify_body(provider_status, "tx123", "chapa-ref-1")),
        )
        .mount(server)
        .await;
}

/// Initiate a payment for a fresh listing+booking; returns (booking id,
/// payment reference).
async fn initiate(app: &TestApp) -> (Uuid, String) {
    let listing_id = app.create_listing("250.00").await;
    let booking_id = app.create_booking(listing_id).await;
    mount_initialize_success(&app.chapa).await;

    let response = reqwest::Client::new()
        .post(format!("{}/payments/initiate", app.address))
        .header("X-User-Id", TEST_USER_ID)
        .header("X-User-Email", TEST_USER_EMAIL)
        .header("X-User-Name", TEST_USER_NAME)
        .json(&json!({
            "booking_id": booking_id,
            "return_url": "https://app.staybook.test/payment/return"
        }))
        .send()
        .await
        .expect("Failed to initiate payment");
    assert_eq!(response.status().as_u16(), 201);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["checkout_url"], CHECKOUT_URL);
    let reference = body["payment_reference"].as_str().unwrap().to_string();
    (booking_id, reference)
}

async fn verify(app: &TestApp, tx_ref: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/payments/verify", app.address))
        .header("X-User-Id", TEST_USER_ID)
        .json(&json!({ "tx_ref": tx_ref }))
        .send()
        .await
        .expect("Failed to execute verify request")
}

#[tokio::test]
async fn initiate_leaves_payment_and_booking_pending() {
    let app = TestApp::spawn().await;

    // Two nights at 250.00 -> total 500.00.
    let (booking_id, reference) = initiate(&app).await;

    let payment = app
        .repository
        .get_payment_by_reference(&reference)
        .await
        .unwrap()
        .expect("payment record missing");
    assert_eq!(payment.amount.to_string(), "500.00");
    assert_eq!(payment.currency, "ETB");
    assert_eq!(payment.checkout_url.as_deref(), Some(CHECKOUT_URL));
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert!(payment.provider_data.is_some());

    assert_eq!(app.booking_status(booking_id).await, "PENDING");

    app.cleanup().await;
}

#[tokio::test]
async fn initiate_is_idempotent_per_booking() {
    let app = TestApp::spawn().await;
    let (booking_id, first_reference) = initiate(&app).await;

    let response = reqwest::Client::new()
        .post(format!("{}/payments/initiate", app.address))
        .header("X-User-Id", TEST_USER_ID)
        .json(&json!({
            "booking_id": booking_id,
            "return_url": "https://app.staybook.test/payment/return"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["payment_reference"], first_reference.as_str());

    let payments = app.repository.list_payments().await.unwrap();
    assert_eq!(payments.len(), 1);

    app.cleanup().await;
}

#[tokio::test]
async fn verify_success_completes_payment_and_confirms_booking() {
    let app = TestApp::spawn().await;
    let (booking_id, reference) = initiate(&app).await;
    mount_verify(&app.chapa, &reference, "success").await;

    let response = verify(&app, &reference).await;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["payment_status"], "COMPLETED");
    assert_eq!(body["booking_status"], "CONFIRMED");

    let payment = app
        .repository
        .get_payment_by_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.transaction_id.as_deref(), Some("tx123"));
    assert_eq!(payment.provider_reference.as_deref(), Some("chapa-ref-1"));
    assert_eq!(app.booking_status(booking_id).await, "CONFIRMED");

    app.cleanup().await;
}

#[tokio::test]
async fn completed_payment_is_never_downgraded() {
    let app = TestApp::spawn().await;
    let (booking_id, reference) = initiate(&app).await;

    mount_verify(&app.chapa, &reference, "success").await;
    let response = verify(&app, &reference).await;
    assert_eq!(response.status().as_u16(), 200);

    // The provider now claims the transaction failed; the local record
    // must hold its ground.
    app.chapa.reset().await;
    mount_verify(&app.chapa, &reference, "failed").await;

    let response = verify(&app, &reference).await;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["payment_status"], "COMPLETED");
    assert_eq!(body["booking_status"], "CONFIRMED");
    assert_eq!(app.booking_status(booking_id).await, "CONFIRMED");

    app.cleanup().await;
}

#[tokio::test]
async fn verify_is_idempotent_for_unchanged_provider_answer() {
    let app = TestApp::spawn().await;
    let (_booking_id, reference) = initiate(&app).await;
    mount_verify(&app.chapa, &reference, "success").await;

    let first: serde_json::Value = verify(&app, &reference).await.json().await.unwrap();
    let second: serde_json::Value = verify(&app, &reference).await.json().await.unwrap();

    assert_eq!(first["payment_status"], second["payment_status"]);
    assert_eq!(first["booking_status"], second["booking_status"]);

    app.cleanup().await;
}

#[tokio::test]
async fn failed_payment_recovers_on_delayed_provider_success() {
    let app = TestApp::spawn().await;
    let (booking_id, reference) = initiate(&app).await;

    mount_verify(&app.chapa, &reference, "failed").await;
    let body: serde_json::Value = verify(&app, &reference).await.json().await.unwrap();
    assert_eq!(body["payment_status"], "FAILED");
    assert_eq!(body["booking_status"], "PENDING");

    // Delayed success, e.g. a webhook landing after a failed poll.
    app.chapa.reset().await;
    mount_verify(&app.chapa, &reference, "success").await;

    let body: serde_json::Value = verify(&app, &reference).await.json().await.unwrap();
    assert_eq!(body["payment_status"], "COMPLETED");
    assert_eq!(app.booking_status(booking_id).await, "CONFIRMED");

    app.cleanup().await;
}

#[tokio::test]
async fn pending_provider_answer_leaves_payment_pending() {
    let app = TestApp::spawn().await;
    let (booking_id, reference) = initiate(&app).await;
    mount_verify(&app.chapa, &reference, "pending").await;

    let body: serde_json::Value = verify(&app, &reference).await.json().await.unwrap();
    assert_eq!(body["payment_status"], "PENDING");
    assert_eq!(body["booking_status"], "PENDING");
    assert_eq!(app.booking_status(booking_id).await, "PENDING");

    app.cleanup().await;
}

#[tokio::test]
async fn verify_unknown_reference_returns_not_found() {
    let app = TestApp::spawn().await;

    let response = verify(&app, &Uuid::new_v4().to_string()).await;
    assert_eq!(response.status().as_u16(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn webhook_delegates_to_verification() {
    let app = TestApp::spawn().await;
    let (booking_id, reference) = initiate(&app).await;
    mount_verify(&app.chapa, &reference, "success").await;

    let response = reqwest::Client::new()
        .post(format!("{}/payments/webhook", app.address))
        .json(&json!({
            "event": "charge.success",
            "tx_ref": reference,
            "status": "success"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Webhook processed successfully");
    assert_eq!(app.booking_status(booking_id).await, "CONFIRMED");

    app.cleanup().await;
}

#[tokio::test]
async fn webhook_missing_tx_ref_is_rejected_without_provider_calls() {
    let app = TestApp::spawn().await;

    // Any verify call would violate this expectation when the mock
    // server shuts down.
    Mock::given(method("GET"))
        .and(path_regex(r"^/transaction/verify/.*"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.chapa)
        .await;

    let response = reqwest::Client::new()
        .post(format!("{}/payments/webhook", app.address))
        .json(&json!({ "event": "charge.success" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn webhook_unknown_reference_is_a_client_error() {
    let app = TestApp::spawn().await;

    let response = reqwest::Client::new()
        .post(format!("{}/payments/webhook", app.address))
        .json(&json!({
            "event": "charge.success",
            "tx_ref": Uuid::new_v4().to_string(),
            "status": "success"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn webhook_rejects_malformed_json() {
    let app = TestApp::spawn().await;

    let response = reqwest::Client::new()
        .post(format!("{}/payments/webhook", app.address))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn initiate_rejected_for_confirmed_booking() {
    let app = TestApp::spawn().await;
    let listing_id = app.create_listing("250.00").await;
    let booking_id = app.create_booking(listing_id).await;
    app.repository.confirm_booking(booking_id).await.unwrap();

    let response = reqwest::Client::new()
        .post(format!("{}/payments/initiate", app.address))
        .header("X-User-Id", TEST_USER_ID)
        .json(&json!({
            "booking_id": booking_id,
            "return_url": "https://app.staybook.test/payment/return"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // No payment row materialized for the rejected attempt.
    assert!(app.repository.list_payments().await.unwrap().is_empty());

    app.cleanup().await;
}

#[tokio::test]
async fn initiate_rejected_for_foreign_booking() {
    let app = TestApp::spawn().await;
    let listing_id = app.create_listing("250.00").await;
    let booking_id = app.create_booking(listing_id).await;

    let response = reqwest::Client::new()
        .post(format!("{}/payments/initiate", app.address))
        .header("X-User-Id", "somebody-else")
        .json(&json!({
            "booking_id": booking_id,
            "return_url": "https://app.staybook.test/payment/return"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    app.cleanup().await;
}

#[tokio::test]
async fn privileged_actor_may_initiate_for_any_booking() {
    let app = TestApp::spawn().await;
    let listing_id = app.create_listing("250.00").await;
    let booking_id = app.create_booking(listing_id).await;
    mount_initialize_success(&app.chapa).await;

    let response = reqwest::Client::new()
        .post(format!("{}/payments/initiate", app.address))
        .header("X-User-Id", "staff-1")
        .header("X-User-Role", "admin")
        .json(&json!({
            "booking_id": booking_id,
            "return_url": "https://app.staybook.test/payment/return"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    app.cleanup().await;
}

#[tokio::test]
async fn gateway_failure_marks_payment_failed_but_not_booking() {
    let app = TestApp::spawn().await;
    let listing_id = app.create_listing("250.00").await;
    let booking_id = app.create_booking(listing_id).await;

    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "message": "Invalid currency", "status": "failed" })),
        )
        .mount(&app.chapa)
        .await;

    let response = reqwest::Client::new()
        .post(format!("{}/payments/initiate", app.address))
        .header("X-User-Id", TEST_USER_ID)
        .json(&json!({
            "booking_id": booking_id,
            "return_url": "https://app.staybook.test/payment/return"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let payments = app.repository.list_payments().await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Failed);
    assert!(payments[0].provider_data.is_some());

    // A failed initiation must not corrupt booking state.
    assert_eq!(app.booking_status(booking_id).await, "PENDING");

    app.cleanup().await;
}

#[tokio::test]
async fn verify_network_failure_leaves_status_untouched() {
    let app = TestApp::spawn_with_dead_gateway().await;
    let listing_id = app.create_listing("250.00").await;
    let booking_id = app.create_booking(listing_id).await;

    // Seed the payment record directly; the dead gateway blocks initiation.
    let booking = app.repository.get_booking(booking_id).await.unwrap().unwrap();
    let payment = app
        .repository
        .get_or_create_payment(&booking, "ETB")
        .await
        .unwrap();
    let reference = payment.payment_reference.to_string();

    let response = verify(&app, &reference).await;
    assert_eq!(response.status().as_u16(), 400);

    let payment = app
        .repository
        .get_payment_by_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(app.booking_status(booking_id).await, "PENDING");

    app.cleanup().await;
}
