//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::state::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::{
    CheckoutConfig, InMemoryPaymentGateway, InMemoryRecoveryStore, PaymentGateway, PollerConfig,
};
use domain::{LineItem, Money, NewOrder, PaymentMode};
use ledger::InMemoryOrderLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn fast_config() -> CheckoutConfig {
    CheckoutConfig {
        poller: PollerConfig {
            interval: Duration::from_millis(10),
            max_attempts: 1000,
            timeout: Duration::from_secs(30),
        },
        ..CheckoutConfig::default()
    }
}

fn setup() -> axum::Router {
    api::create_app(api::create_default_state(fast_config()), get_metrics_handle())
}

fn setup_with_gateway(gateway: Arc<dyn PaymentGateway>) -> axum::Router {
    let collaborators = api::local_collaborators(
        Arc::new(InMemoryOrderLedger::new()),
        gateway,
        Arc::new(InMemoryRecoveryStore::new()),
    );
    let state = Arc::new(AppState::new(collaborators, fast_config()));
    api::create_app(state, get_metrics_handle())
}

fn order_json(customer: &str, mode: PaymentMode, total: Option<Money>) -> serde_json::Value {
    let mut builder = NewOrder::builder(customer, "Asha")
        .item(LineItem::new("latte", "Caffe Latte", 2, Money::from_minor(9000)))
        .payment_mode(mode);
    if let Some(total) = total {
        builder = builder.total(total);
    }
    serde_json::to_value(builder.build()).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn checkout(app: &axum::Router, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/checkout", body))
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["sessions"], 0);
    assert_eq!(json["payments_in_flight"], 0);
}

#[tokio::test]
async fn test_upi_checkout_confirms_order() {
    let app = setup();

    let (status, result) = checkout(
        &app,
        serde_json::json!({
            "order": order_json("uid-1", PaymentMode::Upi, None),
            "payment": { "mode": "upi" }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["outcome"], "confirmed");
    assert_eq!(result["amount"], 18000);
    let order_id = result["order_id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(get_request(&format!("/orders/{order_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let order = body_json(response).await;
    assert_eq!(order["status"], "Confirmed");
    assert_eq!(order["payment_status"], "Success");
    assert_eq!(order["payment_mode"], "upi");

    let response = app
        .oneshot(get_request(&format!("/orders/{order_id}/attempts")))
        .await
        .unwrap();
    let attempts = body_json(response).await;
    assert_eq!(attempts.as_array().unwrap().len(), 1);
    assert_eq!(attempts[0]["status"], "SUCCESS");
}

#[tokio::test]
async fn test_zero_amount_is_rejected() {
    let app = setup();

    let (status, body) = checkout(
        &app,
        serde_json::json!({
            "order": order_json("uid-2", PaymentMode::Upi, Some(Money::zero())),
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Validation"));
}

#[tokio::test]
async fn test_card_checkout_requires_details() {
    let app = setup();

    let (status, _) = checkout(
        &app,
        serde_json::json!({ "order": order_json("uid-3", PaymentMode::Card, None) }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_events_record_result() {
    let app = setup();

    let (_, result) = checkout(
        &app,
        serde_json::json!({
            "order": order_json("uid-4", PaymentMode::Cash, None),
            "payment": { "mode": "cash" }
        }),
    )
    .await;
    assert_eq!(result["outcome"], "confirmed");
    assert!(result["payment_id"].as_str().unwrap().starts_with("CASH-"));

    let response = app
        .oneshot(get_request("/checkout/uid-4/events"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = body_json(response).await;
    assert!(session["active_attempt"].is_null());
    let events = session["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "result");
    assert_eq!(events[0]["result"]["outcome"], "confirmed");
}

#[tokio::test]
async fn test_events_for_unknown_customer_is_404() {
    let app = setup();
    let response = app
        .oneshot(get_request("/checkout/nobody/events"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_leave_during_payment_needs_confirmation() {
    // Never settles on its own
    let app = setup_with_gateway(Arc::new(InMemoryPaymentGateway::new()));

    let pending = tokio::spawn({
        let app = app.clone();
        async move {
            checkout(
                &app,
                serde_json::json!({
                    "order": order_json("uid-5", PaymentMode::Upi, None),
                    "payment": { "mode": "upi" }
                }),
            )
            .await
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = app.clone().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(body_json(response).await["payments_in_flight"], 1);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/checkout/uid-5/leave",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    let leave = body_json(response).await;
    assert_eq!(leave["decision"]["decision"], "confirmation_required");
    assert!(leave["abandoned"].is_null());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/checkout/uid-5/leave",
            serde_json::json!({ "confirm": true }),
        ))
        .await
        .unwrap();
    let leave = body_json(response).await;
    assert_eq!(leave["decision"]["decision"], "allowed");
    let order_id = leave["abandoned"]["order_id"].as_str().unwrap().to_string();

    let (status, result) = pending.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["outcome"], "abandoned");

    let response = app
        .oneshot(get_request(&format!("/orders/{order_id}")))
        .await
        .unwrap();
    let order = body_json(response).await;
    assert_eq!(order["payment_status"], "Processing");
}

#[tokio::test]
async fn test_leave_without_checkout_is_allowed() {
    let app = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/checkout/uid-6/leave",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    let leave = body_json(response).await;
    assert_eq!(leave["decision"]["decision"], "allowed");
}

#[tokio::test]
async fn test_close_session() {
    let app = setup();
    checkout(
        &app,
        serde_json::json!({ "order": order_json("uid-7", PaymentMode::Cash, None) }),
    )
    .await;

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri("/checkout/uid-7")
            .body(Body::empty())
            .unwrap()
    };
    let response = app.clone().oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app.oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payment_status_report() {
    let app = setup();
    let (_, result) = checkout(
        &app,
        serde_json::json!({
            "order": order_json("uid-8", PaymentMode::Upi, None),
            "payment": { "mode": "upi", "vpa": "asha@upi" }
        }),
    )
    .await;
    let order_id = result["order_id"].as_str().unwrap();

    let response = app
        .oneshot(get_request(&format!("/orders/{order_id}/payment-status")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["payment_status"], "Success");
    assert_eq!(report["gateway_status"], "SUCCESS");
}

#[tokio::test]
async fn test_fulfillment_moves_forward_only() {
    let app = setup();
    let (_, result) = checkout(
        &app,
        serde_json::json!({ "order": order_json("uid-9", PaymentMode::Cash, None) }),
    )
    .await;
    let uri = format!("/orders/{}/status", result["order_id"].as_str().unwrap());

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &uri,
            serde_json::json!({ "status": "preparing", "staff_notes": "extra hot" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let order = body_json(response).await;
    assert_eq!(order["status"], "Preparing");
    assert_eq!(order["staff_notes"], "extra hot");
    assert_eq!(order["payment_status"], "Success");

    let response = app
        .clone()
        .oneshot(json_request("PATCH", &uri, serde_json::json!({ "status": "confirmed" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(json_request("PATCH", &uri, serde_json::json!({ "status": "brewing" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_order_errors() {
    let app = setup();

    let response = app
        .clone()
        .oneshot(get_request("/orders/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(get_request(&format!("/orders/{}", common::OrderId::new())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    checkout(
        &app,
        serde_json::json!({ "order": order_json("uid-10", PaymentMode::Cash, None) }),
    )
    .await;

    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("checkout_started_total"));
    assert!(text.contains("checkout_sessions_open"));
}
