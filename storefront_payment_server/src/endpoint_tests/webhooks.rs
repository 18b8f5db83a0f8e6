use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use serde_json::{json, Value};
use spg_common::Secret;
use storefront_payment_engine::{
    db_types::{OrderStatusType, PaymentMethod, PaymentStatus},
    events::NotificationKind,
    test_utils::mock_gateway::MockGateway,
    SqliteDatabase,
};

use super::helpers::{fetch_order, new_test_db, seed_awaiting_order, sign, TestApp, SIGNATURE_HEADER, WEBHOOK_SECRET};
use crate::{middleware::HmacMiddlewareFactory, routes::GatewayWebhookRoute};

fn configure(cfg: &mut ServiceConfig) {
    configure_webhooks(cfg, true);
}

fn configure_webhooks(cfg: &mut ServiceConfig, hmac_checks: bool) {
    cfg.service(
        web::scope("/webhooks")
            .wrap(HmacMiddlewareFactory::new(SIGNATURE_HEADER, Secret::new(WEBHOOK_SECRET.to_string()), hmac_checks))
            .service(GatewayWebhookRoute::<SqliteDatabase>::new()),
    );
}

pub fn webhook_body(order_number: &str, external_id: &str, status: &str) -> String {
    json!({
        "event": "transaction.updated",
        "data": {
            "id": external_id,
            "status": status,
            "amount": 5000,
            "payment_method": "PIX",
            "order_id": order_number,
            "created_at": "2024-06-01T12:00:00Z"
        }
    })
    .to_string()
}

pub fn signed_webhook(body: String) -> TestRequest {
    TestRequest::post()
        .uri("/webhooks/transactions")
        .insert_header(("Content-Type", "application/json"))
        .insert_header((SIGNATURE_HEADER, sign(&body)))
        .set_payload(body)
}

#[actix_web::test]
async fn signed_webhook_approves_order() {
    let db = new_test_db().await;
    let order = seed_awaiting_order(&db, PaymentMethod::Pix, "tx_100").await;
    let app = TestApp::with_db(db, MockGateway::new());
    let body = webhook_body(order.order_number.as_str(), "tx_100", "approved");
    let (status, body) = app.call(signed_webhook(body), configure).await;
    assert_eq!(status, StatusCode::OK);
    let ack: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(ack["applied"], true);
    assert_eq!(ack["status"], "processing");
    assert_eq!(ack["paymentStatus"], "approved");
    let (db, recorder) = app.finish().await;
    let order = fetch_order(&db, &order.order_number).await;
    assert_eq!(order.status, OrderStatusType::Processing);
    assert_eq!(order.payment_status, PaymentStatus::Approved);
    assert_eq!(recorder.kinds(), vec![NotificationKind::PaymentApproved]);
    assert_eq!(recorder.cleared_carts()[0].user_id, "user-7");
}

#[actix_web::test]
async fn duplicate_delivery_is_acknowledged_but_not_applied() {
    let db = new_test_db().await;
    let order = seed_awaiting_order(&db, PaymentMethod::Pix, "tx_101").await;
    let app = TestApp::with_db(db, MockGateway::new());
    let body = webhook_body(order.order_number.as_str(), "tx_101", "approved");
    let (status, _) = app.call(signed_webhook(body.clone()), configure).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.call(signed_webhook(body), configure).await;
    assert_eq!(status, StatusCode::OK);
    let ack: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(ack["applied"], false);
    assert_eq!(ack["paymentStatus"], "approved");
    let (_db, recorder) = app.finish().await;
    assert_eq!(recorder.kinds(), vec![NotificationKind::PaymentApproved]);
    assert_eq!(recorder.cleared_carts().len(), 1);
}

#[actix_web::test]
async fn tampered_body_is_rejected() {
    let db = new_test_db().await;
    let order = seed_awaiting_order(&db, PaymentMethod::Pix, "tx_102").await;
    let app = TestApp::with_db(db, MockGateway::new());
    let signed_body = webhook_body(order.order_number.as_str(), "tx_102", "declined");
    let tampered = webhook_body(order.order_number.as_str(), "tx_102", "approved");
    let req = TestRequest::post()
        .uri("/webhooks/transactions")
        .insert_header(("Content-Type", "application/json"))
        .insert_header((SIGNATURE_HEADER, sign(&signed_body)))
        .set_payload(tampered);
    let (status, _) = app.call(req, configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (db, recorder) = app.finish().await;
    let order = fetch_order(&db, &order.order_number).await;
    assert_eq!(order.status, OrderStatusType::AwaitingPayment);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(recorder.notifications().is_empty());
}

#[actix_web::test]
async fn missing_signature_is_rejected() {
    let db = new_test_db().await;
    let order = seed_awaiting_order(&db, PaymentMethod::Boleto, "tx_103").await;
    let app = TestApp::with_db(db, MockGateway::new());
    let req = TestRequest::post()
        .uri("/webhooks/transactions")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(webhook_body(order.order_number.as_str(), "tx_103", "approved"));
    let (status, _) = app.call(req, configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (db, _) = app.finish().await;
    assert_eq!(fetch_order(&db, &order.order_number).await.status, OrderStatusType::AwaitingPayment);
}

#[actix_web::test]
async fn unsigned_webhooks_pass_when_checks_are_disabled() {
    let db = new_test_db().await;
    let order = seed_awaiting_order(&db, PaymentMethod::Pix, "tx_104").await;
    let app = TestApp::with_db(db, MockGateway::new());
    let req = TestRequest::post()
        .uri("/webhooks/transactions")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(webhook_body(order.order_number.as_str(), "tx_104", "declined"));
    let (status, _) = app.call(req, |cfg| configure_webhooks(cfg, false)).await;
    assert_eq!(status, StatusCode::OK);
    let (db, recorder) = app.finish().await;
    let order = fetch_order(&db, &order.order_number).await;
    assert_eq!(order.status, OrderStatusType::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Declined);
    assert_eq!(recorder.kinds(), vec![NotificationKind::PaymentDeclined]);
}

#[actix_web::test]
async fn webhook_for_unknown_order() {
    let app = TestApp::new(MockGateway::new()).await;
    let body = webhook_body("ORD-DOES-NOT-EXIST", "tx_999", "approved");
    let (status, body) = app.call(signed_webhook(body), configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("ORD-DOES-NOT-EXIST"), "{body}");
    let (_db, recorder) = app.finish().await;
    assert!(recorder.notifications().is_empty());
}

#[actix_web::test]
async fn malformed_webhook_body() {
    let app = TestApp::new(MockGateway::new()).await;
    let body = json!({ "event": "transaction.updated", "data": { "status": "approved" } }).to_string();
    let (status, _) = app.call(signed_webhook(body), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    app.finish().await;
}

#[actix_web::test]
async fn webhook_for_another_orders_transaction_conflicts() {
    let db = new_test_db().await;
    let owner = seed_awaiting_order(&db, PaymentMethod::Pix, "tx_105").await;
    let other = seed_awaiting_order(&db, PaymentMethod::Pix, "tx_106").await;
    let app = TestApp::with_db(db, MockGateway::new());
    let body = webhook_body(other.order_number.as_str(), "tx_105", "declined");
    let (status, _) = app.call(signed_webhook(body), configure).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (db, recorder) = app.finish().await;
    for order in [owner, other] {
        let order = fetch_order(&db, &order.order_number).await;
        assert_eq!(order.status, OrderStatusType::AwaitingPayment);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
    }
    assert!(recorder.notifications().is_empty());
}
