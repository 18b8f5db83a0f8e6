use actix_web::{
    http::{Method, StatusCode},
    test::TestRequest,
    web,
    web::ServiceConfig,
};
use gateway_client::{GatewayError, GatewayStatus, GatewayTransaction, PixInstructions};
use serde_json::{json, Value};
use spg_common::Secret;
use storefront_payment_engine::{
    db_types::{Cents, OrderNumber, OrderStatusType, OrderTransition, PaymentStatus},
    events::NotificationKind,
    test_utils::mock_gateway::MockGateway,
    OrderManagement,
    SqliteDatabase,
};

use super::{
    helpers::{admin_request, configure_admin, fetch_order, TestApp, SIGNATURE_HEADER, WEBHOOK_SECRET},
    webhooks::{signed_webhook, webhook_body},
};
use crate::{
    middleware::HmacMiddlewareFactory,
    routes::{health, CheckoutRoute, GatewayWebhookRoute, OrderDetailsRoute},
};

fn configure(cfg: &mut ServiceConfig) {
    cfg.service(health)
        .service(
            web::scope("/api")
                .service(CheckoutRoute::<SqliteDatabase, MockGateway>::new())
                .service(OrderDetailsRoute::<SqliteDatabase>::new()),
        )
        .service(
            web::scope("/webhooks")
                .wrap(HmacMiddlewareFactory::new(SIGNATURE_HEADER, Secret::new(WEBHOOK_SECRET.to_string()), true))
                .service(GatewayWebhookRoute::<SqliteDatabase>::new()),
        )
        .configure(configure_admin);
}

fn address_json() -> Value {
    json!({
        "recipient": "Maria Silva",
        "street": "Rua das Flores",
        "number": "42",
        "neighborhood": "Centro",
        "city": "São Paulo",
        "state": "SP",
        "zipCode": "01001-000"
    })
}

fn checkout_request(body: Value) -> TestRequest {
    TestRequest::post().uri("/api/checkout").insert_header(("Content-Type", "application/json")).set_payload(body.to_string())
}

fn pix_checkout() -> Value {
    json!({
        "items": [{ "productId": "sku-1", "quantity": 2 }],
        "shippingAddress": address_json(),
        "paymentMethod": "PIX",
        "userId": "user-1",
        "customer": { "name": "Maria Silva", "email": "maria@example.com" }
    })
}

fn card_checkout() -> Value {
    json!({
        "items": [{ "productId": "sku-2", "quantity": 1 }],
        "shippingAddress": address_json(),
        "paymentMethod": "CREDIT_CARD",
        "cardData": { "number": "4111 1111 1111 1111", "holder": "MARIA SILVA", "expiry": "12/99", "cvv": "123" },
        "installments": 2,
        "userId": "user-2"
    })
}

fn pix_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway.expect_create_transaction().times(1).returning(|req| {
        let pix = PixInstructions {
            qr_code: Some("qr-data".into()),
            qr_code_url: None,
            copy_paste: Some("00020126...".into()),
        };
        Ok(GatewayTransaction::new("tx_pix", GatewayStatus::Pending).with_amount(req.amount).with_pix(pix))
    });
    gateway
}

#[actix_web::test]
async fn health_check() {
    let app = TestApp::new(MockGateway::new()).await;
    let (status, body) = app.call(TestRequest::get().uri("/health"), configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
    app.finish().await;
}

#[actix_web::test]
async fn pix_checkout_then_webhook_approval() {
    let _ = env_logger::try_init();
    let app = TestApp::new(pix_gateway()).await;
    let (status, body) = app.call(checkout_request(pix_checkout()), configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(result["outcome"], "awaiting_payment");
    assert_eq!(result["order"]["status"], "awaiting_payment");
    assert_eq!(result["order"]["paymentStatus"], "pending");
    assert_eq!(result["order"]["totalAmount"], 5000);
    assert_eq!(result["instructions"]["pix"]["copyPaste"], "00020126...");
    let order_number = OrderNumber::from(result["order"]["orderNumber"].as_str().unwrap());

    let webhook = webhook_body(order_number.as_str(), "tx_pix", "approved");
    let (status, body) = app.call(signed_webhook(webhook), configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (db, recorder) = app.finish().await;
    let order = fetch_order(&db, &order_number).await;
    assert_eq!(order.status, OrderStatusType::Processing);
    assert_eq!(order.payment_status, PaymentStatus::Approved);
    assert_eq!(recorder.kinds(), vec![NotificationKind::PaymentPendingPix, NotificationKind::PaymentApproved]);
    let carts = recorder.cleared_carts();
    assert_eq!(carts.len(), 1);
    assert_eq!(carts[0].user_id, "user-1");
}

#[actix_web::test]
async fn prices_come_from_the_catalog() {
    let app = TestApp::new(pix_gateway()).await;
    let mut request = pix_checkout();
    request["items"][0]["price"] = json!(1);
    request["items"][0]["unitPrice"] = json!(1);
    let (status, body) = app.call(checkout_request(request), configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(result["order"]["totalAmount"], 5000);
    app.finish().await;
}

#[actix_web::test]
async fn declined_card_checkout() {
    let mut gateway = MockGateway::new();
    gateway.expect_create_transaction().times(1).returning(|_| {
        Ok(GatewayTransaction::new("tx_card", GatewayStatus::Declined).with_message("Cartão recusado"))
    });
    let app = TestApp::new(gateway).await;
    let (status, body) = app.call(checkout_request(card_checkout()), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body.contains("4111"), "{body}");
    let result: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(result["outcome"], "declined");
    assert_eq!(result["reason"], "Cartão recusado");
    assert_eq!(result["order"]["status"], "cancelled");
    assert_eq!(result["order"]["paymentStatus"], "declined");
    let (_db, recorder) = app.finish().await;
    assert_eq!(recorder.kinds(), vec![NotificationKind::PaymentDeclined]);
    assert!(recorder.cleared_carts().is_empty());
}

#[actix_web::test]
async fn invalid_checkout_lists_every_problem() {
    let mut gateway = MockGateway::new();
    gateway.expect_create_transaction().times(0);
    let app = TestApp::new(gateway).await;
    let mut request = card_checkout();
    request["cardData"]["number"] = json!("4111 1111 1111 1112");
    request["cardData"]["cvv"] = json!("1");
    let (status, body) = app.call(checkout_request(request), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err: Value = serde_json::from_str(&body).unwrap();
    assert!(err["errors"].as_array().unwrap().len() >= 2, "{body}");
    let (_db, recorder) = app.finish().await;
    assert!(recorder.notifications().is_empty());
}

#[actix_web::test]
async fn unparseable_checkout_body() {
    let app = TestApp::new(MockGateway::new()).await;
    let req = TestRequest::post()
        .uri("/api/checkout")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{\"items\": [");
    let (status, _) = app.call(req, configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    app.finish().await;
}

#[actix_web::test]
async fn unreachable_processor_cancels_the_order() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_transaction()
        .times(1)
        .returning(|_| Err(GatewayError::Transient("connection refused".into())));
    let app = TestApp::new(gateway).await;
    let (status, body) = app.call(checkout_request(pix_checkout()), configure).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{body}");
    let (db, recorder) = app.finish().await;
    assert!(db.fetch_pending_transactions().await.unwrap().is_empty());
    assert!(recorder.notifications().is_empty());
}

#[actix_web::test]
async fn order_details_and_refund() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_transaction()
        .times(1)
        .returning(|req| Ok(GatewayTransaction::new("tx_paid", GatewayStatus::Approved).with_amount(req.amount)));
    gateway
        .expect_refund_transaction()
        .withf(|id, amount| id.to_string() == "tx_paid" && amount.is_none())
        .times(1)
        .returning(|_, _| Ok(GatewayTransaction::new("tx_paid", GatewayStatus::Refunded)));
    let app = TestApp::new(gateway).await;
    let (status, body) = app.call(checkout_request(card_checkout()), configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(result["outcome"], "approved");
    let order_number = result["order"]["orderNumber"].as_str().unwrap().to_string();

    let path = format!("/api/orders/{order_number}");
    let (status, body) = app.call(TestRequest::get().uri(&path), configure).await;
    assert_eq!(status, StatusCode::OK);
    let details: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(details["order"]["status"], "processing");
    assert_eq!(details["transaction"]["externalId"], "tx_paid");
    assert!(!details["history"].as_array().unwrap().is_empty());

    let refund_path = format!("/admin/orders/{order_number}/refund");
    // Refunds are back-office only
    let (status, _) = app.call(TestRequest::post().uri(&refund_path), configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) =
        app.call(TestRequest::post().uri(&format!("/api/orders/{order_number}/refund")), configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = app.call(admin_request(Method::POST, &refund_path), configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let refunded: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(refunded["status"], "refunded");

    let (db, recorder) = app.finish().await;
    let order = fetch_order(&db, &OrderNumber::from(order_number)).await;
    assert_eq!(order.current_state(), OrderTransition::REFUNDED);
    assert_eq!(order.total_amount, Cents::from(1990));
    assert_eq!(recorder.kinds(), vec![NotificationKind::OrderConfirmation, NotificationKind::PaymentRefunded]);
}

#[actix_web::test]
async fn refunds_need_an_approved_order() {
    let app = TestApp::new(pix_gateway()).await;
    let (_, body) = app.call(checkout_request(pix_checkout()), configure).await;
    let result: Value = serde_json::from_str(&body).unwrap();
    let order_number = result["order"]["orderNumber"].as_str().unwrap().to_string();
    let req = admin_request(Method::POST, &format!("/admin/orders/{order_number}/refund"));
    let (status, _) = app.call(req, configure).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app.call(admin_request(Method::POST, "/admin/orders/ORD-MISSING/refund"), configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    app.finish().await;
}

#[actix_web::test]
async fn unknown_order_details() {
    let app = TestApp::new(MockGateway::new()).await;
    let (status, body) = app.call(TestRequest::get().uri("/api/orders/ORD-MISSING"), configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let err: Value = serde_json::from_str(&body).unwrap();
    assert!(err["error"].as_str().unwrap().contains("ORD-MISSING"));
    app.finish().await;
}
