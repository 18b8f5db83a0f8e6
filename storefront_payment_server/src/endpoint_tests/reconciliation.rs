use actix_web::{
    http::{Method, StatusCode},
    test::TestRequest,
};
use serde_json::Value;
use storefront_payment_engine::test_utils::mock_gateway::MockGateway;

use super::helpers::{admin_request, configure_admin, TestApp};

#[actix_web::test]
async fn list_and_stop_polling_tasks() {
    let app = TestApp::new(MockGateway::new()).await;
    assert!(app.registry.try_register(7, "tx_7", 60));
    assert!(app.registry.try_register(3, "tx_3", 60));
    app.registry.record_attempt(7);

    let (status, body) = app.call(admin_request(Method::GET, "/admin/reconciliation"), configure_admin).await;
    assert_eq!(status, StatusCode::OK);
    let tasks: Value = serde_json::from_str(&body).unwrap();
    let tasks = tasks.as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["orderId"], 3);
    assert_eq!(tasks[1]["externalId"], "tx_7");
    assert_eq!(tasks[1]["attempts"], 1);
    assert_eq!(tasks[1]["state"], "active");

    let (status, _) = app.call(admin_request(Method::POST, "/admin/reconciliation/7/stop"), configure_admin).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.registry.is_active(7));
    // Stopping twice is an error
    let (status, _) = app.call(admin_request(Method::POST, "/admin/reconciliation/7/stop"), configure_admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.call(admin_request(Method::POST, "/admin/reconciliation/99/stop"), configure_admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.call(admin_request(Method::GET, "/admin/reconciliation"), configure_admin).await;
    let tasks: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(tasks[1]["state"], "stopped");
    app.finish().await;
}

#[actix_web::test]
async fn polling_tasks_cannot_be_stopped_without_a_valid_signature() {
    let app = TestApp::new(MockGateway::new()).await;
    assert!(app.registry.try_register(7, "tx_7", 60));

    let (status, _) = app.call(TestRequest::post().uri("/admin/reconciliation/7/stop"), configure_admin).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.call(TestRequest::get().uri("/admin/reconciliation"), configure_admin).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A signature is only good for the request it was made for
    let listing = admin_request(Method::GET, "/admin/reconciliation").to_http_request();
    let signature = listing.headers().get("X-Admin-Signature").cloned().unwrap();
    let replayed = TestRequest::post().uri("/admin/reconciliation/7/stop").insert_header(("X-Admin-Signature", signature));
    let (status, _) = app.call(replayed, configure_admin).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(app.registry.is_active(7));
    app.finish().await;
}
