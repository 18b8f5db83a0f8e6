use actix_web::{http::StatusCode, test::TestRequest, web::ServiceConfig};
use serde_json::{json, Value};
use storefront_payment_engine::{helpers::CARD_TOKEN_PREFIX, test_utils::mock_gateway::MockGateway};

use super::helpers::TestApp;
use crate::routes::{detect_card_brand, installment_options, tokenize_card, validate_card_details};

fn configure(cfg: &mut ServiceConfig) {
    cfg.service(validate_card_details).service(installment_options).service(tokenize_card).service(detect_card_brand);
}

fn post(path: &str, body: Value) -> TestRequest {
    TestRequest::post().uri(path).insert_header(("Content-Type", "application/json")).set_payload(body.to_string())
}

fn visa() -> Value {
    json!({ "number": "4111 1111 1111 1111", "holder": "MARIA SILVA", "expiry": "12/99", "cvv": "123" })
}

#[actix_web::test]
async fn validate_good_card() {
    let app = TestApp::new(MockGateway::new()).await;
    let (status, body) = app.call(post("/card/validate", visa()), configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let res: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(res["valid"], true);
    assert_eq!(res["brand"], "VISA");
    assert_eq!(res["lastDigits"], "1111");
    assert!(!body.contains("4111111111111111"));
    assert!(!body.contains("4111 1111 1111 1111"));
    app.finish().await;
}

#[actix_web::test]
async fn validate_bad_card() {
    let app = TestApp::new(MockGateway::new()).await;
    let card = json!({ "number": "1234 5678 9012 3456", "holder": "", "expiry": "01/20", "cvv": "12" });
    let (status, body) = app.call(post("/card/validate", card), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let res: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(res["valid"], false);
    assert_eq!(res["errors"].as_array().unwrap().len(), 4, "{body}");
    app.finish().await;
}

#[actix_web::test]
async fn installment_plan() {
    let app = TestApp::new(MockGateway::new()).await;
    let (status, body) =
        app.call(post("/card/installments", json!({ "totalAmount": 12000, "cardBrand": "VISA" })), configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let res: Value = serde_json::from_str(&body).unwrap();
    let options = res["options"].as_array().unwrap();
    assert_eq!(options.len(), 12);
    assert_eq!(options[0]["count"], 1);
    assert_eq!(options[0]["perInstallment"], 12000);
    assert_eq!(options[0]["interest"], 0);

    let (status, _) = app.call(post("/card/installments", json!({ "totalAmount": 0 })), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    app.finish().await;
}

#[actix_web::test]
async fn tokens_never_echo_the_card_number() {
    let app = TestApp::new(MockGateway::new()).await;
    let (status, body) = app.call(post("/card/token", visa()), configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let res: Value = serde_json::from_str(&body).unwrap();
    assert!(res["token"].as_str().unwrap().starts_with(CARD_TOKEN_PREFIX));
    assert_eq!(res["lastDigits"], "1111");
    assert!(!body.contains("4111111111111111"));
    assert!(!body.contains("\"123\""));

    let mut expired = visa();
    expired["expiry"] = json!("01/20");
    let (status, _) = app.call(post("/card/token", expired), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    app.finish().await;
}

#[actix_web::test]
async fn detect_brand() {
    let app = TestApp::new(MockGateway::new()).await;
    let req = post("/card/detect-brand", json!({ "cardNumber": "4111 1111 1111 1111" }));
    let (status, body) = app.call(req, configure).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let res: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(res["brand"], "VISA");
    assert_eq!(res["supported"], true);
    assert_eq!(res["maxInstallments"], 12);

    let (status, body) = app.call(post("/card/detect-brand", json!({ "number": "0000" })), configure).await;
    assert_eq!(status, StatusCode::OK);
    let res: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(res["brand"], "UNKNOWN");
    assert_eq!(res["supported"], false);

    let (status, _) = app.call(post("/card/detect-brand", json!({ "cardNumber": " " })), configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    app.finish().await;
}
