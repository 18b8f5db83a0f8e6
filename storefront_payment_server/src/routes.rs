//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Any I/O (database, payment processor) is awaited, never blocked on.
//!
//! A note about logging: request bodies may carry card data. Only ever log a body after passing it through
//! [`redact_json`].
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use gateway_client::PaymentGateway;
use log::*;
use serde::de::DeserializeOwned;
use serde_json::Value;
use storefront_payment_engine::{
    db_types::OrderNumber,
    helpers::{
        calculate_installments,
        detect_brand,
        mask_card_number,
        redact_json,
        validate_card,
        CardBrand,
        CardData,
        CardTokenizer,
    },
    order_objects::{CheckoutOutcome, CheckoutRequest},
    webhook_objects::WebhookPayload,
    CheckoutApi,
    CheckoutOptions,
    OrderFlowApi,
    PaymentGatewayDatabase,
};

use crate::{
    config::ServerOptions,
    data_objects::{
        CardTokenResponse,
        CardValidationResponse,
        DetectBrandRequest,
        DetectBrandResponse,
        InstallmentsRequest,
        InstallmentsResponse,
        JsonResponse,
        RefundParams,
        WebhookAck,
    },
    errors::ServerError,
    helpers::get_remote_ip,
    reconciliation_worker::ReconciliationRegistry,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

/// Parses a JSON body, logging a redacted copy of it at debug level.
fn parse_body<T: DeserializeOwned>(body: &[u8], context: &str) -> Result<T, ServerError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        debug!("💻️ {context}: body is not valid JSON. {e}");
        ServerError::InvalidRequestBody(e.to_string())
    })?;
    debug!("💻️ {context}: {}", redact_json(&value));
    serde_json::from_value(value).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout" impl PaymentGatewayDatabase, PaymentGateway);
/// Route handler for the checkout endpoint
///
/// Accepts the cart (product ids and quantities only; prices are looked up on the server), the shipping address, the
/// payment method and, for card payments, the card data and number of installments.
///
/// * `200 OK` with the order, its transaction and any PIX/boleto instructions when the payment was approved or is
///   awaiting the customer.
/// * `400 Bad Request` with the same body when the processor declined the payment, or with an `errors` list when the
///   request is invalid.
/// * `503 Service Unavailable` when the processor could not be reached. The order is cancelled.
pub async fn checkout<B, G>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<CheckoutApi<B, G>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    G: PaymentGateway,
{
    let mut request: CheckoutRequest = parse_body(&body, "POST checkout")?;
    request.client_ip = get_remote_ip(&req, options.use_x_forwarded_for, options.use_forwarded).map(|ip| ip.to_string());
    let result = api.checkout(request).await?;
    info!(
        "💻️ Checkout of order {} finished with {:?} ({}/{})",
        result.order.order_number, result.outcome, result.order.status, result.order.payment_status
    );
    if matches!(result.outcome, CheckoutOutcome::Declined { .. }) {
        Ok(HttpResponse::BadRequest().json(result))
    } else {
        Ok(HttpResponse::Ok().json(result))
    }
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(order_details => Get "/orders/{order_number}" impl PaymentGatewayDatabase);
/// Returns the order, its latest transaction and the full status history.
pub async fn order_details<B: PaymentGatewayDatabase>(
    path: web::Path<OrderNumber>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_number = path.into_inner();
    debug!("💻️ GET order details for {order_number}");
    let details = api.order_details(&order_number).await.map_err(|e| {
        debug!("💻️ Could not fetch order {order_number}. {e}");
        ServerError::from(e)
    })?;
    match details {
        Some(details) => Ok(HttpResponse::Ok().json(details)),
        None => Err(ServerError::NoRecordFound(format!("Order {order_number} does not exist"))),
    }
}

route!(refund_order => Post "/orders/{order_number}/refund" impl PaymentGatewayDatabase, PaymentGateway);
/// Refunds an approved order, in full unless `{"amount": <cents>}` is given.
pub async fn refund_order<B, G>(
    path: web::Path<OrderNumber>,
    body: Option<web::Json<RefundParams>>,
    api: web::Data<CheckoutApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    G: PaymentGateway,
{
    let order_number = path.into_inner();
    let params = body.map(|b| b.into_inner()).unwrap_or_default();
    info!("💻️ Refund requested for order {order_number} ({:?})", params.amount);
    let order = api.refund_order(&order_number, params.amount).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(gateway_webhook => Post "/transactions" impl PaymentGatewayDatabase);
/// Route handler for processor webhooks. Mounted under `/webhooks` behind the HMAC middleware, so by the time this
/// runs the body is known to come from the processor.
///
/// Duplicate or stale deliveries are acknowledged with `200 OK` and `"applied": false`. Webhooks for orders we don't
/// know are answered with `404`.
pub async fn gateway_webhook<B: PaymentGatewayDatabase>(
    body: web::Bytes,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("🪝️ Received webhook");
    let payload: WebhookPayload = parse_body(&body, "🪝️ POST webhook")?;
    let update = api.process_webhook(payload).await?;
    let ack = WebhookAck::from(&update);
    if ack.applied {
        info!("🪝️ Order {} is now {}/{}", ack.order_number, ack.status, ack.payment_status);
    } else {
        debug!("🪝️ Webhook for order {} changed nothing", ack.order_number);
    }
    Ok(HttpResponse::Ok().json(ack))
}

//----------------------------------------------   Reconciliation  ----------------------------------------------------
#[get("/reconciliation")]
pub async fn reconciliation_status(registry: web::Data<ReconciliationRegistry>) -> impl Responder {
    trace!("💻️ GET reconciliation status");
    HttpResponse::Ok().json(registry.snapshot())
}

#[post("/reconciliation/{order_id}/stop")]
pub async fn stop_reconciliation(
    path: web::Path<i64>,
    registry: web::Data<ReconciliationRegistry>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    if registry.stop(order_id) {
        info!("💻️ Reconciliation of order #{order_id} stopped on request");
        Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Stopped reconciliation of order #{order_id}"))))
    } else {
        Err(ServerError::NoRecordFound(format!("There is no active reconciliation task for order #{order_id}")))
    }
}

//----------------------------------------------   Card helpers  ----------------------------------------------------
#[post("/card/validate")]
pub async fn validate_card_details(body: web::Bytes) -> Result<HttpResponse, ServerError> {
    let card: CardData = parse_body(&body, "POST card/validate")?;
    let result = validate_card(&card);
    debug!("💻️ Card validation: valid={} brand={:?}", result.valid, result.brand);
    if result.valid {
        Ok(HttpResponse::Ok().json(CardValidationResponse {
            valid: true,
            errors: vec![],
            brand: result.brand,
            last_digits: result.last4,
            masked: Some(mask_card_number(&card.number)),
        }))
    } else {
        Ok(HttpResponse::BadRequest().json(CardValidationResponse {
            valid: false,
            errors: result.errors,
            brand: None,
            last_digits: None,
            masked: None,
        }))
    }
}

#[post("/card/installments")]
pub async fn installment_options(
    body: web::Json<InstallmentsRequest>,
    options: web::Data<CheckoutOptions>,
) -> Result<HttpResponse, ServerError> {
    let InstallmentsRequest { total_amount, card_brand } = body.into_inner();
    if !total_amount.is_positive() {
        return Err(ServerError::ValidationError(vec!["The total amount must be positive".to_string()]));
    }
    let choices = calculate_installments(total_amount, options.max_installments, options.annual_interest_rate);
    Ok(HttpResponse::Ok().json(InstallmentsResponse {
        total_amount,
        card_brand,
        max_installments: options.max_installments,
        interest_rate: options.annual_interest_rate,
        options: choices,
    }))
}

#[post("/card/token")]
pub async fn tokenize_card(
    body: web::Bytes,
    tokenizer: web::Data<CardTokenizer>,
) -> Result<HttpResponse, ServerError> {
    let card: CardData = parse_body(&body, "POST card/token")?;
    let token = tokenizer.issue_token(&card)?;
    let info = tokenizer.decode_token(&token)?;
    debug!("💻️ Issued a card token for a {:?} card ending in {}", info.brand, info.last_digits);
    Ok(HttpResponse::Ok().json(CardTokenResponse {
        success: true,
        token,
        brand: info.brand,
        last_digits: info.last_digits,
        masked: mask_card_number(&card.number),
    }))
}

#[post("/card/detect-brand")]
pub async fn detect_card_brand(
    body: web::Bytes,
    options: web::Data<CheckoutOptions>,
) -> Result<HttpResponse, ServerError> {
    let request: DetectBrandRequest = parse_body(&body, "POST card/detect-brand")?;
    if request.card_number.trim().is_empty() {
        return Err(ServerError::ValidationError(vec!["The card number is required".to_string()]));
    }
    let brand = detect_brand(&request.card_number);
    Ok(HttpResponse::Ok().json(DetectBrandResponse {
        brand,
        supported: brand.is_supported() && brand != CardBrand::Unknown,
        max_installments: options.max_installments,
        interest_rate: options.annual_interest_rate,
    }))
}
