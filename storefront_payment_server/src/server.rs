use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use gateway_client::GatewayApi;
use log::*;
use storefront_payment_engine::{
    events::{EventHandlers, EventProducers},
    helpers::CardTokenizer,
    CheckoutApi,
    OrderFlowApi,
    SqliteDatabase,
};

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    middleware::HmacMiddlewareFactory,
    notifications::notification_hooks,
    reconciliation_worker::{start_reconciliation_worker, ReconciliationRegistry},
    routes::{
        detect_card_brand,
        health,
        installment_options,
        reconciliation_status,
        stop_reconciliation,
        tokenize_card,
        validate_card_details,
        CheckoutRoute,
        GatewayWebhookRoute,
        OrderDetailsRoute,
        RefundOrderRoute,
    },
};

const EVENT_BUFFER_SIZE: usize = 256;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    config.validate()?;
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(format!("Could not run migrations. {e}")))?;
    let gateway =
        Arc::new(GatewayApi::new(config.gateway.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?);
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, notification_hooks());
    let producers = handlers.producers();
    let _event_tasks = handlers.start_handlers();
    let registry = ReconciliationRegistry::new();
    let _worker = start_reconciliation_worker(
        db.clone(),
        Arc::clone(&gateway),
        producers.clone(),
        config.reconciliation.clone(),
        registry.clone(),
    );
    let srv = create_server_instance(config, db, gateway, producers, registry)?;
    srv.await.map_err(ServerError::from)
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: Arc<GatewayApi>,
    producers: EventProducers,
    registry: ReconciliationRegistry,
) -> Result<Server, ServerError> {
    let tokenizer = CardTokenizer::new(config.card_token_key.clone());
    let options = ServerOptions::from_config(&config);
    let webhook = config.webhook.clone();
    let admin = config.admin.clone();
    if !admin.is_enabled() {
        warn!("💻️ No admin secret configured. /admin routes are not mounted.");
    }
    let checkout_options = config.checkout.clone();
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone());
        let checkout_api = CheckoutApi::new(
            db.clone(),
            Arc::clone(&gateway),
            producers.clone(),
            tokenizer.clone(),
            checkout_options.clone(),
        );
        let api_scope = web::scope("/api")
            .service(CheckoutRoute::<SqliteDatabase, GatewayApi>::new())
            .service(OrderDetailsRoute::<SqliteDatabase>::new())
            .service(validate_card_details)
            .service(installment_options)
            .service(tokenize_card)
            .service(detect_card_brand);
        let webhook_scope = web::scope("/webhooks")
            .wrap(HmacMiddlewareFactory::new(
                &webhook.signature_header,
                webhook.hmac_secret.clone(),
                webhook.hmac_checks,
            ))
            .service(GatewayWebhookRoute::<SqliteDatabase>::new());
        let admin_scope = web::scope("/admin")
            .wrap(HmacMiddlewareFactory::for_admin_requests(&admin.signature_header, admin.hmac_secret.clone()))
            .service(RefundOrderRoute::<SqliteDatabase, GatewayApi>::new())
            .service(reconciliation_status)
            .service(stop_reconciliation);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("spg::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(checkout_api))
            .app_data(web::Data::new(options))
            .app_data(web::Data::new(checkout_options.clone()))
            .app_data(web::Data::new(tokenizer.clone()))
            .app_data(web::Data::new(registry.clone()))
            .service(health)
            .service(api_scope)
            .service(webhook_scope);
        app.configure(|cfg| {
            if admin.is_enabled() {
                cfg.service(admin_scope);
            }
        })
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    info!("💻️ Listening on {}:{}", config.host, config.port);
    Ok(srv)
}
