use std::sync::Arc;

use actix_web::{
    http::{Method, StatusCode},
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
};
use chrono::Utc;
use log::debug;
use spg_common::Secret;
use storefront_payment_engine::{
    db_types::{
        Address,
        Cents,
        LineItem,
        NewOrder,
        NewTransaction,
        Order,
        OrderNumber,
        OrderStatusType,
        OrderTransition,
        PaymentMethod,
        PaymentStatus,
        TransactionStatus,
    },
    events::EventHandlers,
    helpers::{calculate_hmac, CardTokenizer},
    test_utils::{
        event_recorder::EventRecorder,
        mock_gateway::MockGateway,
        prepare_env::{prepare_test_env, random_db_path},
    },
    CheckoutApi,
    CheckoutOptions,
    OrderFlowApi,
    OrderManagement,
    PaymentGatewayDatabase,
    SqliteDatabase,
};

use crate::{
    config::{ServerOptions, DEFAULT_ADMIN_SIGNATURE_HEADER},
    middleware::{request_signing_payload, HmacMiddlewareFactory},
    reconciliation_worker::ReconciliationRegistry,
    routes::{reconciliation_status, stop_reconciliation, RefundOrderRoute},
};

pub const WEBHOOK_SECRET: &str = "whsec_test_only";
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const ADMIN_SECRET: &str = "admin_test_only";

/// A migrated, empty database with two catalog products.
pub async fn new_test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating test database");
    db.upsert_catalog_entry("sku-1", "Camiseta", Cents::from(2500)).await.expect("Error seeding catalog");
    db.upsert_catalog_entry("sku-2", "Boné", Cents::from(1990)).await.expect("Error seeding catalog");
    db
}

pub fn address() -> Address {
    Address {
        recipient: Some("Maria Silva".into()),
        street: "Rua das Flores".into(),
        number: "42".into(),
        complement: None,
        neighborhood: Some("Centro".into()),
        city: "São Paulo".into(),
        state: "SP".into(),
        zip_code: "01001-000".into(),
    }
}

/// Stores an order for two `sku-1` items with a pending transaction `external_id`, as checkout leaves an
/// asynchronous payment.
pub async fn seed_awaiting_order(db: &SqliteDatabase, method: PaymentMethod, external_id: &str) -> Order {
    let items = vec![LineItem::new("sku-1", "Camiseta", 2, Cents::from(2500))];
    let order = NewOrder::new(items, address(), method)
        .expect("Order total overflowed")
        .with_user_id("user-7")
        .with_customer_email("maria@example.com");
    let order = db.insert_order(order).await.expect("Error inserting order");
    db.insert_transaction(NewTransaction {
        order_id: order.id,
        external_id: external_id.into(),
        amount: order.total_amount,
        status: TransactionStatus::Pending,
        payment_method: method,
        installments: 1,
        raw_response: None,
    })
    .await
    .expect("Error inserting transaction");
    let order = db.transition_order(order.id, OrderTransition::AWAITING_PAYMENT).await.expect("Error transitioning");
    let order = order.into_inner();
    debug!("Seeded order {} (#{}) awaiting {external_id}", order.order_number, order.id);
    order
}

/// An order that was never stored. Good enough for rendering notifications.
pub fn sample_order(order_number: OrderNumber, total: Cents) -> Order {
    Order {
        id: 1,
        order_number,
        user_id: Some("user-1".into()),
        customer_email: None,
        items: vec![LineItem::new("sku-1", "Camiseta", 1, total)],
        shipping_address: address(),
        payment_method: PaymentMethod::Pix,
        installments: 1,
        total_amount: total,
        status: OrderStatusType::AwaitingPayment,
        payment_status: PaymentStatus::Pending,
        transaction_id: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn sign(body: &str) -> String {
    calculate_hmac(WEBHOOK_SECRET, body.as_bytes())
}

/// Mounts the back-office routes the way the server does.
pub fn configure_admin(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HmacMiddlewareFactory::for_admin_requests(
                DEFAULT_ADMIN_SIGNATURE_HEADER,
                Secret::new(ADMIN_SECRET.to_string()),
            ))
            .service(RefundOrderRoute::<SqliteDatabase, MockGateway>::new())
            .service(reconciliation_status)
            .service(stop_reconciliation),
    );
}

/// A bodyless admin request, signed with [`ADMIN_SECRET`].
pub fn admin_request(method: Method, path: &str) -> TestRequest {
    let signature = calculate_hmac(ADMIN_SECRET, &request_signing_payload(method.as_str(), path, b""));
    TestRequest::default().method(method).uri(path).insert_header((DEFAULT_ADMIN_SIGNATURE_HEADER, signature))
}

pub fn tokenizer() -> CardTokenizer {
    CardTokenizer::new(Secret::new("test-token-key".to_string()))
}

/// Everything the route handlers need, backed by a fresh database and a mocked payment processor.
pub struct TestApp {
    pub db: SqliteDatabase,
    pub recorder: EventRecorder,
    pub registry: ReconciliationRegistry,
    orders: web::Data<OrderFlowApi<SqliteDatabase>>,
    checkout: web::Data<CheckoutApi<SqliteDatabase, MockGateway>>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl TestApp {
    pub async fn new(gateway: MockGateway) -> Self {
        let db = new_test_db().await;
        Self::with_db(db, gateway)
    }

    pub fn with_db(db: SqliteDatabase, gateway: MockGateway) -> Self {
        let recorder = EventRecorder::new();
        let handlers = EventHandlers::new(16, recorder.hooks());
        let producers = handlers.producers();
        let orders = OrderFlowApi::new(db.clone(), producers.clone());
        let checkout =
            CheckoutApi::new(db.clone(), Arc::new(gateway), producers, tokenizer(), CheckoutOptions::default());
        let handles = handlers.start_handlers();
        Self {
            db,
            recorder,
            registry: ReconciliationRegistry::new(),
            orders: web::Data::new(orders),
            checkout: web::Data::new(checkout),
            handles,
        }
    }

    /// Sends `req` to an app configured by `configure` and returns the status and body. Errors raised by middleware
    /// are reported with the status they would produce.
    pub async fn call<F>(&self, req: TestRequest, configure: F) -> (StatusCode, String)
    where F: FnOnce(&mut ServiceConfig) {
        let app = App::new()
            .app_data(self.orders.clone())
            .app_data(self.checkout.clone())
            .app_data(web::Data::new(ServerOptions::default()))
            .app_data(web::Data::new(CheckoutOptions::default()))
            .app_data(web::Data::new(tokenizer()))
            .app_data(web::Data::new(self.registry.clone()))
            .configure(configure);
        let service = test::init_service(app).await;
        match test::try_call_service(&service, req.to_request()).await {
            Ok(res) => {
                let status = res.status();
                let body = test::read_body(res).await;
                (status, String::from_utf8_lossy(&body).into_owned())
            },
            Err(e) => (e.as_response_error().status_code(), e.to_string()),
        }
    }

    /// Drops the APIs so that the event handlers can finish, and waits for them.
    pub async fn finish(self) -> (SqliteDatabase, EventRecorder) {
        drop(self.orders);
        drop(self.checkout);
        for h in self.handles {
            h.await.expect("Event handler panicked");
        }
        (self.db, self.recorder)
    }
}

pub async fn fetch_order(db: &SqliteDatabase, order_number: &OrderNumber) -> Order {
    db.fetch_order_by_number(order_number).await.expect("Error fetching order").expect("Order does not exist")
}
