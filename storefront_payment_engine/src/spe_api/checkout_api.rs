use std::{fmt::Debug, sync::Arc};

use gateway_client::{
    CardDetails,
    CreateTransactionRequest,
    ExpiryDetails,
    GatewayAddress,
    GatewayCustomer,
    GatewayDocument,
    GatewayError,
    GatewayItem,
    GatewayShipping,
    GatewayStatus,
    GatewayTransaction,
    MethodDetails,
    PaymentGateway,
};
use log::*;
use serde_json::{json, Value};
use spg_common::{Cents, PaymentMethod};

use crate::{
    db_types::{Address, LineItem, NewOrder, NewTransaction, Order, OrderNumber, OrderTransition, TransactionStatus},
    events::EventProducers,
    helpers::{validate_card, CardTokenizer},
    spe_api::{
        errors::CheckoutError,
        order_flow_api::{OrderFlowApi, StatusUpdate, UpdateOrigin},
        order_objects::{CartItemRequest, CheckoutOutcome, CheckoutRequest, CheckoutResult, PaymentInstructions},
    },
    traits::PaymentGatewayDatabase,
};

#[derive(Debug, Clone)]
pub struct CheckoutOptions {
    pub pix_expiry_days: u32,
    pub boleto_expiry_days: u32,
    pub max_installments: u8,
    /// Annual rate, in percent, used to quote installment plans
    pub annual_interest_rate: f64,
    /// Where the processor should send webhooks for transactions we create
    pub postback_url: Option<String>,
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        Self {
            pix_expiry_days: 1,
            boleto_expiry_days: 3,
            max_installments: 12,
            annual_interest_rate: 0.0,
            postback_url: None,
        }
    }
}

/// `CheckoutApi` turns a cart into a persisted order and a processor transaction.
///
/// The flow is:
/// 1. Validate everything and report all problems at once.
/// 2. Price the cart from the catalog. Client-side prices are never trusted.
/// 3. Persist the order in `pending`.
/// 4. Create the processor transaction. If that fails for any reason, the order is cancelled so that no order is left
///    in `pending`.
/// 5. Persist the transaction and apply its status through [`OrderFlowApi`], which publishes the notification.
pub struct CheckoutApi<B, G> {
    db: B,
    gateway: Arc<G>,
    flow: OrderFlowApi<B>,
    tokenizer: CardTokenizer,
    options: CheckoutOptions,
}

impl<B, G> Debug for CheckoutApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi ({:?})", self.options)
    }
}

impl<B, G> CheckoutApi<B, G>
where
    B: PaymentGatewayDatabase,
    G: PaymentGateway,
{
    pub fn new(
        db: B,
        gateway: Arc<G>,
        producers: EventProducers,
        tokenizer: CardTokenizer,
        options: CheckoutOptions,
    ) -> Self {
        let flow = OrderFlowApi::new(db.clone(), producers);
        Self { db, gateway, flow, tokenizer, options }
    }

    pub fn options(&self) -> &CheckoutOptions {
        &self.options
    }

    /// Reprices the cart from the catalog. Every problem is reported, not just the first.
    pub async fn price_cart(&self, items: &[CartItemRequest]) -> Result<Vec<LineItem>, CheckoutError> {
        if items.is_empty() {
            return Err(CheckoutError::validation("The cart is empty"));
        }
        let mut errors = Vec::new();
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let quantity = match u32::try_from(item.quantity) {
                Ok(q) if q > 0 => q,
                _ => {
                    errors.push(format!("Quantity for product {} must be a positive number", item.product_id));
                    continue;
                },
            };
            match self.db.fetch_catalog_entry(&item.product_id).await? {
                Some(entry) if entry.unit_price.is_positive() => {
                    lines.push(LineItem::new(entry.product_id, entry.name, quantity, entry.unit_price));
                },
                Some(_) => errors.push(format!("Product {} does not have a valid price", item.product_id)),
                None => errors.push(format!("Product {} is not available", item.product_id)),
            }
        }
        if errors.is_empty() {
            Ok(lines)
        } else {
            Err(CheckoutError::Validation(errors))
        }
    }

    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutResult, CheckoutError> {
        let mut errors = Vec::new();
        let items = match self.price_cart(&request.items).await {
            Ok(items) => items,
            Err(CheckoutError::Validation(e)) => {
                errors.extend(e);
                vec![]
            },
            Err(e) => return Err(e),
        };
        errors.extend(self.validate_request(&request));
        if !errors.is_empty() {
            debug!("🛒️ Checkout rejected with {} validation errors", errors.len());
            return Err(CheckoutError::Validation(errors));
        }
        let card = match (&request.payment_method, &request.card_data) {
            (PaymentMethod::CreditCard, Some(card)) => {
                let token =
                    self.tokenizer.issue_token(card).map_err(|e| CheckoutError::Validation(vec![e.to_string()]))?;
                let validation = validate_card(card);
                Some(CardDetails {
                    token,
                    brand: validation.brand.map(|b| b.to_string()),
                    last_digits: validation.last4,
                })
            },
            _ => None,
        };

        let mut new_order = NewOrder::new(items, request.shipping_address.clone(), request.payment_method)
            .ok_or_else(|| CheckoutError::validation("The order total is too large"))?
            .with_installments(request.installments);
        if let Some(user_id) = &request.user_id {
            new_order = new_order.with_user_id(user_id.clone());
        }
        if let Some(email) = request.customer.as_ref().and_then(|c| c.email.clone()) {
            new_order = new_order.with_customer_email(email);
        }
        let order = self.db.insert_order(new_order).await?;
        info!("🛒️ Order {} created for {} ({})", order.order_number, order.total_amount, order.payment_method);

        let tx_request = self.transaction_request(&order, &request, card);
        let gateway_tx = match self.gateway.create_transaction(&tx_request).await {
            Ok(tx) => tx,
            Err(e) => return Err(self.abort_checkout(&order, e).await),
        };
        self.complete_checkout(order, gateway_tx).await
    }

    fn validate_request(&self, request: &CheckoutRequest) -> Vec<String> {
        let mut errors = Vec::new();
        let missing = request.shipping_address.missing_fields();
        if !missing.is_empty() {
            errors.push(format!("The shipping address is missing: {}", missing.join(", ")));
        }
        let max = self.options.max_installments;
        if request.installments == 0 || request.installments > max {
            errors.push(format!("Installments must be between 1 and {max}"));
        } else if request.installments > 1 && request.payment_method != PaymentMethod::CreditCard {
            errors.push("Installments are only available for credit card payments".to_string());
        }
        if request.payment_method == PaymentMethod::CreditCard {
            match &request.card_data {
                Some(card) => errors.extend(validate_card(card).errors),
                None => errors.push("Card details are required for credit card payments".to_string()),
            }
        }
        errors
    }

    fn transaction_request(
        &self,
        order: &Order,
        request: &CheckoutRequest,
        card: Option<CardDetails>,
    ) -> CreateTransactionRequest {
        let method = match (order.payment_method, card) {
            (PaymentMethod::CreditCard, Some(card)) => MethodDetails::Card { card, installments: request.installments },
            (PaymentMethod::Boleto, _) => {
                MethodDetails::Boleto { boleto: ExpiryDetails { expires_in_days: self.options.boleto_expiry_days } }
            },
            _ => MethodDetails::Pix { pix: ExpiryDetails { expires_in_days: self.options.pix_expiry_days } },
        };
        let items = order
            .items
            .iter()
            .map(|i| GatewayItem {
                title: i.name.clone(),
                unit_price: i.unit_price,
                quantity: i.quantity,
                tangible: true,
                external_ref: Some(i.product_id.clone()),
            })
            .collect();
        let address = gateway_address(&order.shipping_address);
        let mut tx_request = CreateTransactionRequest::new(order.order_number.as_str(), order.total_amount, method)
            .with_items(items)
            .with_shipping(GatewayShipping { fee: Cents::default(), address: address.clone() });
        if let Some(customer) = &request.customer {
            let name = customer
                .name
                .clone()
                .or_else(|| order.shipping_address.recipient.clone())
                .unwrap_or_else(|| "Cliente".to_string());
            tx_request = tx_request.with_customer(GatewayCustomer {
                name,
                email: customer.email.clone(),
                phone: customer.phone.clone(),
                document: customer.document.as_ref().map(|d| gateway_document(d)),
                address: Some(address),
            });
        }
        if let Some(user_id) = &order.user_id {
            tx_request = tx_request.with_customer_id(user_id);
        }
        if let Some(url) = &self.options.postback_url {
            tx_request = tx_request.with_postback_url(url);
        }
        if let Some(ip) = &request.client_ip {
            tx_request = tx_request.with_ip(ip);
        }
        tx_request
    }

    /// The processor did not give us a transaction. Cancel the order so it never lingers in `pending`.
    async fn abort_checkout(&self, order: &Order, error: GatewayError) -> CheckoutError {
        let order_number = order.order_number.clone();
        match &error {
            GatewayError::Authentication { .. } => {
                error!("🛒️ The payment gateway rejected our credentials while creating {order_number}. {error}")
            },
            _ => warn!("🛒️ Could not create a transaction for {order_number}. {error}"),
        }
        self.park_order(order, OrderTransition::DECLINED).await;
        match error {
            GatewayError::Authentication { .. } => CheckoutError::GatewayAuthentication { order_number },
            GatewayError::Validation { message, .. } => CheckoutError::GatewayRejected { order_number, reason: message },
            e => CheckoutError::GatewayUnavailable { order_number, reason: e.to_string() },
        }
    }

    /// Moves an order out of `pending` after a failed checkout step. `awaiting_payment` is used once the transaction
    /// is recorded, so that reconciliation can settle it. Otherwise the order is cancelled.
    async fn park_order(&self, order: &Order, target: OrderTransition) {
        match self.db.transition_order(order.id, target).await {
            Ok(r) => debug!("🛒️ Order {} left pending as {}", order.order_number, r.inner().current_state()),
            Err(e) => error!("🛒️ Could not move order {} out of pending. {e}", order.order_number),
        }
    }

    async fn complete_checkout(
        &self,
        order: Order,
        gateway_tx: GatewayTransaction,
    ) -> Result<CheckoutResult, CheckoutError> {
        let status = match gateway_tx.status {
            // A brand-new transaction cannot have been refunded. Treat it as a failed payment.
            GatewayStatus::Refunded => {
                warn!("🛒️ Processor reported a new transaction for {} as refunded. Treating it as declined.", order.order_number);
                GatewayStatus::Declined
            },
            ref s => s.clone(),
        };
        // Recorded as pending first. The status update below moves it on, and if that fails the poller can still
        // pick the transaction up.
        let transaction = NewTransaction {
            order_id: order.id,
            external_id: gateway_tx.id.clone(),
            amount: order.total_amount,
            status: TransactionStatus::Pending,
            payment_method: order.payment_method,
            installments: u8::try_from(order.installments).unwrap_or(1),
            raw_response: Some(gateway_tx.raw_json()),
        };
        if let Err(e) = self.db.insert_transaction(transaction).await {
            error!("🛒️ Could not record transaction [{}] for order {}. {e}", gateway_tx.id, order.order_number);
            self.park_order(&order, OrderTransition::DECLINED).await;
            return Err(e.into());
        }

        let instructions = PaymentInstructions { pix: gateway_tx.pix.clone(), boleto: gateway_tx.boleto.clone() };
        let reason = gateway_tx.message.clone().unwrap_or_else(|| "Payment declined".to_string());
        let (outcome, details) = match status {
            GatewayStatus::Approved => (CheckoutOutcome::Approved, Value::Null),
            GatewayStatus::Declined => (CheckoutOutcome::Declined { reason: reason.clone() }, json!({ "message": reason })),
            _ => (CheckoutOutcome::AwaitingPayment, instructions_details(&instructions)),
        };
        let update = StatusUpdate::new(status, gateway_tx.id.clone(), UpdateOrigin::Checkout).with_details(details);
        let applied = match self.flow.apply_status_update(&order, update).await {
            Ok(applied) => applied,
            Err(e) => {
                error!("🛒️ Could not apply the checkout status of order {}. {e}", order.order_number);
                self.park_order(&order, OrderTransition::AWAITING_PAYMENT).await;
                return Err(e.into());
            },
        };
        let transaction = applied.transaction.map(|t| t.into_inner());
        let order = applied.order.into_inner();
        info!("🛒️ Checkout for {} complete. Order is {}", order.order_number, order.current_state());
        let instructions = match outcome {
            CheckoutOutcome::AwaitingPayment if !instructions.is_empty() => Some(instructions),
            _ => None,
        };
        Ok(CheckoutResult { order, transaction, outcome, instructions })
    }

    /// Refunds an approved order, in full when `amount` is `None`.
    ///
    /// Refunding an order that is already refunded returns it unchanged.
    pub async fn refund_order(&self, order_number: &OrderNumber, amount: Option<Cents>) -> Result<Order, CheckoutError> {
        let order = self
            .db
            .fetch_order_by_number(order_number)
            .await?
            .ok_or_else(|| CheckoutError::OrderNotFound(order_number.clone()))?;
        if order.current_state() == OrderTransition::REFUNDED {
            return Ok(order);
        }
        if order.current_state() != OrderTransition::APPROVED {
            let reason = format!("Only approved orders can be refunded. This order is {}.", order.current_state());
            return Err(CheckoutError::NotRefundable(order_number.clone(), reason));
        }
        if let Some(amount) = amount {
            if !amount.is_positive() || amount > order.total_amount {
                return Err(CheckoutError::validation(format!(
                    "The refund amount must be positive and at most {}",
                    order.total_amount
                )));
            }
        }
        let tx = self.db.fetch_transaction_for_order(order.id).await?.ok_or_else(|| {
            CheckoutError::NotRefundable(order_number.clone(), "There is no transaction for this order".into())
        })?;
        let refund = self.gateway.refund_transaction(&tx.external_id, amount).await.map_err(|e| {
            warn!("🛒️ Refund of {order_number} failed. {e}");
            match e {
                GatewayError::Authentication { .. } => {
                    error!("🛒️ The payment gateway rejected our credentials during a refund. {e}");
                    CheckoutError::GatewayAuthentication { order_number: order_number.clone() }
                },
                GatewayError::Validation { message, .. } => {
                    CheckoutError::GatewayRejected { order_number: order_number.clone(), reason: message }
                },
                e => CheckoutError::GatewayUnavailable { order_number: order_number.clone(), reason: e.to_string() },
            }
        })?;
        if refund.status != GatewayStatus::Refunded {
            info!("🛒️ Refund of {order_number} was accepted as '{}'. The order stays approved for now.", refund.status);
            return Ok(order);
        }
        let details = json!({ "amount": amount.unwrap_or(order.total_amount) });
        let update = StatusUpdate::new(GatewayStatus::Refunded, tx.external_id.clone(), UpdateOrigin::Refund)
            .with_raw_payload(refund.raw_json())
            .with_details(details);
        let applied = self.flow.apply_status_update(&order, update).await?;
        Ok(applied.order.into_inner())
    }
}

fn gateway_address(address: &Address) -> GatewayAddress {
    GatewayAddress {
        street: address.street.clone(),
        street_number: address.number.clone(),
        complement: address.complement.clone(),
        zip_code: address.zip_code.chars().filter(char::is_ascii_digit).collect(),
        neighborhood: address.neighborhood.clone(),
        city: address.city.clone(),
        state: address.state.clone(),
        country: "BR".to_string(),
    }
}

/// CPF has 11 digits, anything longer is taken to be a CNPJ
fn gateway_document(document: &str) -> GatewayDocument {
    let number: String = document.chars().filter(char::is_ascii_digit).collect();
    let document_type = if number.len() > 11 { "cnpj" } else { "cpf" };
    GatewayDocument { number, document_type: document_type.to_string() }
}

fn instructions_details(instructions: &PaymentInstructions) -> Value {
    serde_json::to_value(instructions).unwrap_or(Value::Null)
}
