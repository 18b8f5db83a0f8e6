use std::sync::Arc;

use async_trait::async_trait;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
    Method,
};
use serde::Serialize;
use serde_json::json;
use spg_common::Cents;

use crate::{
    config::GatewayConfig,
    helpers::basic_auth_header,
    retry::with_backoff,
    CreateTransactionRequest,
    GatewayError,
    GatewayResponse,
    GatewayTransaction,
};

/// The operations the payment engine needs from a payment processor.
///
/// Futures are `Send` so that implementations can be driven from spawned tasks such as the reconciliation worker.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a new transaction. Implementations are expected to retry transient failures before giving up.
    async fn create_transaction(&self, request: &CreateTransactionRequest) -> Result<GatewayTransaction, GatewayError>;

    /// Fetches the current state of a transaction. A single attempt.
    async fn get_transaction_status(&self, external_id: &str) -> Result<GatewayTransaction, GatewayError>;

    /// Refunds a transaction, in full when `amount` is `None`. A single attempt.
    async fn refund_transaction(
        &self,
        external_id: &str,
        amount: Option<Cents>,
    ) -> Result<GatewayTransaction, GatewayError>;
}

#[derive(Clone)]
pub struct GatewayApi {
    config: GatewayConfig,
    client: Arc<Client>,
}

impl GatewayApi {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::with_capacity(2);
        let auth = basic_auth_header(&config.public_key, &config.secret_key);
        let mut val = HeaderValue::from_str(&auth).map_err(|e| GatewayError::Initialization(e.to_string()))?;
        val.set_sensitive(true);
        headers.insert(AUTHORIZATION, val);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/transactions{path}", self.config.base_url)
    }

    /// Sends a request to the processor and unwraps the response envelope into the transaction it carries.
    pub async fn rest_query<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<GatewayTransaction, GatewayError> {
        let url = self.url(path);
        trace!("🌐️ Sending {method} {url}");
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!("🌐️ Gateway responded with {status}");
            return Err(GatewayError::from_status(status.as_u16(), message));
        }
        trace!("🌐️ Gateway query successful. {status}");
        let envelope = response.json::<GatewayResponse>().await.map_err(|e| GatewayError::JsonError(e.to_string()))?;
        match envelope.data {
            Some(tx) => Ok(tx),
            None => {
                let message = envelope.error.or(envelope.message).unwrap_or_else(|| "empty response".to_string());
                match envelope.status {
                    Some(code) if code >= 400 => Err(GatewayError::from_status(code, message)),
                    _ => Err(GatewayError::Unknown(message)),
                }
            },
        }
    }

    async fn post_transaction(&self, request: &CreateTransactionRequest) -> Result<GatewayTransaction, GatewayError> {
        self.rest_query(Method::POST, "", Some(request)).await
    }
}

#[async_trait]
impl PaymentGateway for GatewayApi {
    async fn create_transaction(&self, request: &CreateTransactionRequest) -> Result<GatewayTransaction, GatewayError> {
        let mut request = request.clone();
        request.items = request.items_or_default();
        info!(
            "🌐️ Creating {} transaction for order {} of {}",
            request.payment_method,
            request.order_number(),
            request.amount
        );
        let label = format!("Create transaction for {}", request.order_number());
        let tx = with_backoff(&self.config.retry, &label, || self.post_transaction(&request)).await?;
        info!("🌐️ Transaction {} created for order {} with status {}", tx.id, request.order_number(), tx.status);
        Ok(tx)
    }

    async fn get_transaction_status(&self, external_id: &str) -> Result<GatewayTransaction, GatewayError> {
        let path = format!("/{external_id}");
        debug!("🌐️ Fetching status of transaction {external_id}");
        let tx = self.rest_query::<()>(Method::GET, &path, None).await?;
        debug!("🌐️ Transaction {external_id} has status {}", tx.status);
        Ok(tx)
    }

    async fn refund_transaction(
        &self,
        external_id: &str,
        amount: Option<Cents>,
    ) -> Result<GatewayTransaction, GatewayError> {
        let path = format!("/{external_id}/refund");
        let body = match amount {
            Some(amount) => json!({ "amount": amount }),
            None => json!({}),
        };
        info!("🌐️ Requesting refund for transaction {external_id}");
        let tx = self.rest_query(Method::POST, &path, Some(&body)).await?;
        info!("🌐️ Refund for transaction {external_id} returned status {}", tx.status);
        Ok(tx)
    }
}
