//! A `mockall` double of the payment processor, shared by the engine and server test suites.
use async_trait::async_trait;
use gateway_client::{CreateTransactionRequest, GatewayError, GatewayTransaction, PaymentGateway};
use mockall::mock;
use spg_common::Cents;

mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn create_transaction(&self, request: &CreateTransactionRequest) -> Result<GatewayTransaction, GatewayError>;
        async fn get_transaction_status(&self, external_id: &str) -> Result<GatewayTransaction, GatewayError>;
        async fn refund_transaction(
            &self,
            external_id: &str,
            amount: Option<Cents>,
        ) -> Result<GatewayTransaction, GatewayError>;
    }
}
