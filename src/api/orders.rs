//! Order management endpoints.

use crate::client::TdaClient;
use crate::constants::ACCOUNTS_PATH;
use crate::error::Result;
use crate::types::orders::*;

impl TdaClient {
    /// Place an order and return its id.
    ///
    /// The API answers `201 Created` with no body; the id is the last
    /// segment of the `Location` header.
    ///
    /// **Endpoint:** `POST /v1/accounts/{accountId}/orders`
    pub async fn place_order(&self, account_id: &str, order: &OrderRequest) -> Result<String> {
        let order_id = self
            .post_for_location(&format!("{ACCOUNTS_PATH}/{account_id}/orders"), order)
            .await?;
        tracing::info!(account_id, order_id = %order_id, "order placed");
        Ok(order_id)
    }

    /// Place a day limit order buying `quantity` shares of `symbol`.
    pub async fn place_equity_limit_buy(
        &self,
        account_id: &str,
        symbol: &str,
        price: f64,
        quantity: u32,
    ) -> Result<String> {
        self.place_order(account_id, &OrderRequest::equity_limit_buy(symbol, price, quantity))
            .await
    }

    /// Replace a working order.
    ///
    /// **Endpoint:** `PUT /v1/accounts/{accountId}/orders/{orderId}`
    pub async fn replace_order(
        &self,
        account_id: &str,
        order_id: &str,
        order: &OrderRequest,
    ) -> Result<()> {
        self.put(&format!("{ACCOUNTS_PATH}/{account_id}/orders/{order_id}"), order)
            .await
    }

    /// Cancel a working order.
    ///
    /// **Endpoint:** `DELETE /v1/accounts/{accountId}/orders/{orderId}`
    pub async fn cancel_order(&self, account_id: &str, order_id: &str) -> Result<()> {
        self.delete_no_content(&format!("{ACCOUNTS_PATH}/{account_id}/orders/{order_id}"))
            .await
    }
}
