//! Account endpoints.

use std::collections::HashMap;

use crate::client::TdaClient;
use crate::constants::ACCOUNTS_PATH;
use crate::error::Result;
use crate::types::accounts::*;

impl TdaClient {
    /// Retrieve every linked account with its positions.
    ///
    /// **Endpoint:** `GET /v1/accounts?fields=positions`
    pub async fn get_accounts(&self) -> Result<Vec<SecuritiesAccount>> {
        let envelopes: Vec<AccountEnvelope> = self
            .get_with_query(ACCOUNTS_PATH, &[("fields", "positions")])
            .await?;
        Ok(envelopes.into_iter().map(|e| e.securities_account).collect())
    }

    /// Start-of-day total cash per account id.
    ///
    /// Accounts without initial balances are left out.
    pub async fn get_available_cash_balances(&self) -> Result<HashMap<String, f64>> {
        let accounts = self.get_accounts().await?;
        Ok(accounts
            .into_iter()
            .filter_map(|a| {
                let cash = a.initial_balances.as_ref()?.total_cash;
                Some((a.account_id, cash))
            })
            .collect())
    }
}
