//! Account types.

use serde::Deserialize;

/// One element of `GET /v1/accounts`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEnvelope {
    /// The account itself.
    pub securities_account: SecuritiesAccount,
}

/// A brokerage account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritiesAccount {
    /// Account id.
    pub account_id: String,
    /// Account type (`"CASH"`, `"MARGIN"`).
    #[serde(default, rename = "type")]
    pub account_type: Option<String>,
    /// Balances at the start of the day.
    #[serde(default)]
    pub initial_balances: Option<InitialBalances>,
    /// Open positions, present when requested with `fields=positions`.
    #[serde(default)]
    pub positions: Vec<Position>,
}

/// Start-of-day balances.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialBalances {
    /// Total cash.
    #[serde(default)]
    pub total_cash: f64,
    /// Cash available for trading.
    #[serde(default)]
    pub cash_available_for_trading: Option<f64>,
    /// Liquidation value.
    #[serde(default)]
    pub liquidation_value: Option<f64>,
}

/// An open position.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Long quantity.
    #[serde(default)]
    pub long_quantity: f64,
    /// Short quantity.
    #[serde(default)]
    pub short_quantity: f64,
    /// Average cost.
    #[serde(default)]
    pub average_price: f64,
    /// Current market value.
    #[serde(default)]
    pub market_value: f64,
    /// The instrument held.
    pub instrument: Instrument,
}

/// A tradable instrument.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    /// Ticker symbol.
    pub symbol: String,
    /// Asset type (`"EQUITY"`, `"OPTION"`, ...).
    #[serde(default)]
    pub asset_type: Option<String>,
    /// CUSIP, when present.
    #[serde(default)]
    pub cusip: Option<String>,
}
