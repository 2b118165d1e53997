//! Order placement types.

use serde::Serialize;

/// Body of `POST /v1/accounts/{accountId}/orders`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// `"LIMIT"`, `"MARKET"`, ...
    pub order_type: String,
    /// `"NORMAL"` for the regular session.
    pub session: String,
    /// Limit price, as a decimal string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    /// `"DAY"`, `"GOOD_TILL_CANCEL"`, ...
    pub duration: String,
    /// `"SINGLE"` for a one-leg order.
    pub order_strategy_type: String,
    /// Order legs.
    pub order_leg_collection: Vec<OrderLeg>,
}

impl OrderRequest {
    /// Day limit order buying `quantity` shares of `symbol` at `price`.
    pub fn equity_limit_buy(symbol: impl Into<String>, price: f64, quantity: u32) -> Self {
        Self {
            order_type: "LIMIT".into(),
            session: "NORMAL".into(),
            price: Some(price.to_string()),
            duration: "DAY".into(),
            order_strategy_type: "SINGLE".into(),
            order_leg_collection: vec![OrderLeg {
                instruction: "BUY".into(),
                quantity,
                instrument: OrderInstrument {
                    symbol: symbol.into(),
                    asset_type: "EQUITY".into(),
                },
            }],
        }
    }
}

/// A single leg of an order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLeg {
    /// `"BUY"`, `"SELL"`, ...
    pub instruction: String,
    /// Share count.
    pub quantity: u32,
    /// What to trade.
    pub instrument: OrderInstrument,
}

/// Instrument reference in an order leg.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderInstrument {
    /// Ticker symbol.
    pub symbol: String,
    /// `"EQUITY"`, `"OPTION"`, ...
    pub asset_type: String,
}
