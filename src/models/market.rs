use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregated trade from a market stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggTrade {
    pub timestamp: DateTime<Utc>,
    pub symbol: String, // exchange symbol, e.g. "BTCUSDT"
    pub pair: String,   // canonical "BASE/QUOTE" when the quote asset is known
    pub agg_trade_id: i64,
    pub price: f64,
    pub quantity: f64,
    /// price * quantity, computed once at normalization
    pub quote_quantity: f64,
    /// The buyer was the maker, so the aggressor sold.
    pub buyer_maker: bool,
}

impl AggTrade {
    pub fn is_buy(&self) -> bool {
        !self.buyer_maker
    }
}

/// Rolling 24 hour ticker statistics for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker24 {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub pair: String,
    pub open: f64,
    pub close: f64,
    /// Absent on some ticker channels
    pub previous_close: Option<f64>,
    pub price_change: f64,
    pub price_change_pct: f64,
    pub low: f64,
    pub high: f64,
    pub base_volume: f64,
    pub quote_volume: f64,
    pub bid: f64,
    pub ask: f64,
}

/// A normalized message from a multiplexed market stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Tickers { stream: String, tickers: Vec<Ticker24> },
    Trade { stream: String, trade: AggTrade },
    /// Channel this crate has no typed decoder for; payload passed through.
    Other { stream: String, data: serde_json::Value },
}

impl StreamEvent {
    pub fn stream(&self) -> &str {
        match self {
            StreamEvent::Tickers { stream, .. }
            | StreamEvent::Trade { stream, .. }
            | StreamEvent::Other { stream, .. } => stream,
        }
    }
}
