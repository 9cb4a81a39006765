use serde::{Deserialize, Serialize};
use serde_json::Number;

/// 24hr ticker statistics as sent on `!ticker@arr` and `<symbol>@ticker`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTicker24 {
    #[serde(rename = "e")]
    pub event_type: String,

    /// Event time (Unix milliseconds)
    #[serde(rename = "E")]
    pub event_time: Number,

    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "p")]
    pub price_change: String,

    #[serde(rename = "P")]
    pub price_change_percent: String,

    #[serde(rename = "w")]
    pub weighted_average_price: String,

    #[serde(rename = "x", default)]
    pub previous_day_close: Option<String>,

    #[serde(rename = "c")]
    pub current_day_close: String,

    #[serde(rename = "Q", default)]
    pub close_trade_quantity: Option<String>,

    #[serde(rename = "b")]
    pub bid: String,

    #[serde(rename = "B", default)]
    pub bid_quantity: Option<String>,

    #[serde(rename = "a")]
    pub ask: String,

    #[serde(rename = "A", default)]
    pub ask_quantity: Option<String>,

    #[serde(rename = "o")]
    pub open_price: String,

    #[serde(rename = "h")]
    pub high_price: String,

    #[serde(rename = "l")]
    pub low_price: String,

    /// Total traded base asset volume
    #[serde(rename = "v")]
    pub total_base_volume: String,

    /// Total traded quote asset volume
    #[serde(rename = "q")]
    pub total_quote_volume: String,

    #[serde(rename = "O")]
    pub stats_open_time: i64,

    #[serde(rename = "C")]
    pub stats_close_time: i64,

    #[serde(rename = "F")]
    pub first_trade_id: i64,

    #[serde(rename = "L")]
    pub last_trade_id: i64,

    #[serde(rename = "n")]
    pub total_number_trades: i64,
}

/// Aggregated trade as sent on `<symbol>@aggTrade`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAggTrade {
    #[serde(rename = "e")]
    pub event_type: String,

    #[serde(rename = "E")]
    pub event_time: Number,

    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "a")]
    pub agg_trade_id: i64,

    #[serde(rename = "p")]
    pub price: String,

    #[serde(rename = "q")]
    pub quantity: String,

    #[serde(rename = "f")]
    pub first_trade_id: i64,

    #[serde(rename = "l")]
    pub last_trade_id: i64,

    /// Trade time (Unix milliseconds)
    #[serde(rename = "T")]
    pub trade_time: Number,

    #[serde(rename = "m")]
    pub buyer_maker: bool,

    #[serde(rename = "M", default)]
    pub ignore: bool,
}
