use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Kraken API response wrapper: errors are reported in-band
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KrakenResponse<T> {
    #[serde(default)]
    pub error: Vec<String>,
    pub result: Option<T>,
}

/// Result of `/0/private/Ledgers`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerResult {
    #[serde(default)]
    pub count: i64,
    /// Ledger ID -> entry
    #[serde(default)]
    pub ledger: HashMap<String, RawLedgerEntry>,
}

pub type RawLedgerResponse = KrakenResponse<LedgerResult>;

/// Kraken ledger entry as sent on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLedgerEntry {
    /// Reference ID of the trade, deposit, etc. that produced this entry
    pub refid: String,

    /// Fractional seconds since the epoch
    pub time: Number,

    /// "trade", "deposit", "withdrawal", "transfer", "margin", ...
    #[serde(rename = "type")]
    pub entry_type: String,

    /// Asset class, usually "currency"
    pub aclass: String,

    /// Kraken asset code (e.g. "XXBT", "ZUSD")
    pub asset: String,

    pub amount: String,
    pub fee: String,
    pub balance: String,
}
