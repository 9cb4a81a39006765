use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One normalized account ledger entry.
///
/// `ledger_id` is the exchange-assigned identity: two entries with the same
/// ID describe the same event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub ledger_id: String,
    pub reference_id: String,
    pub timestamp: DateTime<Utc>,
    pub entry_type: String,
    pub asset_class: String,
    pub asset: String, // normalized, e.g. "BTC"
    pub amount: f64,
    pub fee: f64,
    pub balance: f64,
}
