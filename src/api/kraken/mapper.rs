use super::types::RawLedgerEntry;
use crate::api::error::FieldDecodeError;
use crate::api::normalize::{parse_decimal, timestamp_from_epoch_seconds};
use crate::models::LedgerEntry;

/// Kraken pair prefixes and their canonical replacements, applied in order.
const PAIR_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("XXBTZ", "BTC/"),
    ("XETHZ", "ETH/"),
    ("XLTCZ", "LTC/"),
    ("XXMRZ", "XMR/"),
    ("XETCZ", "ETC/"),
    ("BCH", "BCH/"),
];

/// Kraken asset codes and their common names, applied in order.
const ASSET_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("XXBT", "BTC"),
    ("XLTC", "LTC"),
    ("XXMR", "XMR"),
    ("XETH", "ETH"),
    ("XZEC", "ZEC"),
    ("ZUSD", "USD"),
];

/// Map a Kraken pair name (e.g. "XXBTZUSD") to "BTC/USD".
pub fn normalize_pair_name(pair: &str) -> String {
    PAIR_SUBSTITUTIONS
        .iter()
        .fold(pair.to_string(), |name, (from, to)| name.replace(from, to))
}

/// Map a Kraken asset code (e.g. "XXBT") to its common name ("BTC").
pub fn normalize_asset_name(asset: &str) -> String {
    ASSET_SUBSTITUTIONS
        .iter()
        .fold(asset.to_string(), |name, (from, to)| name.replace(from, to))
}

/// Map a raw Kraken ledger entry, keyed by its ledger ID, to a LedgerEntry
pub fn map_ledger_entry(ledger_id: &str, raw: &RawLedgerEntry) -> Result<LedgerEntry, FieldDecodeError> {
    Ok(LedgerEntry {
        ledger_id: ledger_id.to_string(),
        reference_id: raw.refid.clone(),
        timestamp: timestamp_from_epoch_seconds("time", &raw.time)?,
        entry_type: raw.entry_type.clone(),
        asset_class: raw.aclass.clone(),
        asset: normalize_asset_name(&raw.asset),
        amount: parse_decimal("amount", &raw.amount)?,
        fee: parse_decimal("fee", &raw.fee)?,
        balance: parse_decimal("balance", &raw.balance)?,
    })
}
