pub mod client;
pub mod ledger;
pub mod mapper;
pub mod types;

pub use client::KrakenClient;
pub use ledger::{dedupe, DecodePolicy, LedgerFetch, LedgerOptions, LedgerService, RejectedEntry};
