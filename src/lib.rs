//! Exchange API clients.
//!
//! - [`api::kraken`]: signed REST transport and a ledger fetcher that walks
//!   history backwards page by page, waits out the exchange rate limit and
//!   stops when pages run dry or stop adding entries.
//! - [`api::binance`]: combined-stream WebSocket client that recognises each
//!   frame's channel from its first bytes and decodes it accordingly.
//! - [`models`]: exchange-neutral records both produce.

pub mod api;
pub mod config;
pub mod models;

pub use api::ApiError;
pub use config::{ClientConfig, Credentials};
