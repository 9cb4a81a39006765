//! Exhaustive ledger download.
//!
//! Kraken returns the ledger newest-first in pages bounded by an `end`
//! timestamp. Pages overlap, may repeat entries already delivered and are
//! interrupted by in-band rate-limit errors. [`LedgerService::fetch`] walks
//! the cursor backward until a page is empty, a page adds nothing new, or
//! the requested number of entries has been collected.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::mapper::map_ledger_entry;
use super::types::{RawLedgerEntry, RawLedgerResponse};
use crate::api::client::{HttpMethod, Params, Transport, TransportResponse};
use crate::api::error::{ApiError, FieldDecodeError};
use crate::config::LedgerConfig;
use crate::models::LedgerEntry;

pub const LEDGER_ENDPOINT: &str = "/0/private/Ledgers";

/// In-band error Kraken reports when the API call budget is exhausted
pub const RATE_LIMIT_SENTINEL: &str = "EAPI:Rate limit exceeded";

/// What to do with a ledger record whose fields fail to parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodePolicy {
    /// Drop the record, log it and report it in [`LedgerFetch::rejected`]
    #[default]
    Skip,
    /// Fail the whole fetch
    Abort,
}

#[derive(Debug, Clone, Default)]
pub struct LedgerOptions {
    /// Keep only the most recent `count` entries; 0 fetches everything
    pub count: usize,
    /// Server-side filter on entry type (e.g. "trade", "deposit")
    pub entry_type: Option<String>,
    /// Server-side filter on Kraken asset code (e.g. "XXBT")
    pub asset: Option<String>,
    pub decode_policy: DecodePolicy,
}

/// Outcome of a completed fetch
#[derive(Debug, Clone, Default)]
pub struct LedgerFetch {
    /// Deduplicated, ascending by timestamp
    pub entries: Vec<LedgerEntry>,
    /// Pages successfully received, including the final empty one
    pub pages: u32,
    pub rate_limit_waits: u32,
    /// One per ledger ID, in the order first seen
    pub rejected: Vec<RejectedEntry>,
}

/// A ledger record dropped under [`DecodePolicy::Skip`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEntry {
    pub ledger_id: String,
    pub error: FieldDecodeError,
}

/// Pagination state, owned by exactly one fetch
#[derive(Debug, Default)]
struct LedgerCursor {
    /// Earliest timestamp held so far; the next page ends before it
    end: Option<DateTime<Utc>>,
    last_count: usize,
}

impl LedgerCursor {
    fn params(&self, options: &LedgerOptions) -> Params {
        let mut params = Params::new();
        // The endpoint's `end` is inclusive at whole-second resolution.
        if let Some(end) = self.end {
            params.insert("end".to_string(), (end.timestamp() + 1).to_string());
        }
        if let Some(entry_type) = &options.entry_type {
            params.insert("type".to_string(), entry_type.clone());
        }
        if let Some(asset) = &options.asset {
            params.insert("asset".to_string(), asset.clone());
        }
        params
    }
}

enum Page {
    Entries(Vec<(String, RawLedgerEntry)>),
    RateLimited,
}

/// Sort ascending by timestamp and keep one entry per ledger ID.
///
/// Ties on timestamp are ordered by ledger ID so the result does not depend
/// on input order. Applying it twice changes nothing.
pub fn dedupe(entries: &mut Vec<LedgerEntry>) {
    entries.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.ledger_id.cmp(&b.ledger_id))
    });

    let mut seen = HashSet::with_capacity(entries.len());
    entries.retain(|entry| seen.insert(entry.ledger_id.clone()));
}

pub struct LedgerService<T: Transport> {
    transport: T,
    config: LedgerConfig,
}

impl<T: Transport> LedgerService<T> {
    pub fn new(transport: T, config: LedgerConfig) -> Self {
        Self { transport, config }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch the ledger, returning only the entries
    pub async fn ledger(&self, options: &LedgerOptions) -> Result<Vec<LedgerEntry>, ApiError> {
        let fetch = self.fetch(options, &CancellationToken::new()).await?;
        Ok(fetch.entries)
    }

    /// Walk the ledger backward until convergence.
    ///
    /// Only the in-band rate-limit error is retried, after a fixed backoff and
    /// with the same cursor. Every other failure ends the fetch and no partial
    /// result is returned.
    pub async fn fetch(
        &self,
        options: &LedgerOptions,
        cancel: &CancellationToken,
    ) -> Result<LedgerFetch, ApiError> {
        let mut cursor = LedgerCursor::default();
        let mut fetch = LedgerFetch::default();
        let mut consecutive_waits = 0u32;
        let mut rejected_ids = HashSet::new();

        loop {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }

            let params = cursor.params(options);
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                response = self.transport.send(HttpMethod::Post, LEDGER_ENDPOINT, &params) => response?,
            };

            let page = match decode_page(&response)? {
                Page::RateLimited => {
                    if let Some(max) = self.config.max_rate_limit_retries {
                        if consecutive_waits >= max {
                            return Err(ApiError::RateLimitError(format!(
                                "{} after {} retries",
                                RATE_LIMIT_SENTINEL, consecutive_waits
                            )));
                        }
                    }
                    consecutive_waits += 1;
                    fetch.rate_limit_waits += 1;

                    let backoff = self.config.backoff();
                    log::warn!(
                        "{} rate limit exceeded, sleeping for {:?}",
                        self.transport.exchange_name(),
                        backoff
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    continue;
                }
                Page::Entries(page) => page,
            };

            consecutive_waits = 0;
            fetch.pages += 1;
            log::debug!(
                "ledger page {}: {} entries, end={:?}",
                fetch.pages,
                page.len(),
                params.get("end")
            );

            if page.is_empty() {
                break;
            }

            for (ledger_id, raw) in &page {
                match map_ledger_entry(ledger_id, raw) {
                    Ok(entry) => fetch.entries.push(entry),
                    Err(e) => match options.decode_policy {
                        DecodePolicy::Abort => return Err(e.into()),
                        // Overlapping pages return the same bad record again.
                        DecodePolicy::Skip => {
                            if rejected_ids.insert(ledger_id.clone()) {
                                log::warn!("Skipping ledger entry {}: {}", ledger_id, e);
                                fetch.rejected.push(RejectedEntry {
                                    ledger_id: ledger_id.clone(),
                                    error: e,
                                });
                            }
                        }
                    },
                }
            }

            dedupe(&mut fetch.entries);

            // Nothing new: the exchange is repeating entries we already hold.
            if fetch.entries.len() == cursor.last_count {
                break;
            }
            cursor.last_count = fetch.entries.len();

            if options.count > 0 && fetch.entries.len() >= options.count {
                let excess = fetch.entries.len() - options.count;
                fetch.entries.drain(..excess);
                break;
            }

            cursor.end = Some(fetch.entries[0].timestamp);
        }

        Ok(fetch)
    }
}

fn decode_page(response: &TransportResponse) -> Result<Page, ApiError> {
    let decoded: RawLedgerResponse = match serde_json::from_str(&response.body) {
        Ok(decoded) => decoded,
        Err(_) if !response.is_success() => {
            return Err(ApiError::TransportError(format!(
                "HTTP {} - Body: {}",
                response.status, response.body
            )));
        }
        Err(e) => {
            return Err(ApiError::ParseError(format!(
                "Failed to parse ledger response: {} - Body: {}",
                e, response.body
            )));
        }
    };

    if let Some(first) = decoded.error.first() {
        if first == RATE_LIMIT_SENTINEL {
            return Ok(Page::RateLimited);
        }
        return Err(ApiError::ExchangeError(first.clone()));
    }

    if !response.is_success() {
        return Err(ApiError::TransportError(format!("HTTP {}", response.status)));
    }

    let result = decoded
        .result
        .ok_or_else(|| ApiError::ParseError("Response result is empty".to_string()))?;
    Ok(Page::Entries(result.ledger.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    const BASE_TIME: i64 = 1_609_459_200;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Replays canned responses and records the parameters of every call.
    /// Once the script runs out it answers with empty pages.
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<TransportResponse, ApiError>>>,
        calls: Mutex<Vec<Params>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<TransportResponse, ApiError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Params> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn exchange_name(&self) -> &str {
            "scripted"
        }

        async fn send(
            &self,
            method: HttpMethod,
            path: &str,
            params: &Params,
        ) -> Result<TransportResponse, ApiError> {
            assert_eq!(method, HttpMethod::Post);
            assert_eq!(path, LEDGER_ENDPOINT);
            self.calls.lock().unwrap().push(params.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(page(&[])))
        }
    }

    /// One ledger record, `offset` seconds after BASE_TIME
    fn record(id: &str, offset: i64, amount: &str) -> String {
        format!(
            r#""{}":{{"refid":"R-{}","time":{}.25,"type":"trade","aclass":"currency",
                "asset":"XXBT","amount":"{}","fee":"0.001","balance":"10.0"}}"#,
            id,
            id,
            BASE_TIME + offset,
            amount
        )
    }

    fn page_of(records: &[String]) -> TransportResponse {
        TransportResponse::ok(format!(
            r#"{{"error":[],"result":{{"count":{},"ledger":{{{}}}}}}}"#,
            records.len(),
            records.join(",")
        ))
    }

    /// A page of entries given as (ledger id, seconds after BASE_TIME)
    fn page(entries: &[(&str, i64)]) -> TransportResponse {
        let records: Vec<String> = entries
            .iter()
            .map(|(id, offset)| record(id, *offset, "0.5"))
            .collect();
        page_of(&records)
    }

    fn rate_limited() -> TransportResponse {
        TransportResponse::ok(format!(r#"{{"error":["{}"]}}"#, RATE_LIMIT_SENTINEL))
    }

    fn service(responses: Vec<Result<TransportResponse, ApiError>>) -> LedgerService<ScriptedTransport> {
        init_logging();
        LedgerService::new(ScriptedTransport::new(responses), LedgerConfig::default())
    }

    fn ids(entries: &[LedgerEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.ledger_id.as_str()).collect()
    }

    fn entry(id: &str, offset: i64) -> LedgerEntry {
        LedgerEntry {
            ledger_id: id.to_string(),
            reference_id: String::new(),
            timestamp: DateTime::from_timestamp(BASE_TIME + offset, 0).unwrap(),
            entry_type: "trade".to_string(),
            asset_class: "currency".to_string(),
            asset: "BTC".to_string(),
            amount: 1.0,
            fee: 0.0,
            balance: 1.0,
        }
    }

    #[tokio::test]
    async fn test_walks_backward_until_empty_page() {
        let svc = service(vec![
            Ok(page(&[("L9", 90), ("L8", 80)])),
            Ok(page(&[("L7", 70), ("L6", 60)])),
            Ok(page(&[("L5", 50), ("L4", 40)])),
            Ok(page(&[])),
        ]);

        let fetch = svc.fetch(&LedgerOptions::default(), &CancellationToken::new()).await.unwrap();

        // k non-empty pages take k + 1 calls
        let calls = svc.transport().calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(fetch.pages, 4);
        assert_eq!(ids(&fetch.entries), vec!["L4", "L5", "L6", "L7", "L8", "L9"]);

        assert!(!calls[0].contains_key("end"));
        assert_eq!(calls[1]["end"], (BASE_TIME + 80 + 1).to_string());
        assert_eq!(calls[2]["end"], (BASE_TIME + 60 + 1).to_string());
        assert_eq!(calls[3]["end"], (BASE_TIME + 40 + 1).to_string());
    }

    #[tokio::test]
    async fn test_overlapping_pages_are_deduplicated() {
        let svc = service(vec![
            Ok(page(&[("L5", 50), ("L4", 40), ("L3", 30)])),
            Ok(page(&[("L3", 30), ("L2", 20), ("L1", 10)])),
            Ok(page(&[])),
        ]);

        let entries = svc.ledger(&LedgerOptions::default()).await.unwrap();
        assert_eq!(ids(&entries), vec!["L1", "L2", "L3", "L4", "L5"]);
    }

    #[tokio::test]
    async fn test_stalled_pagination_converges() {
        // An exchange that ignores the cursor keeps sending the same page.
        let svc = service(vec![
            Ok(page(&[("L2", 20), ("L1", 10)])),
            Ok(page(&[("L2", 20), ("L1", 10)])),
            Ok(page(&[("L2", 20), ("L1", 10)])),
        ]);

        let entries = svc.ledger(&LedgerOptions::default()).await.unwrap();
        assert_eq!(ids(&entries), vec!["L1", "L2"]);
        assert_eq!(svc.transport().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_count_keeps_most_recent_entries_ascending() {
        let twelve: Vec<(String, i64)> = (1..=12).map(|i| (format!("L{:02}", i), i * 10)).collect();
        let refs: Vec<(&str, i64)> = twelve.iter().map(|(id, t)| (id.as_str(), *t)).collect();
        let svc = service(vec![Ok(page(&refs))]);

        let options = LedgerOptions {
            count: 5,
            ..Default::default()
        };
        let entries = svc.ledger(&options).await.unwrap();

        assert_eq!(ids(&entries), vec!["L08", "L09", "L10", "L11", "L12"]);
        assert_eq!(svc.transport().calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retried_with_same_cursor() {
        let svc = service(vec![
            Ok(page(&[("L4", 40), ("L3", 30)])),
            Ok(rate_limited()),
            Ok(rate_limited()),
            Ok(page(&[("L2", 20), ("L1", 10)])),
            Ok(page(&[])),
        ]);

        let start = tokio::time::Instant::now();
        let fetch = svc.fetch(&LedgerOptions::default(), &CancellationToken::new()).await.unwrap();
        let waited = start.elapsed();

        assert_eq!(fetch.rate_limit_waits, 2);
        assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(15));
        assert_eq!(ids(&fetch.entries), vec!["L1", "L2", "L3", "L4"]);
        assert_eq!(fetch.pages, 3);

        let calls = svc.transport().calls();
        assert_eq!(calls.len(), 5);
        let expected_end = (BASE_TIME + 30 + 1).to_string();
        for call in &calls[1..4] {
            assert_eq!(call["end"], expected_end);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_cap_gives_up() {
        init_logging();
        let transport = ScriptedTransport::new(vec![Ok(rate_limited()), Ok(rate_limited())]);
        let config = LedgerConfig {
            max_rate_limit_retries: Some(1),
            ..Default::default()
        };
        let svc = LedgerService::new(transport, config);

        let err = svc.ledger(&LedgerOptions::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimitError(_)));
        assert_eq!(svc.transport().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_exchange_error_is_terminal() {
        let svc = service(vec![
            Ok(page(&[("L2", 20)])),
            Ok(TransportResponse::ok(r#"{"error":["EGeneral:Invalid arguments"]}"#)),
        ]);

        let err = svc.ledger(&LedgerOptions::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::ExchangeError(ref msg) if msg == "EGeneral:Invalid arguments"));
        assert_eq!(svc.transport().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_response_is_not_retried() {
        let svc = service(vec![Ok(TransportResponse::ok("<html>oops</html>"))]);

        let err = svc.ledger(&LedgerOptions::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::ParseError(_)));
        assert_eq!(svc.transport().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_http_failure_without_json_is_transport_error() {
        let svc = service(vec![Ok(TransportResponse {
            status: 502,
            body: "Bad Gateway".to_string(),
        })]);

        let err = svc.ledger(&LedgerOptions::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::TransportError(_)));
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let svc = service(vec![Err(ApiError::TransportError("connection reset".to_string()))]);

        let err = svc.ledger(&LedgerOptions::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::TransportError(ref msg) if msg == "connection reset"));
    }

    #[tokio::test]
    async fn test_filters_are_sent_on_every_page() {
        let svc = service(vec![Ok(page(&[("L1", 10)])), Ok(page(&[]))]);
        let options = LedgerOptions {
            entry_type: Some("deposit".to_string()),
            asset: Some("XXBT".to_string()),
            ..Default::default()
        };

        svc.ledger(&options).await.unwrap();

        for call in svc.transport().calls() {
            assert_eq!(call["type"], "deposit");
            assert_eq!(call["asset"], "XXBT");
        }
    }

    fn page_with_bad_amount() -> TransportResponse {
        TransportResponse::ok(format!(
            r#"{{"error":[],"result":{{"count":2,"ledger":{{
                "GOOD":{{"refid":"R1","time":{t},"type":"trade","aclass":"currency","asset":"ZUSD",
                        "amount":"12.5","fee":"0.0","balance":"100.0"}},
                "BAD":{{"refid":"R2","time":{t},"type":"trade","aclass":"currency","asset":"ZUSD",
                       "amount":"12,5","fee":"0.0","balance":"100.0"}}}}}}}}"#,
            t = BASE_TIME
        ))
    }

    #[tokio::test]
    async fn test_undecodable_record_skipped_and_reported() {
        let svc = service(vec![Ok(page_with_bad_amount()), Ok(page(&[]))]);

        let fetch = svc.fetch(&LedgerOptions::default(), &CancellationToken::new()).await.unwrap();
        assert_eq!(ids(&fetch.entries), vec!["GOOD"]);
        assert_eq!(fetch.entries[0].asset, "USD");
        assert_eq!(fetch.rejected.len(), 1);
        assert_eq!(fetch.rejected[0].ledger_id, "BAD");
        assert_eq!(fetch.rejected[0].error.field, "amount");
        assert_eq!(fetch.rejected[0].error.raw_value, "12,5");
    }

    #[tokio::test]
    async fn test_bad_record_on_overlapping_pages_reported_once() {
        let svc = service(vec![
            Ok(page_of(&[
                record("L5", 50, "0.5"),
                record("L4", 40, "0.5"),
                record("BAD", 40, "12,5"),
            ])),
            Ok(page_of(&[
                record("L4", 40, "0.5"),
                record("BAD", 40, "12,5"),
                record("L3", 30, "0.5"),
            ])),
            Ok(page(&[])),
        ]);

        let fetch = svc.fetch(&LedgerOptions::default(), &CancellationToken::new()).await.unwrap();

        assert_eq!(ids(&fetch.entries), vec!["L3", "L4", "L5"]);
        assert_eq!(svc.transport().calls().len(), 3);
        assert_eq!(fetch.rejected.len(), 1);
        assert_eq!(fetch.rejected[0].ledger_id, "BAD");
        assert_eq!(fetch.rejected[0].error.field, "amount");
    }

    #[tokio::test]
    async fn test_undecodable_record_aborts_when_requested() {
        let svc = service(vec![Ok(page_with_bad_amount())]);
        let options = LedgerOptions {
            decode_policy: DecodePolicy::Abort,
            ..Default::default()
        };

        let err = svc.ledger(&options).await.unwrap_err();
        assert!(matches!(err, ApiError::FieldDecode(ref e) if e.field == "amount"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_sends_nothing() {
        let svc = service(vec![Ok(page(&[("L1", 10)]))]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = svc.fetch(&LedgerOptions::default(), &cancel).await.unwrap_err();
        assert!(matches!(err, ApiError::Cancelled));
        assert!(svc.transport().calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let svc = service(vec![Ok(rate_limited()), Ok(page(&[("L1", 10)]))]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        let err = svc.fetch(&LedgerOptions::default(), &cancel).await.unwrap_err();
        assert!(matches!(err, ApiError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(svc.transport().calls().len(), 1);
    }

    /// Never answers within the test's time frame
    struct HangingTransport;

    #[async_trait]
    impl Transport for HangingTransport {
        fn exchange_name(&self) -> &str {
            "hanging"
        }

        async fn send(
            &self,
            _method: HttpMethod,
            _path: &str,
            _params: &Params,
        ) -> Result<TransportResponse, ApiError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(page(&[]))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_request_in_flight() {
        init_logging();
        let svc = LedgerService::new(HangingTransport, LedgerConfig::default());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        let err = svc.fetch(&LedgerOptions::default(), &cancel).await.unwrap_err();
        assert!(matches!(err, ApiError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_dedupe_is_idempotent_and_ordered() {
        let mut entries = vec![
            entry("C", 30),
            entry("A", 10),
            entry("B", 10),
            entry("A", 10),
            entry("C", 30),
            entry("B", 10),
            entry("D", 5),
        ];

        dedupe(&mut entries);
        assert_eq!(ids(&entries), vec!["D", "A", "B", "C"]);

        let once = entries.clone();
        dedupe(&mut entries);
        assert_eq!(entries, once);
    }
}
