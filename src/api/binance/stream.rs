//! Classifier for Binance combined-stream frames.
//!
//! A combined stream multiplexes every subscribed channel over one socket as
//! `{"stream":"<name>","data":<payload>}` and the payload schema depends on
//! the channel. Frames carry no type tag before the payload, so the channel is
//! recognised by sniffing a fixed-size prefix of the raw bytes and the frame
//! is then decoded with the schema that channel implies.

use std::borrow::Cow;

use serde::Deserialize;

use super::types::{RawAggTrade, RawTicker24};
use crate::api::error::ClassificationError;

/// Number of leading bytes inspected to recognise a frame
pub const INSPECTION_WINDOW: usize = 40;

const ALL_MARKET_TICKER_PREFIX: &[u8] = br#"{"stream":"!ticker@arr""#;
const AGG_TRADE_MARKER: &[u8] = b"@aggTrade";
const STREAM_FIELD_PREFIX: &[u8] = br#"{"stream":""#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    AllMarketTicker,
    AggTrade,
    UnknownChannel,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::AllMarketTicker => "all-market ticker",
            StreamKind::AggTrade => "aggregated trade",
            StreamKind::UnknownChannel => "unknown channel",
        }
    }
}

/// Decoded payload; exactly one variant per frame
#[derive(Debug, Clone)]
pub enum StreamPayload {
    AllMarketTicker(Vec<RawTicker24>),
    AggTrade(RawAggTrade),
    /// Channel without a typed decoder, kept as untyped JSON
    UnknownChannel(serde_json::Value),
}

/// One classified frame
#[derive(Debug, Clone)]
pub struct StreamEnvelope {
    pub stream: String,
    pub payload: StreamPayload,
    /// The frame exactly as received
    pub raw: Vec<u8>,
}

impl StreamEnvelope {
    pub fn kind(&self) -> StreamKind {
        match self.payload {
            StreamPayload::AllMarketTicker(_) => StreamKind::AllMarketTicker,
            StreamPayload::AggTrade(_) => StreamKind::AggTrade,
            StreamPayload::UnknownChannel(_) => StreamKind::UnknownChannel,
        }
    }

    pub fn raw_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    stream: String,
    data: T,
}

type Decoder = fn(&[u8]) -> Result<(String, StreamPayload), serde_json::Error>;

/// A prefix predicate paired with the decoder it selects
pub(crate) struct ClassifierRule {
    pub(crate) kind: StreamKind,
    matches: fn(&[u8]) -> bool,
    decode: Decoder,
}

/// Evaluated in order, first match wins. The all-market ticker rule must come
/// before the generic stream rule, which every combined frame satisfies.
pub(crate) const RULES: &[ClassifierRule] = &[
    ClassifierRule {
        kind: StreamKind::AllMarketTicker,
        matches: is_all_market_ticker,
        decode: decode_all_market_ticker,
    },
    ClassifierRule {
        kind: StreamKind::AggTrade,
        matches: is_agg_trade,
        decode: decode_agg_trade,
    },
    ClassifierRule {
        kind: StreamKind::UnknownChannel,
        matches: is_stream_envelope,
        decode: decode_untyped,
    },
];

fn is_all_market_ticker(prefix: &[u8]) -> bool {
    prefix.starts_with(ALL_MARKET_TICKER_PREFIX)
}

fn is_agg_trade(prefix: &[u8]) -> bool {
    contains(prefix, AGG_TRADE_MARKER)
}

fn is_stream_envelope(prefix: &[u8]) -> bool {
    prefix.starts_with(STREAM_FIELD_PREFIX)
}

fn decode_all_market_ticker(frame: &[u8]) -> Result<(String, StreamPayload), serde_json::Error> {
    let envelope: Envelope<Vec<RawTicker24>> = serde_json::from_slice(frame)?;
    Ok((envelope.stream, StreamPayload::AllMarketTicker(envelope.data)))
}

fn decode_agg_trade(frame: &[u8]) -> Result<(String, StreamPayload), serde_json::Error> {
    let envelope: Envelope<RawAggTrade> = serde_json::from_slice(frame)?;
    Ok((envelope.stream, StreamPayload::AggTrade(envelope.data)))
}

fn decode_untyped(frame: &[u8]) -> Result<(String, StreamPayload), serde_json::Error> {
    let envelope: Envelope<serde_json::Value> = serde_json::from_slice(frame)?;
    Ok((envelope.stream, StreamPayload::UnknownChannel(envelope.data)))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Classify and decode one combined-stream frame.
///
/// Frames shorter than [`INSPECTION_WINDOW`] are rejected. A frame whose
/// prefix selects a typed channel but whose payload does not fit that schema
/// is an error; it is never downgraded to [`StreamKind::UnknownChannel`].
pub fn classify(frame: &[u8]) -> Result<StreamEnvelope, ClassificationError> {
    if frame.len() < INSPECTION_WINDOW {
        return Err(ClassificationError::Truncated {
            len: frame.len(),
            window: INSPECTION_WINDOW,
        });
    }
    let prefix = &frame[..INSPECTION_WINDOW];

    let rule = RULES
        .iter()
        .find(|rule| (rule.matches)(prefix))
        .ok_or(ClassificationError::UnrecognizedFrame)?;

    let (stream, payload) =
        (rule.decode)(frame).map_err(|source| ClassificationError::MalformedPayload {
            kind: rule.kind.as_str(),
            source,
        })?;

    Ok(StreamEnvelope {
        stream,
        payload,
        raw: frame.to_vec(),
    })
}

/// Channel implied by a stream name, for connections where the name is known
/// up front
pub fn kind_of_stream(stream: &str) -> StreamKind {
    if stream == "!ticker@arr" {
        StreamKind::AllMarketTicker
    } else if stream.ends_with("@aggTrade") {
        StreamKind::AggTrade
    } else {
        StreamKind::UnknownChannel
    }
}

/// Decode a frame from a single-stream connection (`/ws/<stream>`).
///
/// These frames are the bare payload with no envelope, so the schema comes from
/// the subscribed stream name rather than from the frame prefix. The same
/// no-downgrade rule applies.
pub fn decode_single(stream: &str, frame: &[u8]) -> Result<StreamEnvelope, ClassificationError> {
    let kind = kind_of_stream(stream);
    let payload = match kind {
        StreamKind::AllMarketTicker => serde_json::from_slice(frame).map(StreamPayload::AllMarketTicker),
        StreamKind::AggTrade => serde_json::from_slice(frame).map(StreamPayload::AggTrade),
        StreamKind::UnknownChannel => serde_json::from_slice(frame).map(StreamPayload::UnknownChannel),
    }
    .map_err(|source| ClassificationError::MalformedPayload {
        kind: kind.as_str(),
        source,
    })?;

    Ok(StreamEnvelope {
        stream: stream.to_string(),
        payload,
        raw: frame.to_vec(),
    })
}
