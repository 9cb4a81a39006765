use super::stream::{StreamEnvelope, StreamPayload};
use super::types::{RawAggTrade, RawTicker24};
use crate::api::error::FieldDecodeError;
use crate::api::normalize::{parse_decimal, parse_optional_decimal, timestamp_from_epoch_millis};
use crate::models::{AggTrade, StreamEvent, Ticker24};

/// Quote assets recognised when splitting a symbol, checked in order. The
/// four-letter codes come first so "BTCUSDT" splits on "USDT" and not on a
/// shorter code.
const QUOTE_ASSETS: &[&str] = &["USDT", "BUSD", "USDC", "TUSD", "BTC", "ETH", "BNB", "PAX"];

/// Map a Binance symbol (e.g. "ETHBTC") to "ETH/BTC".
///
/// Symbols without a known quote asset are returned unchanged.
pub fn normalize_symbol(symbol: &str) -> String {
    let upper = symbol.to_ascii_uppercase();
    QUOTE_ASSETS
        .iter()
        .find_map(|quote| {
            upper
                .strip_suffix(quote)
                .filter(|base| !base.is_empty())
                .map(|base| format!("{}/{}", base, quote))
        })
        .unwrap_or(upper)
}

/// Map a raw aggregated trade to an AggTrade
pub fn map_agg_trade(raw: &RawAggTrade) -> Result<AggTrade, FieldDecodeError> {
    let price = parse_decimal("price", &raw.price)?;
    let quantity = parse_decimal("quantity", &raw.quantity)?;

    Ok(AggTrade {
        timestamp: timestamp_from_epoch_millis("trade_time", &raw.trade_time)?,
        symbol: raw.symbol.clone(),
        pair: normalize_symbol(&raw.symbol),
        agg_trade_id: raw.agg_trade_id,
        price,
        quantity,
        quote_quantity: price * quantity,
        buyer_maker: raw.buyer_maker,
    })
}

/// Map a raw 24hr ticker to a Ticker24
pub fn map_ticker(raw: &RawTicker24) -> Result<Ticker24, FieldDecodeError> {
    Ok(Ticker24 {
        timestamp: timestamp_from_epoch_millis("event_time", &raw.event_time)?,
        symbol: raw.symbol.clone(),
        pair: normalize_symbol(&raw.symbol),
        open: parse_decimal("open", &raw.open_price)?,
        close: parse_decimal("close", &raw.current_day_close)?,
        previous_close: parse_optional_decimal("previous_close", raw.previous_day_close.as_deref())?,
        price_change: parse_decimal("price_change", &raw.price_change)?,
        price_change_pct: parse_decimal("price_change_pct", &raw.price_change_percent)?,
        low: parse_decimal("low", &raw.low_price)?,
        high: parse_decimal("high", &raw.high_price)?,
        base_volume: parse_decimal("base_volume", &raw.total_base_volume)?,
        quote_volume: parse_decimal("quote_volume", &raw.total_quote_volume)?,
        bid: parse_decimal("bid", &raw.bid)?,
        ask: parse_decimal("ask", &raw.ask)?,
    })
}

/// Map a classified frame to a StreamEvent.
///
/// A ticker array keeps every ticker that maps; bad entries are logged and
/// dropped. A trade frame fails as a whole.
pub fn map_stream_envelope(envelope: &StreamEnvelope) -> Result<StreamEvent, FieldDecodeError> {
    let stream = envelope.stream.clone();
    match &envelope.payload {
        StreamPayload::AllMarketTicker(raw) => {
            let tickers = raw
                .iter()
                .filter_map(|ticker| match map_ticker(ticker) {
                    Ok(ticker) => Some(ticker),
                    Err(e) => {
                        log::warn!("Dropping ticker {} on {}: {}", ticker.symbol, stream, e);
                        None
                    }
                })
                .collect();
            Ok(StreamEvent::Tickers { stream, tickers })
        }
        StreamPayload::AggTrade(raw) => Ok(StreamEvent::Trade {
            trade: map_agg_trade(raw)?,
            stream,
        }),
        StreamPayload::UnknownChannel(data) => Ok(StreamEvent::Other {
            stream,
            data: data.clone(),
        }),
    }
}
