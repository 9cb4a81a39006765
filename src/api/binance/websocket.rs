use std::ops::ControlFlow;

use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use super::mapper::map_stream_envelope;
use super::stream::{classify, decode_single};
use crate::api::error::{ClassificationError, FieldDecodeError};
use crate::config::BinanceConfig;
use crate::models::StreamEvent;

#[derive(Error, Debug)]
pub enum WebSocketError {
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("No streams to subscribe to")]
    NoStreams,
}

impl From<tokio_tungstenite::tungstenite::Error> for WebSocketError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        WebSocketError::ConnectionFailed(Box::new(error))
    }
}

/// Why a single frame produced no event. Never fatal to the connection.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Decode(#[from] FieldDecodeError),
}

/// Classify one combined-stream frame and normalize its payload
pub fn decode_frame(frame: &[u8]) -> Result<StreamEvent, FrameError> {
    let envelope = classify(frame)?;
    Ok(map_stream_envelope(&envelope)?)
}

/// Decode and normalize one frame from a single-stream connection
pub fn decode_single_frame(stream: &str, frame: &[u8]) -> Result<StreamEvent, FrameError> {
    let envelope = decode_single(stream, frame)?;
    Ok(map_stream_envelope(&envelope)?)
}

/// Per-connection counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub frames: u64,
    pub events: u64,
    pub classification_errors: u64,
    pub decode_errors: u64,
}

enum Subscription {
    /// `/stream?streams=a/b/c`, frames wrapped in a `{"stream","data"}` envelope
    Combined(Vec<String>),
    /// `/ws/<stream>`, bare payloads
    Single(String),
}

/// Client for one Binance market stream connection
pub struct StreamClient {
    url: String,
    subscription: Subscription,
}

impl StreamClient {
    /// Multiplex several streams over one connection
    pub fn combined(config: &BinanceConfig, streams: Vec<String>) -> Result<Self, WebSocketError> {
        if streams.is_empty() {
            return Err(WebSocketError::NoStreams);
        }

        let url = format!(
            "{}/stream?streams={}",
            config.stream_url.trim_end_matches('/'),
            streams.join("/")
        );

        Ok(Self {
            url,
            subscription: Subscription::Combined(streams),
        })
    }

    /// Subscribe to exactly one stream
    pub fn single(config: &BinanceConfig, stream: impl Into<String>) -> Result<Self, WebSocketError> {
        let stream = stream.into();
        if stream.is_empty() {
            return Err(WebSocketError::NoStreams);
        }

        let url = format!("{}/ws/{}", config.stream_url.trim_end_matches('/'), stream);

        Ok(Self {
            url,
            subscription: Subscription::Single(stream),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect and deliver events to `handler` in arrival order until the
    /// server closes, the handler breaks, or `cancel` fires.
    pub async fn run<F>(&self, handler: F, cancel: &CancellationToken) -> Result<StreamStats, WebSocketError>
    where
        F: FnMut(StreamEvent) -> ControlFlow<()>,
    {
        let (mut ws, _) = connect_async(self.url.as_str()).await?;

        let stats = match &self.subscription {
            Subscription::Combined(streams) => {
                log::info!("Connected to Binance combined stream ({} streams)", streams.len());
                pump(&mut ws, handler, cancel).await?
            }
            Subscription::Single(stream) => {
                log::info!("Connected to Binance stream {}", stream);
                pump_single(stream, &mut ws, handler, cancel).await?
            }
        };

        if let Err(e) = ws.close(None).await {
            log::debug!("Close after stream end failed: {}", e);
        }

        log::info!(
            "Binance stream finished: {} frames, {} events, {} unclassified, {} undecodable",
            stats.frames,
            stats.events,
            stats.classification_errors,
            stats.decode_errors
        );
        Ok(stats)
    }
}

/// Drive a combined-stream message stream through the classifier.
///
/// Frames are handled strictly one at a time in arrival order. A frame that
/// fails to classify or decode is logged and counted; the next frame is still
/// processed.
pub async fn pump<S, F>(stream: S, handler: F, cancel: &CancellationToken) -> Result<StreamStats, WebSocketError>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    F: FnMut(StreamEvent) -> ControlFlow<()>,
{
    drive(stream, decode_frame, handler, cancel).await
}

/// Same as [`pump`] for a single-stream connection subscribed to `name`
pub async fn pump_single<S, F>(
    name: &str,
    stream: S,
    handler: F,
    cancel: &CancellationToken,
) -> Result<StreamStats, WebSocketError>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    F: FnMut(StreamEvent) -> ControlFlow<()>,
{
    drive(stream, |frame| decode_single_frame(name, frame), handler, cancel).await
}

async fn drive<S, D, F>(
    mut stream: S,
    decode: D,
    mut handler: F,
    cancel: &CancellationToken,
) -> Result<StreamStats, WebSocketError>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    D: Fn(&[u8]) -> Result<StreamEvent, FrameError>,
    F: FnMut(StreamEvent) -> ControlFlow<()>,
{
    let mut stats = StreamStats::default();

    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("Binance stream cancelled");
                break;
            }
            message = stream.next() => message,
        };

        let frame = match message {
            Some(Ok(Message::Text(text))) => text.into_bytes(),
            Some(Ok(Message::Binary(bytes))) => bytes,
            Some(Ok(Message::Close(frame))) => {
                log::info!("Binance stream closed by server: {:?}", frame);
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => break,
        };

        stats.frames += 1;
        match decode(&frame) {
            Ok(event) => {
                stats.events += 1;
                if handler(event).is_break() {
                    break;
                }
            }
            Err(FrameError::Classification(e)) => {
                stats.classification_errors += 1;
                log::warn!("Skipping frame: {}", e);
            }
            Err(FrameError::Decode(e)) => {
                stats.decode_errors += 1;
                log::warn!("Skipping frame: {}", e);
            }
        }
    }

    Ok(stats)
}
