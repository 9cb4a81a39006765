pub mod mapper;
pub mod stream;
pub mod types;
pub mod websocket;

pub use stream::{classify, decode_single, StreamEnvelope, StreamKind, StreamPayload};
pub use websocket::{
    decode_frame, decode_single_frame, pump, pump_single, StreamClient, StreamStats, WebSocketError,
};
