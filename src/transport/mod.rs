mod client;
mod connection;
mod dispatch;
mod protocol;
mod stats;

pub use client::GazeClient;
pub use connection::{ConnectionPhase, ConnectionState};
pub use dispatch::Dispatcher;
pub use protocol::{
    decode_inbound, CalibrationResponse, GazeDataPayload, GazeQuality, GazeSample,
    InboundMessage, IrisCenter, OutboundMessage, ServerStats,
};
pub use stats::TransportStats;
