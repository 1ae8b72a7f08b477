// Net layer - upstream stream/snapshot transports and the downstream sink

pub mod rest;
pub mod sink;
pub mod websocket;
pub mod wire;

// Re-export commonly used items
pub use rest::{RestClient, SnapshotError, SnapshotSource, BINANCE_REST_URL};
pub use sink::{SinkError, TcpTickSink, TickSink};
pub use websocket::{
    combined_stream_url, depth_streams, trade_streams, FeedError, MarketStream, BINANCE_WS_URL,
};
