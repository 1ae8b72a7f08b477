// Binance market-data feed handlers
//
// Two handlers share this library:
//   - quote-feed: L5 order book reconstruction from @depth deltas with REST
//     snapshot reconciliation, publishing change-detected quotes downstream
//   - trade-feed: per-event trade normalization with gap detection
//
// Layering:
//   core    - types, constants, config, logging
//   net     - websocket stream, REST snapshot client, wire format, tick sink
//   book    - parsing, ladder storage, per-symbol state machine, publisher
//   handler - feed drivers binding the layers together

pub mod core;
pub mod net;
pub mod book;
pub mod handler;
