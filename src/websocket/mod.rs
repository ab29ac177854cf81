//! WebSocket Relay
//!
//! Relays classified sensor readings between every connected client.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: Registry of active connections and the broadcaster
//! - **Handler**: WebSocket upgrade and the per-connection session loop
//! - **Messages**: Inbound and outbound frame formats
//!
//! ## Protocol
//!
//! Clients connect to `/ws` and send:
//! - `{"type":"data", "elevation":..., "curah_hujan":..., ...}` - classified
//!   and relayed to every other client
//! - `{"type":"time", "timeReady":...}` - relayed verbatim to every client
//!
//! Every client also receives `{"type":"connection","connection_count":N}`
//! whenever a client connects or disconnects.
//!
//! ## Example
//!
//! ```javascript
//! // Browser dashboard
//! const ws = new WebSocket('ws://localhost:8001/ws');
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'data') console.log(msg.hardwareId, msg.status_elevation);
//! };
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{ConnectionHub, ConnectionId, FrameKind, HubConfig, HubError, Payload};
pub use messages::{
    EnrichedReading, FrameError, InboundFrame, Reading, ServerMessage, TimeSignal, TIMESTAMP_FORMAT,
};
