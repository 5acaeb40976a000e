//! Transport connection to the hosting service.
//!
//! Owns the single WebSocket of a run, keeps it alive with periodic pings
//! and turns incoming text frames into an ordered stream of
//! [`ServerEvent`](fzm_protocol::ServerEvent)s. There is no reconnect: once
//! the stream yields an error the run is over.

pub(crate) mod pumps;
pub mod ws_client;

pub use ws_client::{EventStream, Transport, TransportError};
