//! Wire protocol for the factorio.zone hosting service.
//!
//! Covers the JSON push events delivered over the `/ws` socket, the HTTP
//! API paths and limits, and the value types shared by the client crates.

pub mod constants;
pub mod event;
pub mod types;

pub use constants::Endpoint;
pub use event::{OptionsKind, ServerEvent};
pub use types::{ModEntry, OptionSet, RunState, SaveSlot};
