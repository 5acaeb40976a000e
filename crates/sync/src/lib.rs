//! Session state for one connection to the hosting service.
//!
//! [`Synchronizer`] folds push events into local state and exposes
//! settlement signals. [`ZoneClient`] drives the event loop and wraps the
//! action gateway so mutating calls return only once the service has
//! pushed the resulting snapshot.

pub mod client;
pub mod error;
pub mod session;
pub mod synchronizer;

pub use client::{LIVENESS_TICK, ZoneClient};
pub use error::ClientError;
pub use session::Session;
pub use synchronizer::{Aggregate, Synchronizer};
