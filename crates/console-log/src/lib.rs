//! Console log multiplexer.
//!
//! Server console lines arrive tagged with a sequence number and may be
//! re-sent (for example when the service replays recent output on a new
//! connection). The multiplexer keeps the first copy of every number,
//! preserves arrival order, and fans entries out to live subscribers.

pub mod entry;
pub mod multiplexer;

pub use entry::{LogEntry, LogLevel};
pub use multiplexer::{LogMultiplexer, SubscriberId, Subscription};
