//! Action gateway: one-shot remote operations against the service API.
//!
//! Every call is a single HTTP request that reports only whether the
//! service accepted it. The state change it causes arrives later as a push
//! event; waiting for that is the caller's business.

pub mod error;
pub mod gateway;
pub mod http;
pub mod types;

pub use error::GatewayError;
pub use gateway::{ActionGateway, GatewayFuture};
pub use http::HttpGateway;
pub use types::{LoginResponse, ProgressFn, TransferProgress, UploadSource};
