//! The gateway seam.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::error::GatewayError;
use crate::types::{LoginResponse, ProgressFn, UploadSource};

/// Boxed future returned by gateway calls.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GatewayError>> + Send + 'a>>;

/// Remote operations of the service API.
///
/// Every call except `login` presents the visit secret of the current
/// connection. Implemented over HTTP by [`crate::HttpGateway`]; tests plug
/// in recording mocks.
pub trait ActionGateway: Send + Sync {
    /// Exchanges a visit secret (and optional stored token) for a user token.
    fn login<'a>(
        &'a self,
        user_token: Option<&'a str>,
        visit_secret: &'a str,
    ) -> GatewayFuture<'a, LoginResponse>;

    fn toggle_mod<'a>(
        &'a self,
        visit_secret: &'a str,
        mod_id: i64,
        enabled: bool,
    ) -> GatewayFuture<'a, ()>;

    fn delete_mod<'a>(&'a self, visit_secret: &'a str, mod_id: i64) -> GatewayFuture<'a, ()>;

    /// Streams a mod archive. Fails with `SizeLimit` before any I/O when the
    /// source is over the mod limit.
    fn upload_mod<'a>(
        &'a self,
        visit_secret: &'a str,
        source: &'a UploadSource,
        progress: Option<ProgressFn>,
    ) -> GatewayFuture<'a, ()>;

    /// Streams a save archive into `slot`. Same guard with the save limit.
    fn upload_save<'a>(
        &'a self,
        visit_secret: &'a str,
        source: &'a UploadSource,
        slot: &'a str,
        progress: Option<ProgressFn>,
    ) -> GatewayFuture<'a, ()>;

    fn delete_save<'a>(&'a self, visit_secret: &'a str, slot: &'a str) -> GatewayFuture<'a, ()>;

    /// Writes the save in `slot` to `dest`, returning the bytes written.
    fn download_save<'a>(
        &'a self,
        visit_secret: &'a str,
        slot: &'a str,
        dest: &'a Path,
        progress: Option<ProgressFn>,
    ) -> GatewayFuture<'a, u64>;

    /// Injects a line into the running server's console.
    fn send_command<'a>(
        &'a self,
        visit_secret: &'a str,
        launch_id: Option<&'a str>,
        input: &'a str,
    ) -> GatewayFuture<'a, ()>;

    /// Requests a new instance; returns its launch id.
    fn start_instance<'a>(
        &'a self,
        visit_secret: &'a str,
        region: &'a str,
        version: &'a str,
        slot: &'a str,
    ) -> GatewayFuture<'a, String>;

    fn stop_instance<'a>(
        &'a self,
        visit_secret: &'a str,
        launch_id: Option<&'a str>,
    ) -> GatewayFuture<'a, ()>;
}
