use std::time::Duration;

/// Public host of the hosting service.
pub const DEFAULT_HOST: &str = "factorio.zone";

/// How often the socket sends a keep-alive ping.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(30);

/// How long to wait for a pong after a ping before giving up. A dead peer is
/// therefore noticed at most `WS_PING_PERIOD + WS_PONG_TIMEOUT` after the
/// last answered ping.
pub const WS_PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Read deadline: if nothing at all arrives within this window the
/// connection is considered dead. Backstop for peers that answer nothing,
/// pings included.
pub const WS_READ_DEADLINE: Duration =
    Duration::from_secs(WS_PING_PERIOD.as_secs() + WS_PONG_TIMEOUT.as_secs());

/// Maximum accepted text frame size (16 MiB).
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Largest mod archive the service accepts (256 MiB).
pub const MOD_UPLOAD_LIMIT: u64 = 256 * 1024 * 1024;

/// Largest save archive the service accepts (96 MiB).
pub const SAVE_UPLOAD_LIMIT: u64 = 96 * 1024 * 1024;

/// Content type sent for uploaded archives.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/x-zip-compressed";

/// Number of save slots on the service.
pub const SAVE_SLOT_COUNT: u8 = 9;

/// HTTP API paths, relative to the `/api` root.
pub mod paths {
    pub const USER_LOGIN: &str = "/user/login";
    pub const MOD_TOGGLE: &str = "/mod/toggle";
    pub const MOD_DELETE: &str = "/mod/delete";
    pub const MOD_UPLOAD: &str = "/mod/upload";
    pub const SAVE_DELETE: &str = "/save/delete";
    pub const SAVE_DOWNLOAD: &str = "/save/download";
    pub const SAVE_UPLOAD: &str = "/save/upload";
    pub const INSTANCE_CONSOLE: &str = "/instance/console";
    pub const INSTANCE_START: &str = "/instance/start";
    pub const INSTANCE_STOP: &str = "/instance/stop";
}

/// Service location, from which socket and API URLs are derived.
///
/// Loopback hosts use plain `ws`/`http` so the client can be pointed at a
/// local test server; everything else uses TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    secure: bool,
}

impl Endpoint {
    /// Creates an endpoint for `host` (optionally with `:port`).
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        let secure = !is_loopback(&host);
        Self { host, secure }
    }

    /// The bare host this endpoint points at.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// URL of the push socket.
    pub fn socket_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}/ws", self.host)
    }

    /// URL of an API path such as [`paths::USER_LOGIN`].
    pub fn api_url(&self, path: &str) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}/api{path}", self.host)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

fn is_loopback(host: &str) -> bool {
    let name = host.split(':').next().unwrap_or(host);
    name == "localhost" || name.starts_with("127.")
}
