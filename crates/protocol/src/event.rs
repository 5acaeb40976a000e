use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{ModEntry, OptionSet};

/// Which option set an `options` event replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionsKind {
    Regions,
    Versions,
    Saves,
    /// Forward compatibility: option sets this client does not track.
    #[serde(other)]
    Other,
}

/// A push event received over the socket, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    /// First event of every connection; carries the visit secret that all
    /// API calls must present.
    Visit { secret: String },

    /// Snapshot of one option set.
    Options { name: OptionsKind, options: OptionSet },

    /// Snapshot of the uploaded mod list.
    Mods {
        #[serde(alias = "list")]
        mods: Vec<ModEntry>,
    },

    Idle,

    Starting {
        #[serde(
            rename = "launchId",
            default,
            deserialize_with = "launch_id",
            skip_serializing_if = "Option::is_none"
        )]
        launch_id: Option<String>,
    },

    Stopping {
        #[serde(
            rename = "launchId",
            default,
            deserialize_with = "launch_id",
            skip_serializing_if = "Option::is_none"
        )]
        launch_id: Option<String>,
    },

    Running {
        #[serde(
            rename = "launchId",
            default,
            deserialize_with = "launch_id",
            skip_serializing_if = "Option::is_none"
        )]
        launch_id: Option<String>,
        /// Address players connect to.
        #[serde(alias = "address", default, skip_serializing_if = "Option::is_none")]
        socket: Option<String>,
    },

    /// Per-slot detail record.
    Slot {
        slot: String,
        #[serde(default)]
        data: serde_json::Value,
    },

    /// Server console line with its sequence number.
    Log {
        num: u64,
        #[serde(default, deserialize_with = "nullable_string")]
        line: String,
    },

    Info {
        #[serde(default, deserialize_with = "nullable_string")]
        line: String,
    },

    Warn {
        #[serde(default, deserialize_with = "nullable_string")]
        line: String,
    },

    Error {
        #[serde(default, deserialize_with = "nullable_string")]
        line: String,
    },

    /// Forward compatibility: unknown event types deserialize here.
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Parses a socket text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Wire name of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Visit { .. } => "visit",
            ServerEvent::Options { .. } => "options",
            ServerEvent::Mods { .. } => "mods",
            ServerEvent::Idle => "idle",
            ServerEvent::Starting { .. } => "starting",
            ServerEvent::Stopping { .. } => "stopping",
            ServerEvent::Running { .. } => "running",
            ServerEvent::Slot { .. } => "slot",
            ServerEvent::Log { .. } => "log",
            ServerEvent::Info { .. } => "info",
            ServerEvent::Warn { .. } => "warn",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Unknown => "unknown",
        }
    }
}

/// Accepts a launch id sent either as a string or as a number.
fn launch_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn nullable_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
