use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An uploaded mod as reported by the `mods` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModEntry {
    pub id: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Ordered key → label mapping (regions, versions, save slots).
///
/// Keeps the order in which the service listed the entries, which a plain
/// `HashMap` would lose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSet(Vec<(String, String)>);

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterates `(key, label)` pairs in service order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OptionSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl Serialize for OptionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OptionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OptionSetVisitor;

        impl<'de> Visitor<'de> for OptionSetVisitor {
            type Value = OptionSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of option keys to labels")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<OptionSet, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, label)) = access.next_entry::<String, String>()? {
                    // Later duplicates win, as they would in a JSON object.
                    entries.retain(|(k, _): &(String, String)| *k != key);
                    entries.push((key, label));
                }
                Ok(OptionSet(entries))
            }
        }

        deserializer.deserialize_map(OptionSetVisitor)
    }
}

/// One of the service's fixed save slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSlot {
    /// 1-based slot number.
    pub index: u8,
    /// Wire key, e.g. `slot3`.
    pub key: String,
    /// Display label, e.g. `slot 3 (12.3MB)` or `slot 3 (empty)`.
    pub label: String,
}

impl SaveSlot {
    /// Builds a slot from a `saves` option entry. Returns `None` for keys
    /// that are not of the form `slotN`.
    pub fn from_option(key: &str, label: &str) -> Option<Self> {
        let index = parse_slot_key(key)?;
        Some(Self {
            index,
            key: key.to_string(),
            label: label.to_string(),
        })
    }

    /// Wire key for a 1-based slot number.
    pub fn key_for(index: u8) -> String {
        format!("slot{index}")
    }

    /// Whether the slot holds no save.
    pub fn is_empty(&self) -> bool {
        self.label.trim_end().ends_with("(empty)")
    }

    /// Approximate save size parsed from the `<n.n>MB` label suffix.
    pub fn size_bytes(&self) -> Option<u64> {
        let end = self.label.rfind("MB")?;
        let head = &self.label[..end];
        let start = head
            .rfind(|c: char| !(c.is_ascii_digit() || c == '.'))
            .map_or(0, |i| i + 1);
        let megabytes: f64 = head[start..].parse().ok()?;
        Some((megabytes * 1_048_576.0) as u64)
    }
}

/// Parses `slotN` into `N` (1-based).
pub fn parse_slot_key(key: &str) -> Option<u8> {
    key.strip_prefix("slot")?
        .parse()
        .ok()
        .filter(|n| *n >= 1)
}

/// Lifecycle of the remote game server instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RunState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

impl RunState {
    /// The session's running flag: true while an instance exists at all.
    pub fn is_running(self) -> bool {
        !matches!(self, RunState::Idle)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}
