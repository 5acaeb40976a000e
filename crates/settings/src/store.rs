use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Longest a recall list may grow; older entries are dropped first.
pub const RECALL_LIMIT: usize = 100;

/// Errors from the preference store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Single-valued preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pref {
    Region,
    Version,
    Slot,
    UserToken,
}

impl Pref {
    pub fn key(self) -> &'static str {
        match self {
            Pref::Region => "region",
            Pref::Version => "version",
            Pref::Slot => "slot",
            Pref::UserToken => "userToken",
        }
    }
}

/// Ordered recall lists, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecallList {
    Tokens,
    Commands,
    ModsPaths,
    SavesPaths,
}

impl RecallList {
    pub fn key(self) -> &'static str {
        match self {
            RecallList::Tokens => "tokens",
            RecallList::Commands => "commands",
            RecallList::ModsPaths => "modsPaths",
            RecallList::SavesPaths => "savesPaths",
        }
    }
}

/// Where the front end keeps what it remembers between runs.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, pref: Pref) -> Option<String>;

    fn put(&self, pref: Pref, value: &str) -> Result<(), StoreError>;

    /// Appends `value` unless it equals the newest entry, trimming the list
    /// to [`RECALL_LIMIT`].
    fn append_recall(&self, list: RecallList, value: &str) -> Result<(), StoreError>;

    fn recall(&self, list: RecallList) -> Vec<String>;

    /// Most recent entry of `list`.
    fn last_recall(&self, list: RecallList) -> Option<String> {
        self.recall(list).pop()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Contents {
    #[serde(default)]
    values: BTreeMap<String, String>,
    #[serde(default)]
    recall: BTreeMap<String, Vec<String>>,
}

impl Contents {
    fn push_recall(&mut self, list: RecallList, value: &str) -> bool {
        if value.trim().is_empty() {
            return false;
        }
        let entries = self.recall.entry(list.key().to_string()).or_default();
        if entries.last().map(String::as_str) == Some(value) {
            return false;
        }
        entries.push(value.to_string());
        if entries.len() > RECALL_LIMIT {
            let excess = entries.len() - RECALL_LIMIT;
            entries.drain(..excess);
        }
        true
    }
}

/// JSON-file backed store. Every change is written through.
pub struct FileStore {
    path: PathBuf,
    contents: RwLock<Contents>,
}

impl FileStore {
    /// Opens the store at `path`, loading it if the file exists.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let contents = load(&path)?;
        Ok(Self {
            path,
            contents: RwLock::new(contents),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the current contents to disk with owner-only permissions.
    pub fn persist(&self) -> Result<(), StoreError> {
        let contents = self.contents.read().unwrap();
        let json = serde_json::to_string_pretty(&*contents)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_private(&self.path, json.as_bytes())?;
        debug!(path = %self.path.display(), "preferences saved");
        Ok(())
    }
}

impl PreferenceStore for FileStore {
    fn get(&self, pref: Pref) -> Option<String> {
        self.contents.read().unwrap().values.get(pref.key()).cloned()
    }

    fn put(&self, pref: Pref, value: &str) -> Result<(), StoreError> {
        {
            let mut contents = self.contents.write().unwrap();
            if contents.values.get(pref.key()).map(String::as_str) == Some(value) {
                return Ok(());
            }
            contents
                .values
                .insert(pref.key().to_string(), value.to_string());
        }
        self.persist()
    }

    fn append_recall(&self, list: RecallList, value: &str) -> Result<(), StoreError> {
        let changed = self.contents.write().unwrap().push_recall(list, value);
        if changed { self.persist() } else { Ok(()) }
    }

    fn recall(&self, list: RecallList) -> Vec<String> {
        self.contents
            .read()
            .unwrap()
            .recall
            .get(list.key())
            .cloned()
            .unwrap_or_default()
    }
}

/// In-memory store for runs without a writable config directory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    contents: RwLock<Contents>,
}

impl PreferenceStore for MemoryStore {
    fn get(&self, pref: Pref) -> Option<String> {
        self.contents.read().unwrap().values.get(pref.key()).cloned()
    }

    fn put(&self, pref: Pref, value: &str) -> Result<(), StoreError> {
        self.contents
            .write()
            .unwrap()
            .values
            .insert(pref.key().to_string(), value.to_string());
        Ok(())
    }

    fn append_recall(&self, list: RecallList, value: &str) -> Result<(), StoreError> {
        self.contents.write().unwrap().push_recall(list, value);
        Ok(())
    }

    fn recall(&self, list: RecallList) -> Vec<String> {
        self.contents
            .read()
            .unwrap()
            .recall
            .get(list.key())
            .cloned()
            .unwrap_or_default()
    }
}

fn load(path: &Path) -> Result<Contents, StoreError> {
    if !path.exists() {
        return Ok(Contents::default());
    }
    let data = std::fs::read_to_string(path)?;
    let contents: Contents = serde_json::from_str(&data)?;
    debug!(path = %path.display(), "preferences loaded");
    Ok(contents)
}

/// Writes `bytes` to a file only the owner can read. New files are created
/// 0600; an existing file is narrowed to 0600 before anything is written.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(bytes)
}

/// Default store location: `<config dir>/fzm/store.json`.
pub fn default_store_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("fzm").join("store.json"))
}

/// Returns the platform-specific config directory.
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}
