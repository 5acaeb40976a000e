//! Preference store.
//!
//! Remembers the last chosen region, version and slot, the user token, and
//! short recall lists (tokens, console commands, local paths) between runs.
//! The visit secret is never stored.

pub mod store;

pub use store::{
    FileStore, MemoryStore, Pref, PreferenceStore, RECALL_LIMIT, RecallList, StoreError,
    config_dir, default_store_path,
};
