//! Local upload candidates.

use std::collections::HashSet;
use std::io;
use std::path::Path;

use serde::Deserialize;

use fzm_gateway::UploadSource;

/// Lists the `.zip` archives directly inside `dir`, sorted by name.
pub fn scan_mod_archives(dir: &Path) -> io::Result<Vec<UploadSource>> {
    let mut sources = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_zip = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        if !is_zip || !entry.file_type()?.is_file() {
            continue;
        }
        sources.push(UploadSource::from_path(path)?);
    }
    sources.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(sources)
}

#[derive(Debug, Deserialize)]
struct ModList {
    #[serde(default)]
    mods: Vec<ModListEntry>,
}

#[derive(Debug, Deserialize)]
struct ModListEntry {
    name: String,
    #[serde(default)]
    enabled: bool,
}

/// Keeps the archives whose mod is enabled in the game's `mod-list.json`
/// inside `dir`. Archives are named `<mod>_<version>.zip`; the built-in
/// `base` mod is never uploaded.
pub fn filter_by_mod_list(
    dir: &Path,
    sources: Vec<UploadSource>,
) -> anyhow::Result<Vec<UploadSource>> {
    let content = std::fs::read_to_string(dir.join("mod-list.json"))?;
    let list: ModList = serde_json::from_str(&content)?;
    let enabled: HashSet<&str> = list
        .mods
        .iter()
        .filter(|m| m.enabled && m.name != "base")
        .map(|m| m.name.as_str())
        .collect();

    Ok(sources
        .into_iter()
        .filter(|s| enabled.contains(mod_name(&s.name)))
        .collect())
}

/// Mod name of an archive file name: `Rampant_3.1.2.zip` → `Rampant`.
fn mod_name(file_name: &str) -> &str {
    let stem = file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem);
    stem.rsplit_once('_').map_or(stem, |(name, _)| name)
}
