//! Front-end command grammar.

use std::path::PathBuf;

use fzm_protocol::SaveSlot;
use fzm_protocol::constants::SAVE_SLOT_COUNT;
use fzm_protocol::types::parse_slot_key;

/// One line typed at the `fzm>` prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Mods,
    Toggle { mod_id: i64, enabled: bool },
    DeleteMod { mod_id: i64 },
    /// Uploads every archive in `dir`, or only the enabled ones listed in
    /// its `mod-list.json`.
    UploadMods { dir: PathBuf, mod_list: bool },
    Saves,
    UploadSave { path: PathBuf, slot: String },
    DeleteSave { slot: String },
    /// Downloads one slot, or every occupied slot when `slot` is `None`.
    DownloadSave { slot: Option<String>, dir: PathBuf },
    Start {
        region: Option<String>,
        version: Option<String>,
        slot: Option<String>,
    },
    Stop,
    Attach,
    Help,
    Exit,
}

pub const HELP: &str = "\
commands:
  status                              session and instance state
  mods                                list uploaded mods
  toggle <id> on|off                  enable or disable a mod
  delete-mod <id>                     delete a mod
  upload-mods <dir> [--mod-list]      upload the .zip archives in <dir>
  saves                               list save slots
  upload-save <file> <slot>           upload a save into a slot
  delete-save <slot>                  empty a slot
  download-save <slot|all> <dir>      download saves into <dir>
  start [region] [version] [slot]     start an instance
  stop                                stop the instance
  attach                              open the remote console (Esc to leave)
  help                                this text
  exit                                quit";

/// Parses a prompt line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (name, args.as_slice()) {
        ("status", []) => Command::Status,
        ("mods", []) => Command::Mods,
        ("toggle", [id, state]) => Command::Toggle {
            mod_id: parse_mod_id(id)?,
            enabled: parse_switch(state)?,
        },
        ("delete-mod", [id]) => Command::DeleteMod {
            mod_id: parse_mod_id(id)?,
        },
        ("upload-mods", [dir]) => Command::UploadMods {
            dir: PathBuf::from(dir),
            mod_list: false,
        },
        ("upload-mods", [dir, "--mod-list"]) | ("upload-mods", ["--mod-list", dir]) => {
            Command::UploadMods {
                dir: PathBuf::from(dir),
                mod_list: true,
            }
        }
        ("saves", []) => Command::Saves,
        ("upload-save", [path, slot]) => Command::UploadSave {
            path: PathBuf::from(path),
            slot: parse_slot(slot)?,
        },
        ("delete-save", [slot]) => Command::DeleteSave {
            slot: parse_slot(slot)?,
        },
        ("download-save", ["all", dir]) => Command::DownloadSave {
            slot: None,
            dir: PathBuf::from(dir),
        },
        ("download-save", [slot, dir]) => Command::DownloadSave {
            slot: Some(parse_slot(slot)?),
            dir: PathBuf::from(dir),
        },
        ("start", rest) if rest.len() <= 3 => Command::Start {
            region: rest.first().map(|s| s.to_string()),
            version: rest.get(1).map(|s| s.to_string()),
            slot: rest.get(2).map(|s| parse_slot(s)).transpose()?,
        },
        ("stop", []) => Command::Stop,
        ("attach", []) => Command::Attach,
        ("help", []) | ("?", []) => Command::Help,
        ("exit", []) | ("quit", []) => Command::Exit,
        (
            "status" | "mods" | "toggle" | "delete-mod" | "upload-mods" | "saves"
            | "upload-save" | "delete-save" | "download-save" | "start" | "stop" | "attach"
            | "help" | "exit",
            _,
        ) => return Err(format!("wrong arguments for '{name}', see 'help'")),
        _ => return Err(format!("unknown command '{name}', see 'help'")),
    };
    Ok(Some(command))
}

fn parse_mod_id(s: &str) -> Result<i64, String> {
    s.parse().map_err(|_| format!("invalid mod id '{s}'"))
}

fn parse_switch(s: &str) -> Result<bool, String> {
    match s {
        "on" | "true" | "enable" => Ok(true),
        "off" | "false" | "disable" => Ok(false),
        _ => Err(format!("expected on or off, got '{s}'")),
    }
}

/// Accepts `3` or `slot3` and returns the wire key.
pub fn parse_slot(s: &str) -> Result<String, String> {
    let index = s
        .parse::<u8>()
        .ok()
        .or_else(|| parse_slot_key(s))
        .filter(|n| (1..=SAVE_SLOT_COUNT).contains(n))
        .ok_or_else(|| format!("invalid slot '{s}', expected 1-{SAVE_SLOT_COUNT}"))?;
    Ok(SaveSlot::key_for(index))
}
