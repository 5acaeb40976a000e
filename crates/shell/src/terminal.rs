//! Raw-mode terminal driver for [`RemoteShell`].

use std::io::{self, Write};

use crossterm::cursor::MoveToColumn;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType, disable_raw_mode, enable_raw_mode};
use crossterm::{execute, queue};
use futures_util::StreamExt;
use tracing::debug;

use fzm_console_log::{LogEntry, LogLevel};

use crate::shell::RemoteShell;

/// Prompt drawn in front of the input line.
pub const PROMPT: &str = ">_ ";

pub const FACTORIO_FG: Color = Color::Rgb {
    r: 230,
    g: 145,
    b: 0,
};
pub const FACTORIO_BG: Color = Color::Rgb {
    r: 43,
    g: 43,
    b: 43,
};
const GREEN: Color = Color::Rgb { r: 51, g: 255, b: 0 };
const ORANGE: Color = Color::Rgb {
    r: 255,
    g: 165,
    b: 0,
};
const RED: Color = Color::Rgb { r: 255, g: 0, b: 0 };

/// What a key press asks the driver to do.
#[derive(Debug, PartialEq, Eq)]
pub enum KeyAction {
    /// The input line changed.
    Redraw,
    /// A line was submitted; the echo arrives through the log feed.
    Submitted,
    Detach,
    Ignore,
}

/// Applies a key press to the shell.
pub fn handle_key(shell: &mut RemoteShell, key: KeyEvent) -> KeyAction {
    if key.kind != KeyEventKind::Press {
        return KeyAction::Ignore;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') | KeyCode::Char('d') => KeyAction::Detach,
            KeyCode::Char('h') => redraw_if(shell.editor_mut().backspace()),
            _ => KeyAction::Ignore,
        };
    }

    match key.code {
        KeyCode::Esc => KeyAction::Detach,
        KeyCode::Enter => match shell.submit() {
            Some(_) => KeyAction::Submitted,
            None => KeyAction::Ignore,
        },
        KeyCode::Backspace => redraw_if(shell.editor_mut().backspace()),
        KeyCode::Up => redraw_if(shell.editor_mut().history_up()),
        KeyCode::Down => redraw_if(shell.editor_mut().history_down()),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::ALT) => {
            shell.editor_mut().insert(c);
            KeyAction::Redraw
        }
        _ => KeyAction::Ignore,
    }
}

fn redraw_if(changed: bool) -> KeyAction {
    if changed {
        KeyAction::Redraw
    } else {
        KeyAction::Ignore
    }
}

fn level_color(level: LogLevel) -> Option<Color> {
    match level {
        LogLevel::Plain => None,
        LogLevel::Info => Some(GREEN),
        LogLevel::Warn => Some(ORANGE),
        LogLevel::Error => Some(RED),
    }
}

/// Writes one entry on the current line, replacing whatever was there.
fn queue_entry(out: &mut impl Write, entry: &LogEntry) -> io::Result<()> {
    queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    match level_color(entry.level) {
        Some(color) => queue!(
            out,
            SetForegroundColor(color),
            Print(&entry.text),
            ResetColor
        )?,
        None => queue!(out, Print(&entry.text))?,
    }
    queue!(out, Print("\r\n"))
}

fn queue_prompt(out: &mut impl Write, input: &str) -> io::Result<()> {
    queue!(
        out,
        MoveToColumn(0),
        SetBackgroundColor(FACTORIO_BG),
        SetForegroundColor(FACTORIO_FG),
        Clear(ClearType::UntilNewLine),
        Print(PROMPT),
        Print(input),
        Clear(ClearType::UntilNewLine),
        ResetColor
    )
}

/// Restores cooked mode on drop if this guard enabled raw mode.
struct RawModeGuard {
    was_raw: bool,
}

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        let was_raw = crossterm::terminal::is_raw_mode_enabled().unwrap_or(false);
        if !was_raw {
            enable_raw_mode()?;
        }
        Ok(Self { was_raw })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = execute!(stdout, MoveToColumn(0), Clear(ClearType::CurrentLine), ResetColor);
        let _ = stdout.flush();
        if !self.was_raw {
            let _ = disable_raw_mode();
        }
    }
}

/// Attaches the shell to the terminal until the user detaches.
///
/// Prints the log history once, then interleaves new entries above the
/// input line as they arrive. Commands still in flight on detach keep
/// running.
pub async fn attach(shell: &mut RemoteShell) -> io::Result<()> {
    let _raw = RawModeGuard::enable()?;
    let mut out = io::stdout();
    execute!(
        out,
        Clear(ClearType::All),
        crossterm::cursor::MoveTo(0, 0)
    )?;

    let (history, mut feed) = shell.log().subscribe_with_history();
    for entry in &history {
        queue_entry(&mut out, entry)?;
    }
    queue_prompt(&mut out, shell.editor().buffer())?;
    out.flush()?;
    debug!(replayed = history.len(), "shell attached");

    let mut keys = EventStream::new();
    loop {
        tokio::select! {
            entry = feed.recv() => {
                let Some(entry) = entry else { break };
                queue_entry(&mut out, &entry)?;
                queue_prompt(&mut out, shell.editor().buffer())?;
                out.flush()?;
            }
            event = keys.next() => {
                match event {
                    Some(Ok(Event::Key(key))) => match handle_key(shell, key) {
                        KeyAction::Detach => break,
                        KeyAction::Redraw | KeyAction::Submitted => {
                            queue_prompt(&mut out, shell.editor().buffer())?;
                            out.flush()?;
                        }
                        KeyAction::Ignore => {}
                    },
                    Some(Ok(Event::Resize(..))) => {
                        queue_prompt(&mut out, shell.editor().buffer())?;
                        out.flush()?;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e),
                    None => break,
                }
            }
        }
    }

    debug!("shell detached");
    Ok(())
}
