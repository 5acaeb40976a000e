use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use fzm_console_log::{LogEntry, LogMultiplexer};
use fzm_sync::{ClientError, ZoneClient};

use crate::line_editor::LineEditor;

/// Boxed future returned by [`CommandSink::send_command`].
pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + 'a>>;

/// Where submitted console lines go.
pub trait CommandSink: Send + Sync {
    fn send_command<'a>(&'a self, input: &'a str) -> CommandFuture<'a>;
}

impl CommandSink for ZoneClient {
    fn send_command<'a>(&'a self, input: &'a str) -> CommandFuture<'a> {
        Box::pin(ZoneClient::send_command(self, input))
    }
}

/// Interactive console state: the input line plus the log it writes to.
pub struct RemoteShell {
    sink: Arc<dyn CommandSink>,
    log: Arc<LogMultiplexer>,
    editor: LineEditor,
}

impl RemoteShell {
    /// `history` seeds command recall, oldest first.
    pub fn new(sink: Arc<dyn CommandSink>, log: Arc<LogMultiplexer>, history: Vec<String>) -> Self {
        Self {
            sink,
            log,
            editor: LineEditor::new(history),
        }
    }

    pub fn log(&self) -> &Arc<LogMultiplexer> {
        &self.log
    }

    pub fn editor(&self) -> &LineEditor {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut LineEditor {
        &mut self.editor
    }

    /// Submits the current line.
    ///
    /// A non-blank line is echoed into the log and sent on its own task;
    /// the returned handle completes once the send is done. Detaching the
    /// shell does not cancel it. Blank lines do nothing.
    pub fn submit(&mut self) -> Option<JoinHandle<()>> {
        let line = self.editor.submit()?;
        Some(self.dispatch(line))
    }

    fn dispatch(&self, line: String) -> JoinHandle<()> {
        self.log.append(LogEntry::info(format!("COMMAND: {line}")));
        debug!(command = %line, "sending console command");

        let sink = self.sink.clone();
        let log = self.log.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.send_command(&line).await {
                warn!(command = %line, "console command failed: {e}");
                log.append(LogEntry::error(format!(
                    "Error sending command: {}",
                    e.user_message()
                )));
            }
        })
    }
}
