//! Transfer progress on the terminal.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use fzm_gateway::{ProgressFn, TransferProgress};

/// No percentage rendered yet.
const NOTHING_PRINTED: u64 = u64::MAX;

/// Renders a single progress line, rewritten in place.
pub struct ProgressPrinter {
    label: String,
    expected: Option<u64>,
    last_percent: AtomicU64,
    printed: AtomicBool,
}

impl ProgressPrinter {
    /// `expected` is used when the transfer itself does not report a total.
    pub fn new(label: impl Into<String>, expected: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            expected,
            last_percent: AtomicU64::new(NOTHING_PRINTED),
            printed: AtomicBool::new(false),
        })
    }

    /// Callback to hand to a gateway transfer.
    pub fn callback(self: &Arc<Self>) -> ProgressFn {
        let printer = Arc::clone(self);
        Arc::new(move |progress| printer.report(progress))
    }

    fn report(&self, progress: TransferProgress) {
        let Some(line) = self.render(progress) else {
            return;
        };
        self.printed.store(true, Ordering::Relaxed);
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r{line}");
        let _ = out.flush();
    }

    /// Formats the line for `progress`, or `None` when it would repeat the
    /// previous one.
    fn render(&self, progress: TransferProgress) -> Option<String> {
        let progress = TransferProgress {
            total: progress.total.or(self.expected),
            ..progress
        };
        match progress.percentage() {
            Some(pct) => {
                let pct = pct.min(100.0) as u64;
                if self.last_percent.swap(pct, Ordering::Relaxed) == pct {
                    return None;
                }
                Some(format!(
                    "{} {:>3}% ({})",
                    self.label,
                    pct,
                    human_bytes(progress.transferred)
                ))
            }
            None => Some(format!(
                "{} {}",
                self.label,
                human_bytes(progress.transferred)
            )),
        }
    }

    /// Ends the progress line.
    pub fn finish(&self) {
        if self.printed.load(Ordering::Relaxed) {
            println!();
        }
    }
}

/// `1536` → `1.5 KB`.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
