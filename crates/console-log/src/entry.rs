use std::fmt;

/// Severity of a log entry, used for colouring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LogLevel {
    /// Verbatim server console output.
    #[default]
    Plain,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Plain => "plain",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the console view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Sequence number of remote console lines; `None` for local notices.
    pub num: Option<u64>,
    pub level: LogLevel,
    pub text: String,
}

impl LogEntry {
    /// A numbered server console line.
    pub fn remote(num: u64, line: impl Into<String>) -> Self {
        Self {
            num: Some(num),
            level: LogLevel::Plain,
            text: line.into(),
        }
    }

    /// An unnumbered entry with the given level.
    pub fn notice(level: LogLevel, text: impl Into<String>) -> Self {
        Self {
            num: None,
            level,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::notice(LogLevel::Info, text)
    }

    pub fn warn(text: impl Into<String>) -> Self {
        Self::notice(LogLevel::Warn, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::notice(LogLevel::Error, text)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        let e = LogEntry::remote(3, "Player joined");
        assert_eq!(e.num, Some(3));
        assert_eq!(e.level, LogLevel::Plain);

        let e = LogEntry::warn("warn disk almost full");
        assert_eq!(e.num, None);
        assert_eq!(e.level, LogLevel::Warn);
        assert_eq!(e.to_string(), "warn disk almost full");
    }
}
