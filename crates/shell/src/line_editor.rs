/// Single-line input buffer with history recall.
#[derive(Debug, Clone, Default)]
pub struct LineEditor {
    buffer: String,
    history: Vec<String>,
    /// Index into `history`; `history.len()` means the fresh line.
    cursor: usize,
    /// What was being typed before history navigation started.
    stash: String,
}

impl LineEditor {
    /// Creates an editor whose history is seeded with earlier commands,
    /// oldest first.
    pub fn new(history: Vec<String>) -> Self {
        let cursor = history.len();
        Self {
            buffer: String::new(),
            history,
            cursor,
            stash: String::new(),
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn insert(&mut self, c: char) {
        self.buffer.push(c);
        self.cursor = self.history.len();
    }

    /// Removes the last character. Returns false on an empty buffer.
    pub fn backspace(&mut self) -> bool {
        self.buffer.pop().is_some()
    }

    /// Recalls the previous command. Returns false at the oldest entry.
    pub fn history_up(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        if self.cursor == self.history.len() {
            self.stash = std::mem::take(&mut self.buffer);
        }
        self.cursor -= 1;
        self.buffer = self.history[self.cursor].clone();
        true
    }

    /// Moves towards newer commands, ending at the line that was being
    /// typed. Returns false when already there.
    pub fn history_down(&mut self) -> bool {
        if self.cursor + 1 < self.history.len() {
            self.cursor += 1;
            self.buffer = self.history[self.cursor].clone();
            true
        } else if self.cursor < self.history.len() {
            self.cursor = self.history.len();
            self.buffer = std::mem::take(&mut self.stash);
            true
        } else {
            false
        }
    }

    /// Takes the trimmed line, records it in history and clears the
    /// buffer. A blank line leaves everything untouched and yields `None`.
    pub fn submit(&mut self) -> Option<String> {
        let line = self.buffer.trim();
        if line.is_empty() {
            return None;
        }
        let line = line.to_string();
        if self.history.last() != Some(&line) {
            self.history.push(line.clone());
        }
        self.buffer.clear();
        self.stash.clear();
        self.cursor = self.history.len();
        Some(line)
    }
}
