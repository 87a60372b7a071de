//! Raw adapter responses

/// Substrings that mark the end of an adapter response.
///
/// Matching is plain substring containment, so a data line that happens to
/// contain `OK` also ends the response.
pub const TERMINATORS: [&str; 5] = [">", "OK", "ERROR", "SEARCHING...", "STOPPED"];

/// Check whether a response line ends the current command
pub fn is_terminator(line: &str) -> bool {
    TERMINATORS.iter().any(|t| line.contains(t))
}

/// How the read loop for a command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseStatus {
    /// Still reading
    #[default]
    Pending,
    /// A terminator line was received
    Terminated,
    /// The adapter closed the stream
    Closed,
    /// The command timeout elapsed first
    TimedOut,
    /// A read error ended the loop
    Failed,
}

/// Lines accumulated for a single command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    lines: Vec<String>,
    status: ResponseStatus,
}

impl RawResponse {
    /// Create an empty, pending response
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received line
    pub fn push_line(&mut self, line: String) {
        self.lines.push(line);
    }

    /// Record how the read loop ended
    pub fn finish(&mut self, status: ResponseStatus) {
        self.status = status;
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Render the response as text, each line followed by `\n`
    pub fn text(&self) -> String {
        let mut text = String::with_capacity(self.lines.iter().map(|l| l.len() + 1).sum());
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}
