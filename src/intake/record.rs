//! Question records and their entry form in the question file.

use std::fmt;
use std::sync::LazyLock;

use chrono::{NaiveDateTime, Timelike};
use regex::Regex;

/// Placeholder used when the sender has no display name.
pub const UNKNOWN_SENDER: &str = "unknown";

/// Timestamp format shared by both backends.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Start of an entry: timestamp, sender id and the opening parenthesis of the name.
static ENTRY_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2})\] UserID (-?\d+) \(").expect("entry pattern is valid")
});

/// A stored question. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRecord {
    timestamp: NaiveDateTime,
    sender_id: i64,
    sender_name: String,
    text: String,
}

impl QuestionRecord {
    /// Build a record. Returns `None` unless `text` ends with `?`.
    ///
    /// The timestamp is truncated to the minute and an empty name becomes
    /// [`UNKNOWN_SENDER`].
    pub fn new(timestamp: NaiveDateTime, sender_id: i64, sender_name: &str, text: &str) -> Option<Self> {
        if !text.ends_with('?') {
            return None;
        }
        let timestamp = timestamp
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(timestamp);
        let sender_name = if sender_name.trim().is_empty() {
            UNKNOWN_SENDER.to_string()
        } else {
            sender_name.to_string()
        };
        Some(Self {
            timestamp,
            sender_id,
            sender_name,
            text: text.to_string(),
        })
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn sender_id(&self) -> i64 {
        self.sender_id
    }

    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Encode as a file entry (no trailing newline).
    ///
    /// The text is written as is, so a multi-line question spans several
    /// lines. A continuation line that would read as the start of a new entry
    /// gets one extra leading backslash. In the name, `\\`, `)` and line
    /// breaks are backslash-escaped.
    pub fn to_entry(&self) -> String {
        let mut entry = format!(
            "[{}] UserID {} ({}): ",
            self.timestamp_string(),
            self.sender_id,
            escape_name(&self.sender_name)
        );
        for (idx, line) in self.text.split('\n').enumerate() {
            if idx > 0 {
                entry.push('\n');
                if starts_entry(line.trim_start_matches('\\')) {
                    entry.push('\\');
                }
            }
            entry.push_str(line);
        }
        entry
    }

    /// Decode an entry: its first line plus any continuation lines, the
    /// latter already passed through [`continuation_line`].
    ///
    /// Names with unescaped parentheses and texts with bare backslashes, as
    /// found in older files, are read verbatim.
    pub fn from_entry(entry: &str) -> Option<Self> {
        let caps = ENTRY_START_RE.captures(entry)?;
        let timestamp = NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT).ok()?;
        let sender_id = caps[2].parse().ok()?;
        let rest = &entry[caps.get(0)?.end()..];
        let (name, text) = split_name(rest)?;
        Self::new(timestamp, sender_id, &name, text.trim_end_matches(['\n', '\r']))
    }
}

/// True if `line` opens a new entry.
pub fn starts_entry(line: &str) -> bool {
    ENTRY_START_RE.is_match(line)
}

/// Undo the guard [`QuestionRecord::to_entry`] puts on continuation lines.
pub fn continuation_line(line: &str) -> &str {
    match line.strip_prefix('\\') {
        Some(rest) if starts_entry(rest.trim_start_matches('\\')) => rest,
        _ => line,
    }
}

impl fmt::Display for QuestionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] UserID {} ({}): {}",
            self.timestamp_string(),
            self.sender_id,
            self.sender_name,
            self.text
        )
    }
}

fn escape_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            ')' => result.push_str("\\)"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}

/// Split `name): text`, ending the name at the first unescaped `): `.
/// Backslashes not followed by `\\`, `)`, `n` or `r` stay literal.
fn split_name(rest: &str) -> Option<(String, &str)> {
    let mut name = String::new();
    let mut chars = rest.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        match c {
            ')' if rest[idx + 1..].starts_with(": ") => return Some((name, &rest[idx + 3..])),
            '\n' => return None,
            '\\' => {
                let decoded = match chars.peek() {
                    Some((_, '\\')) => Some('\\'),
                    Some((_, ')')) => Some(')'),
                    Some((_, 'n')) => Some('\n'),
                    Some((_, 'r')) => Some('\r'),
                    _ => None,
                };
                match decoded {
                    Some(d) => {
                        chars.next();
                        name.push(d);
                    }
                    None => name.push('\\'),
                }
            }
            _ => name.push(c),
        }
    }
    None
}
