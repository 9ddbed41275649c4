//! Streaming reader for multi-file unified diffs as printed by
//! `git diff --full-index --no-prefix`.
//!
//! ## Format handled
//!
//! ```text
//! diff --git old new
//! <extended headers: new/deleted file mode, similarity index, rename from/to, index ...>
//! --- old | /dev/null
//! +++ new | /dev/null
//! @@ -l,s +l,s @@ section
//! <body>
//! ```
//!
//! Hunk bodies are consumed by line count from the hunk header, so body
//! lines that happen to look like headers are never misread. Input is read
//! as bytes; content that is not UTF-8 is decoded lossily since only the
//! leading marker byte of a body line matters.

use std::io::BufRead;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{CodeIntelError, Result};

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@ ?(.*)$").expect("valid hunk regex")
});

const DEV_NULL: &str = "/dev/null";

/// Added, changed and deleted line counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStat {
    pub added: u64,
    pub changed: u64,
    pub deleted: u64,
}

impl DiffStat {
    pub fn accumulate(&mut self, other: DiffStat) {
        self.added += other.added;
        self.changed += other.changed;
        self.deleted += other.deleted;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub orig_start: u32,
    pub orig_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub section: String,
    /// Body lines including their ` `, `+`, `-` or `\` marker. Invalid
    /// UTF-8 is replaced with U+FFFD.
    pub body: Vec<String>,
}

impl Hunk {
    /// Line statistics where an addition directly adjacent to a deletion
    /// counts as one changed line instead of one of each.
    #[must_use]
    pub fn stat(&self) -> DiffStat {
        let mut st = DiffStat::default();
        let mut last: Option<u8> = None;
        for line in &self.body {
            match line.as_bytes().first() {
                Some(b'-') => {
                    if last == Some(b'+') {
                        st.added -= 1;
                        st.changed += 1;
                        // a change can't absorb a second line
                        last = None;
                    } else {
                        st.deleted += 1;
                        last = Some(b'-');
                    }
                }
                Some(b'+') => {
                    if last == Some(b'-') {
                        st.deleted -= 1;
                        st.changed += 1;
                        last = None;
                    } else {
                        st.added += 1;
                        last = Some(b'+');
                    }
                }
                Some(b'\\') => {}
                _ => last = None,
            }
        }
        st
    }
}

/// One file's section of a multi-file diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiff {
    /// Path before the change (`/dev/null` for added files).
    pub orig_name: String,
    /// Path after the change (`/dev/null` for deleted files).
    pub new_name: String,
    /// Header lines between `diff --git` and `---`.
    pub extended: Vec<String>,
    pub hunks: Vec<Hunk>,
    pub is_binary: bool,
}

impl FileDiff {
    #[must_use]
    pub fn stat(&self) -> DiffStat {
        let mut total = DiffStat::default();
        for hunk in &self.hunks {
            total.accumulate(hunk.stat());
        }
        total
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.orig_name == DEV_NULL || self.extended.iter().any(|l| l.starts_with("new file mode"))
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.new_name == DEV_NULL
            || self
                .extended
                .iter()
                .any(|l| l.starts_with("deleted file mode"))
    }

    #[must_use]
    pub fn is_rename(&self) -> bool {
        self.extended.iter().any(|l| l.starts_with("rename from "))
    }
}

/// Lazily yields one [`FileDiff`] at a time from a reader.
pub struct MultiFileDiffReader<R> {
    reader: R,
    /// One line of lookahead.
    pending: Option<String>,
    line_no: usize,
    /// Set after the first error; the stream is not resumable.
    failed: bool,
}

impl<R: BufRead> MultiFileDiffReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: None,
            line_no: 0,
            failed: false,
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        Ok(Some(match String::from_utf8(buf) {
            Ok(line) => line,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }))
    }

    fn push_back(&mut self, line: String) {
        self.pending = Some(line);
    }

    fn parse_error(&self, detail: impl Into<String>) -> CodeIntelError {
        CodeIntelError::DiffParse {
            line: self.line_no,
            detail: detail.into(),
        }
    }

    /// Read the next file diff; `Ok(None)` at end of stream.
    pub fn read_file(&mut self) -> Result<Option<FileDiff>> {
        let header = loop {
            match self.next_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => {}
                Some(line) => break line,
            }
        };
        let Some(names) = header.strip_prefix("diff --git ") else {
            return Err(self.parse_error(format!("expected file header, got {header:?}")));
        };

        let mut file = FileDiff::default();
        if let Some((orig, new)) = split_header_names(names) {
            file.orig_name = orig.to_string();
            file.new_name = new.to_string();
        }

        // extended headers up to ---/+++ or the next file
        while let Some(line) = self.next_line()? {
            if line.starts_with("--- ") || line.starts_with("diff --git ") || line.starts_with("@@") {
                self.push_back(line);
                break;
            }
            if line.starts_with("Binary files ") {
                file.is_binary = true;
            } else if let Some(from) = line.strip_prefix("rename from ") {
                file.orig_name = from.to_string();
            } else if let Some(to) = line.strip_prefix("rename to ") {
                file.new_name = to.to_string();
            }
            file.extended.push(line);
        }
        if file.extended.iter().any(|l| l.starts_with("new file mode")) {
            file.orig_name = DEV_NULL.to_string();
        }
        if file
            .extended
            .iter()
            .any(|l| l.starts_with("deleted file mode"))
        {
            file.new_name = DEV_NULL.to_string();
        }

        match self.next_line()? {
            Some(line) if line.starts_with("--- ") => {
                file.orig_name = line[4..].trim_end().to_string();
                match self.next_line()? {
                    Some(plus) if plus.starts_with("+++ ") => {
                        file.new_name = plus[4..].trim_end().to_string();
                    }
                    other => {
                        return Err(self.parse_error(format!(
                            "expected +++ line, got {:?}",
                            other.unwrap_or_default()
                        )))
                    }
                }
            }
            Some(line) => self.push_back(line),
            None => return Ok(Some(file)),
        }

        loop {
            match self.next_line()? {
                Some(line) if line.starts_with("@@") => {
                    let hunk = self.read_hunk(&line)?;
                    file.hunks.push(hunk);
                }
                Some(line) => {
                    self.push_back(line);
                    break;
                }
                None => break,
            }
        }
        Ok(Some(file))
    }

    fn read_hunk(&mut self, header: &str) -> Result<Hunk> {
        let caps = HUNK_HEADER
            .captures(header)
            .ok_or_else(|| self.parse_error(format!("malformed hunk header {header:?}")))?;
        let num = |i: usize, default: u32| -> u32 {
            caps.get(i)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(default)
        };
        let mut hunk = Hunk {
            orig_start: num(1, 0),
            orig_lines: num(2, 1),
            new_start: num(3, 0),
            new_lines: num(4, 1),
            section: caps.get(5).map_or("", |m| m.as_str()).to_string(),
            body: Vec::new(),
        };

        let mut orig_left = hunk.orig_lines;
        let mut new_left = hunk.new_lines;
        while orig_left > 0 || new_left > 0 {
            let Some(line) = self.next_line()? else {
                return Err(self.parse_error("unexpected end of hunk"));
            };
            match line.as_bytes().first() {
                Some(b'+') if new_left > 0 => new_left -= 1,
                Some(b'-') if orig_left > 0 => orig_left -= 1,
                // git emits an empty line for an empty context line in some modes
                Some(b' ') | None if orig_left > 0 && new_left > 0 => {
                    orig_left -= 1;
                    new_left -= 1;
                }
                Some(b'\\') => {}
                _ => {
                    return Err(self.parse_error(format!("unexpected hunk line {line:?}")));
                }
            }
            hunk.body.push(line);
        }
        // trailing "\ No newline at end of file"
        if let Some(line) = self.next_line()? {
            if line.starts_with('\\') {
                hunk.body.push(line);
            } else {
                self.push_back(line);
            }
        }
        Ok(hunk)
    }
}

impl<R: BufRead> Iterator for MultiFileDiffReader<R> {
    type Item = Result<FileDiff>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.read_file().transpose();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

/// Split `a/x b/x` style names. Without prefixes and with spaces in names the
/// split is ambiguous; the `---`/`+++` or rename lines override it anyway.
fn split_header_names(names: &str) -> Option<(&str, &str)> {
    let half = names.len() / 2;
    if names.len() % 2 == 1 && names.as_bytes().get(half) == Some(&b' ') {
        let (a, b) = (&names[..half], &names[half + 1..]);
        if a == b {
            return Some((a, b));
        }
    }
    names.split_once(' ')
}

/// Sum the statistics of every file in a diff stream.
pub fn stat_stream<R: BufRead>(reader: R) -> Result<DiffStat> {
    let mut total = DiffStat::default();
    for file in MultiFileDiffReader::new(reader) {
        total.accumulate(file?.stat());
    }
    Ok(total)
}
