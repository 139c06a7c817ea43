use anyhow::{Context, Result};
use std::{io::BufRead, path::PathBuf};

/// How a raw path string reached the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathStyle {
    /// Already resolved by the shell or another tool; used as typed.
    #[default]
    Literal,
    /// Pasted from a terminal drag-and-drop; see `normalize_dropped_path`.
    Dropped,
}

/// Ordered, deduplicated set of files and folders to scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathList {
    entries: Vec<String>,
}

impl PathList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `raw` with surrounding whitespace trimmed, unless an identical
    /// entry exists.
    pub fn push(&mut self, raw: &str) -> bool {
        self.insert(raw.trim().to_string())
    }

    /// Normalizes a drag-and-drop string and appends it.
    pub fn push_dropped(&mut self, raw: &str) -> bool {
        self.insert(normalize_dropped_path(raw))
    }

    pub fn push_as(&mut self, raw: &str, style: PathStyle) -> bool {
        match style {
            PathStyle::Literal => self.push(raw),
            PathStyle::Dropped => self.push_dropped(raw),
        }
    }

    pub fn extend_from_lines<R: BufRead>(&mut self, reader: R, style: PathStyle) -> Result<usize> {
        let mut added = 0usize;
        for line in reader.lines() {
            let line = line.context("read path list")?;
            if self.push_as(&line, style) {
                added += 1;
            }
        }
        Ok(added)
    }

    fn insert(&mut self, value: String) -> bool {
        if value.is_empty() || self.entries.iter().any(|entry| *entry == value) {
            return false;
        }
        self.entries.push(value);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

/// Cleans up a path as pasted by a terminal drag-and-drop.
///
/// Handles surrounding quotes, `file://` URLs, backslash escapes, percent
/// escapes and a leading `~`. Braces are left alone.
pub fn normalize_dropped_path(input: &str) -> String {
    let mut value = strip_outer_quotes(input.trim());
    if let Some(rest) = value.strip_prefix("file://") {
        value = rest.strip_prefix("localhost").unwrap_or(rest).to_string();
    }
    if value.contains('\\') && !cfg!(windows) {
        value = unescape_shell(&value);
    }
    if value.contains('%') {
        value = percent_decode(&value);
    }
    if let Some(stripped) = value.strip_prefix('~') {
        if stripped.is_empty() || stripped.starts_with('/') {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home)
                    .join(stripped.trim_start_matches('/'))
                    .to_string_lossy()
                    .into_owned();
            }
        }
    }
    value
}

fn strip_outer_quotes(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        return value[1..bytes.len() - 1].to_string();
    }
    value.to_string()
}

fn unescape_shell(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' && idx + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (from_hex(bytes[idx + 1]), from_hex(bytes[idx + 2])) {
                out.push(hi << 4 | lo);
                idx += 3;
                continue;
            }
        }
        out.push(bytes[idx]);
        idx += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn from_hex(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
