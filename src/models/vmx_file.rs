use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use thiserror::Error;

/// Key holding the guest operating system identifier.
pub const GUEST_OS_KEY: &str = "guestOS";

/// Guest OS value used when a file does not declare one. Matches no policy rule.
pub const UNKNOWN_GUEST_OS: &str = "Unknown";

/// Errors raised while loading a `.vmx` file
#[derive(Error, Debug)]
pub enum VmxError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A `.vmx` configuration file held as an ordered sequence of raw lines.
///
/// Each stored line is kept as bytes with its own terminator (`\n`, `\r\n`,
/// or none for an unterminated last line), so [`serialize`](Self::serialize)
/// reproduces every untouched line byte-for-byte whatever its encoding. Only
/// lines of the form `key = "value"` are interpreted; everything else is
/// carried as opaque payload. Values that are not valid UTF-8 are read lossily.
///
/// The guest OS identifier is extracted once at load time and cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmxFile {
    path: Utf8PathBuf,
    lines: Vec<Vec<u8>>,
    guest_os: String,
}

impl VmxFile {
    /// Load a file from disk.
    pub fn load(path: &Utf8Path) -> Result<Self, VmxError> {
        let content = fs::read(path).map_err(|source| VmxError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let file = Self::parse(path, &content);
        tracing::debug!(
            "Loaded {} ({} lines, guest OS {})",
            path,
            file.lines.len(),
            file.guest_os
        );
        Ok(file)
    }

    /// Build a line store from in-memory content.
    pub fn parse<C: AsRef<[u8]>>(path: &Utf8Path, content: C) -> Self {
        let lines: Vec<Vec<u8>> = content
            .as_ref()
            .split_inclusive(|&b| b == b'\n')
            .map(<[u8]>::to_vec)
            .collect();

        let guest_os = lines
            .iter()
            .find_map(|line| value_if_key(line, GUEST_OS_KEY))
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| UNKNOWN_GUEST_OS.to_string());

        Self {
            path: path.to_path_buf(),
            lines,
            guest_os,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Cached guest OS identifier, or [`UNKNOWN_GUEST_OS`].
    pub fn guest_os(&self) -> &str {
        &self.guest_os
    }

    /// Value of the first line whose leading token is exactly `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lines.iter().find_map(|line| value_if_key(line, key))
    }

    /// Iterate over the keys of all `key = value` lines, in file order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| split_key_value(line).map(|(key, _)| key))
    }

    /// Replace the value of the first line keyed by `key`, or append a new line.
    ///
    /// A replaced line keeps its indentation and terminator. Every other line
    /// is left untouched.
    pub fn set(&mut self, key: &str, value: &str) {
        let assignment = format!("{} = \"{}\"", key, value);

        if let Some(index) = self
            .lines
            .iter()
            .position(|line| split_key_value(line).is_some_and(|(k, _)| k == key))
        {
            let line = &self.lines[index];
            let body = strip_terminator(line);
            let indent_len = body.len() - body.trim_ascii_start().len();

            let mut replaced = Vec::with_capacity(line.len() + assignment.len());
            replaced.extend_from_slice(&body[..indent_len]);
            replaced.extend_from_slice(assignment.as_bytes());
            replaced.extend_from_slice(&line[body.len()..]);
            self.lines[index] = replaced;
            return;
        }

        let terminator = self.dominant_terminator();
        if let Some(last) = self.lines.last_mut() {
            if !last.ends_with(b"\n") {
                last.extend_from_slice(terminator);
            }
        }
        let mut appended = assignment.into_bytes();
        appended.extend_from_slice(terminator);
        self.lines.push(appended);
    }

    /// Ordered raw lines, each with its original terminator.
    pub fn lines(&self) -> &[Vec<u8>] {
        &self.lines
    }

    /// Full file content ready for persistence.
    pub fn serialize(&self) -> Vec<u8> {
        self.lines.concat()
    }

    fn dominant_terminator(&self) -> &'static [u8] {
        match self.lines.iter().find(|line| line.ends_with(b"\n")) {
            Some(line) if line.ends_with(b"\r\n") => b"\r\n",
            _ => b"\n",
        }
    }
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\n")
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
        .unwrap_or(line)
}

/// Split `key = value` on the first `=`, anchoring on the whole key token.
fn split_key_value(line: &[u8]) -> Option<(&str, &[u8])> {
    let body = strip_terminator(line).trim_ascii_start();
    let eq = body.iter().position(|&b| b == b'=')?;
    let key = std::str::from_utf8(body[..eq].trim_ascii_end()).ok()?;
    if key.is_empty() || key.contains(char::is_whitespace) || key.starts_with('#') {
        return None;
    }
    Some((key, body[eq + 1..].trim_ascii()))
}

fn value_if_key(line: &[u8], key: &str) -> Option<String> {
    let (k, value) = split_key_value(line)?;
    if k != key {
        return None;
    }
    let unquoted = value
        .strip_prefix(b"\"")
        .and_then(|v| v.strip_suffix(b"\""))
        .unwrap_or(value);
    Some(String::from_utf8_lossy(unquoted).into_owned())
}
