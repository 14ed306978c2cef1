//! File-backed account store and margin persistence.
//!
//! Each account lives in its own `*.account` file of `key = value` lines:
//!
//! ```text
//! # ACME LTL, national account
//! name = acme-ltl
//! carrier = ACME
//! margin = 18.5
//! api_key = ...
//! ```
//!
//! `name`, `carrier` and `margin` are the typed core; every other key is kept in
//! the record's extension map. Lines are round-tripped verbatim, so a margin
//! update changes only the margin value (or appends one line).
//!
//! Writes go through a temp file in the same directory and an atomic rename.
//! The in-memory record changes only after the rename succeeds, and writers to
//! one account are serialized by that account's lock.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::AccountRecord;
use crate::error::PricingError;
use crate::pricing::{MarginSink, validate_margin};

pub const ACCOUNT_EXTENSION: &str = "account";

const MARGIN_KEY: &str = "margin";

#[derive(Debug, Clone, PartialEq)]
enum Line {
    /// `lead` is everything up to the value (key, `=`, spacing), `tail` any trailing whitespace.
    Field { key: String, lead: String, value: String, tail: String },
    Other(String),
}

/// Parsed account file that reserializes byte-for-byte.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountDocument {
    lines: Vec<Line>,
    newline: &'static str,
    trailing_newline: bool,
}

impl AccountDocument {
    pub fn parse(text: &str) -> Self {
        let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
        let trailing_newline = text.ends_with('\n');
        let lines = text.lines().map(parse_line).collect();
        Self {
            lines,
            newline,
            trailing_newline,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|l| match l {
            Line::Field { key: k, value, .. } if k.eq_ignore_ascii_case(key) => Some(value.as_str()),
            _ => None,
        })
    }

    fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|l| match l {
            Line::Field { key, value, .. } => Some((key.as_str(), value.as_str())),
            Line::Other(_) => None,
        })
    }

    /// Replace the first `key` line's value in place, or append `key = value`.
    pub fn set(&mut self, key: &str, value: &str) {
        for line in &mut self.lines {
            if let Line::Field { key: k, value: v, .. } = line {
                if k.eq_ignore_ascii_case(key) {
                    *v = value.to_string();
                    return;
                }
            }
        }
        self.lines.push(Line::Field {
            key: key.to_string(),
            lead: format!("{key} = "),
            value: value.to_string(),
            tail: String::new(),
        });
        self.trailing_newline = true;
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push_str(self.newline);
            }
            match line {
                Line::Field { lead, value, tail, .. } => {
                    out.push_str(lead);
                    out.push_str(value);
                    out.push_str(tail);
                }
                Line::Other(raw) => out.push_str(raw),
            }
        }
        if self.trailing_newline && !self.lines.is_empty() {
            out.push_str(self.newline);
        }
        out
    }

    /// Typed view of the document. `fallback_name` is used when there is no `name` key.
    pub fn to_record(&self, fallback_name: &str, path: &Path) -> Result<AccountRecord, String> {
        let margin = match self.get(MARGIN_KEY) {
            Some(raw) if !raw.is_empty() => {
                let v: f64 = raw
                    .parse()
                    .map_err(|_| format!("invalid margin value '{raw}'"))?;
                Some(validate_margin(v).map_err(|e| e.to_string())?)
            }
            _ => None,
        };

        let mut extra = BTreeMap::new();
        for (key, value) in self.fields() {
            let lower = key.to_ascii_lowercase();
            if !matches!(lower.as_str(), "name" | "carrier" | MARGIN_KEY) {
                extra.insert(key.to_string(), value.to_string());
            }
        }

        Ok(AccountRecord {
            name: self
                .get("name")
                .filter(|n| !n.is_empty())
                .unwrap_or(fallback_name)
                .to_string(),
            carrier: self.get("carrier").filter(|c| !c.is_empty()).map(str::to_string),
            margin,
            extra,
            path: path.to_path_buf(),
        })
    }
}

fn parse_line(raw: &str) -> Line {
    let trimmed = raw.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
        return Line::Other(raw.to_string());
    }
    let Some(eq) = raw.find('=') else {
        return Line::Other(raw.to_string());
    };
    let key = raw[..eq].trim();
    if key.is_empty() {
        return Line::Other(raw.to_string());
    }

    let after = &raw[eq + 1..];
    let value_start = eq + 1 + (after.len() - after.trim_start().len());
    let rest = &raw[value_start..];
    let value = rest.trim_end();

    Line::Field {
        key: key.to_string(),
        lead: raw[..value_start].to_string(),
        value: value.to_string(),
        tail: rest[value.len()..].to_string(),
    }
}

/// A margin at the precision it is stored with (4 decimals).
pub fn round_margin(margin: f64) -> f64 {
    let rounded = (margin * 10_000.0).round() / 10_000.0;
    // Folds `-0` into `0`.
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Canonical text for a margin value (`15.5`, `20`, `0`). Parses back to
/// exactly `round_margin(margin)`.
pub fn format_margin(margin: f64) -> String {
    format!("{}", round_margin(margin))
}

/// Writes a full file. Swappable so tests can simulate disk failures.
pub trait RecordWriter: Send + Sync {
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// Temp file in the target's directory, fsync, then rename over the target.
#[derive(Debug, Default, Clone, Copy)]
pub struct AtomicFileWriter;

impl RecordWriter for AtomicFileWriter {
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Keyed collection of accounts backed by a directory of `*.account` files.
pub struct AccountStore {
    dir: PathBuf,
    accounts: BTreeMap<String, Mutex<AccountRecord>>,
    writer: Box<dyn RecordWriter>,
}

/// A file that could not be loaded as an account.
#[derive(Debug, Clone)]
pub struct AccountLoadError {
    pub path: PathBuf,
    pub message: String,
}

impl AccountStore {
    /// Load every `*.account` file under `dir`. Unreadable or invalid files are
    /// reported and left out of the store.
    pub fn open(dir: &Path) -> Result<(Self, Vec<AccountLoadError>), PricingError> {
        let entries = fs::read_dir(dir).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PricingError::NotFound(format!("account directory '{}'", dir.display())),
            _ => PricingError::InvalidInput(format!("cannot read account directory '{}': {e}", dir.display())),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == ACCOUNT_EXTENSION))
            .collect();
        paths.sort();

        let mut accounts = BTreeMap::new();
        let mut errors = Vec::new();
        for path in paths {
            match load_record(&path) {
                Ok(record) => {
                    if accounts.contains_key(&record.name) {
                        errors.push(AccountLoadError {
                            path,
                            message: format!("duplicate account name '{}'", record.name),
                        });
                        continue;
                    }
                    accounts.insert(record.name.clone(), Mutex::new(record));
                }
                Err(message) => {
                    warn!(path = %path.display(), %message, "skipping account file");
                    errors.push(AccountLoadError { path, message });
                }
            }
        }

        debug!(dir = %dir.display(), accounts = accounts.len(), "opened account store");
        Ok((
            Self {
                dir: dir.to_path_buf(),
                accounts,
                writer: Box::new(AtomicFileWriter),
            },
            errors,
        ))
    }

    pub fn with_writer(mut self, writer: Box<dyn RecordWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Snapshot of one account.
    pub fn get(&self, name: &str) -> Option<AccountRecord> {
        self.accounts.get(name).map(|r| r.lock().clone())
    }

    /// Snapshot of every account, ordered by name.
    pub fn records(&self) -> Vec<AccountRecord> {
        self.accounts.values().map(|r| r.lock().clone()).collect()
    }

    /// Validate, persist, then mirror a new margin for `name`.
    pub fn set_margin(&self, name: &str, margin: f64) -> Result<(), PricingError> {
        validate_margin(margin)?;
        // What lands on disk must itself be a valid margin, and memory mirrors it exactly.
        let margin = validate_margin(round_margin(margin)).map_err(|_| PricingError::InvalidMargin(margin))?;
        let entry = self
            .accounts
            .get(name)
            .ok_or_else(|| PricingError::NotFound(format!("account '{name}'")))?;

        let mut record = entry.lock();
        let path = record.path.clone();

        let text = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PricingError::NotFound(format!("account file '{}'", path.display())),
            _ => PricingError::Persist {
                path: path.clone(),
                source: e,
            },
        })?;

        let mut doc = AccountDocument::parse(&text);
        doc.set(MARGIN_KEY, &format_margin(margin));
        let rendered = doc.render();

        if rendered == text {
            debug!(account = name, margin, "margin unchanged on disk");
        } else {
            self.writer
                .write(&path, rendered.as_bytes())
                .map_err(|source| PricingError::Persist {
                    path: path.clone(),
                    source,
                })?;
        }

        let previous = record.margin.replace(margin);
        info!(account = name, ?previous, margin, "margin updated");
        Ok(())
    }
}

impl MarginSink for AccountStore {
    fn apply_margin(&self, account: &str, margin: f64) -> Result<(), PricingError> {
        self.set_margin(account, margin)
    }
}

fn load_record(path: &Path) -> Result<AccountRecord, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("read failed: {e}"))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| "file name is not valid UTF-8".to_string())?;
    AccountDocument::parse(&text).to_record(stem, path)
}
