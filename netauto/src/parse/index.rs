//! Template index: which template parses which command on which platform.
//!
//! The index is a comma-separated file whose first non-comment line is a
//! header naming at least the `Template`, `Platform` and `Command` columns:
//!
//! ```text
//! Template, Hostname, Platform, Command
//!
//! cisco_ios_show_version.textfsm, .*, cisco_ios, sh[[ow]] ver[[sion]]
//! ```
//!
//! `[[ow]]` marks an optional completion of the preceding word.

use std::path::Path;

use log::debug;
use regex::Regex;

use crate::error::TemplateError;

/// One index record.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Template file names; the first one is used.
    pub templates: Vec<String>,
    pub platform: Regex,
    /// Command as written, with completions expanded to regex.
    pub command: Regex,
    /// Command as written in the index.
    pub command_text: String,
    /// Line in the index file.
    pub line: usize,
}

impl IndexEntry {
    fn matches(&self, platform: &str, command: &str) -> bool {
        self.platform.is_match(platform)
            && (self.command_text == command || self.command.is_match(command))
    }
}

/// Ordered template index. Read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct TemplateIndex {
    entries: Vec<IndexEntry>,
}

impl TemplateIndex {
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let text = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let index = Self::parse_str(&text)?;
        debug!("loaded {} index entries from {}", index.len(), path.display());
        Ok(index)
    }

    pub fn parse_str(text: &str) -> Result<Self, TemplateError> {
        let mut rows = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

        let (header_line, header) = rows.next().ok_or_else(|| TemplateError::Syntax {
            line: 0,
            message: "index is empty".into(),
        })?;
        let columns: Vec<&str> = header.split(',').map(str::trim).collect();
        let column = |name: &str| {
            columns
                .iter()
                .position(|c| *c == name)
                .ok_or_else(|| TemplateError::Syntax {
                    line: header_line,
                    message: format!("index header lacks a '{name}' column"),
                })
        };
        let template_col = column("Template")?;
        let platform_col = column("Platform")?;
        let command_col = column("Command")?;

        let mut entries = Vec::new();
        for (line, row) in rows {
            let fields: Vec<&str> = row.split(',').map(str::trim).collect();
            if fields.len() != columns.len() {
                return Err(TemplateError::Syntax {
                    line,
                    message: format!("expected {} columns, found {}", columns.len(), fields.len()),
                });
            }

            let command_text = fields[command_col].to_string();
            let platform = anchored(fields[platform_col], line)?;
            let command = anchored(&expand_completions(&command_text), line)?;
            entries.push(IndexEntry {
                templates: fields[template_col].split(':').map(str::to_string).collect(),
                platform,
                command,
                command_text,
                line,
            });
        }
        Ok(Self { entries })
    }

    /// First entry, in file order, matching `platform` and `command`.
    pub fn lookup(&self, platform: &str, command: &str) -> Option<&IndexEntry> {
        let command = command.trim();
        self.entries.iter().find(|e| e.matches(platform, command))
    }

    /// Template file name for `platform` and `command`.
    pub fn template_for(&self, platform: &str, command: &str) -> Option<&str> {
        self.lookup(platform, command)
            .and_then(|e| e.templates.first())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compile a pattern that must match at the start of the input.
fn anchored(pattern: &str, line: usize) -> Result<Regex, TemplateError> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|source| TemplateError::Regex { line, source })
}

/// Turn `sh[[ow]]` into `sh(o(w)?)?`.
fn expand_completions(command: &str) -> String {
    let mut out = String::with_capacity(command.len() * 2);
    let mut rest = command;
    while let Some(start) = rest.find("[[") {
        let Some(len) = rest[start + 2..].find("]]") else {
            break;
        };
        out.push_str(&rest[..start]);
        let word = &rest[start + 2..start + 2 + len];
        for c in word.chars() {
            out.push('(');
            out.push_str(&regex::escape(&c.to_string()));
        }
        out.push_str(&")?".repeat(word.chars().count()));
        rest = &rest[start + 2 + len + 2..];
    }
    out.push_str(rest);
    out
}
