use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::AuditEntry;

/// Mirrors the audit trail to an append-only JSONL file, one entry per line.
///
/// The file is opened per append so a writer can sit in shared state without
/// interior mutability, and so that the on-disk trail survives a crash at any
/// point between appends.
pub struct AuditLogWriter {
    path: PathBuf,
}

impl AuditLogWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &AuditEntry) -> Result<()> {
        let line = serde_json::to_string(entry).context("Failed to serialize audit entry")?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open audit log {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("Failed to append to audit log {}", self.path.display()))?;

        Ok(())
    }

    /// Read back all persisted entries. Missing file means an empty trail.
    pub fn load(&self) -> Result<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read audit log {}", self.path.display()))?;

        content
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| {
                serde_json::from_str(line).context("Failed to parse audit log line")
            })
            .collect()
    }
}
