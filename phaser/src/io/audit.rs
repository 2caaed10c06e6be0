//! Append-only activity trail (`.phaser/logs/activity_log.csv`).
//!
//! One CSV row per event under a header row written when the file is created.
//! The trail is written, never read back, and is independent of `RUST_LOG`. A
//! failed write is logged and otherwise ignored.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Login,
    SecurityChallenge,
    Like,
    Comment,
    PostInteraction,
    Browser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Failed,
    Error,
    Checkpoint,
    Captcha,
    #[serde(rename = "2FA")]
    TwoFactor,
    Skipped,
}

/// One row of the trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub account: String,
    pub action: AuditAction,
    pub status: AuditStatus,
    pub details: String,
    pub resource: Option<String>,
    pub duration_seconds: Option<f64>,
}

impl AuditRecord {
    pub fn new(account: &str, action: AuditAction, status: AuditStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            account: account.to_string(),
            action,
            status,
            details: String::new(),
            resource: None,
            duration_seconds: None,
        }
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn resource(mut self, resource: &str) -> Self {
        self.resource = Some(resource.to_string());
        self
    }

    pub fn duration(mut self, elapsed: Duration) -> Self {
        self.duration_seconds = Some((elapsed.as_secs_f64() * 100.0).round() / 100.0);
        self
    }
}

/// Writer for the activity trail.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a row. Never fails the caller.
    pub fn record(&self, record: &AuditRecord) {
        if let Err(err) = self.append(record) {
            error!(path = %self.path.display(), error = %format!("{err:#}"), "audit write failed");
        }
    }

    fn append(&self, record: &AuditRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let needs_header = fs::metadata(&self.path).map_or(true, |meta| meta.len() == 0);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer
            .serialize(record)
            .with_context(|| format!("append {}", self.path.display()))?;
        writer
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))?;
        Ok(())
    }
}
