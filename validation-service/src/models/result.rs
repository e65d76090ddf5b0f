use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::validator::ValidatorKind;

/// Badge kinds a stored Result may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Badge {
    Success,
    Warning,
    Failure,
    InProgress,
    Unavailable,
}

impl Badge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Badge::Success => "success",
            Badge::Warning => "warning",
            Badge::Failure => "failure",
            Badge::InProgress => "in-progress",
            Badge::Unavailable => "unavailable",
        }
    }

    /// Whether a job that produced this badge has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Badge::Success | Badge::Warning | Badge::Failure)
    }
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One structured finding produced by a validator adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            location: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            location: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Metadata written next to each revision's report and badge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub validator: ValidatorKind,
    pub owner: String,
    pub repo: String,
    pub revision: String,
    pub badge: Badge,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

/// A revision directory as listed in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub revision: String,
    pub badge: Badge,
    pub modified: DateTime<Utc>,
}

/// Everything stored for one revision.
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub record: ResultRecord,
    pub report: Vec<u8>,
}
