use chrono::{DateTime, Utc};
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Badge, Diagnostic, HistoryEntry, StoredResult, ValidatorKind};

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationAccepted {
    pub status: String,
    pub job_id: Uuid,
    pub validator: ValidatorKind,
    pub repository: String,
    pub revision: String,
}

/// Body of `POST /pubvalidate`. The validator defaults to BIDS.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicValidationRequest {
    pub repository: String,
    #[serde(default)]
    pub validator: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: Secret<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultState {
    NotValidated,
    InProgress,
    Completed,
}

/// JSON rendering of a stored result and its history.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResultsView {
    pub validator: ValidatorKind,
    pub repository: String,
    pub state: ResultState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<Badge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Parsed JSON when the report is JSON, the raw text otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<serde_json::Value>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl ResultsView {
    pub fn new(
        validator: ValidatorKind,
        repository: String,
        stored: Option<StoredResult>,
        history: Vec<HistoryEntry>,
    ) -> Self {
        let Some(stored) = stored else {
            return Self {
                validator,
                repository,
                state: ResultState::NotValidated,
                revision: None,
                badge: None,
                timestamp: None,
                report: None,
                diagnostics: Vec::new(),
                history,
            };
        };

        let state = if stored.record.badge == Badge::InProgress {
            ResultState::InProgress
        } else {
            ResultState::Completed
        };
        let report = serde_json::from_slice(&stored.report).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&stored.report).into_owned())
        });

        Self {
            validator,
            repository,
            state,
            revision: Some(stored.record.revision),
            badge: Some(stored.record.badge),
            timestamp: Some(stored.record.timestamp),
            report: Some(report),
            diagnostics: stored.record.diagnostics,
            history,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub validator: ValidatorKind,
    pub repository: String,
    pub history: Vec<HistoryEntry>,
}
