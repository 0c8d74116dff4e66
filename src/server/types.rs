//! Request and response bodies for the admin API.

use serde::{Deserialize, Serialize};

use crate::ingest::{IngestReport, RejectedRow};
use crate::models::{BatchSummary, Participant, ParticipantFilter};

/// Envelope for every JSON reply: `{"status": "success"|"error", "message": ..., ...data}`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T = ()> {
    pub status: &'static str,
    pub message: String,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
            data: None,
        }
    }
}

// ==================== REQUESTS ====================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PhoneListRequest {
    pub phone_numbers: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub filters: ParticipantFilter,
}

/// Either `phone_numbers` or `filters` selects the recipients.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TargetedSurveyRequest {
    pub survey_url: String,
    pub phone_numbers: Option<Vec<String>>,
    pub filters: Option<ParticipantFilter>,
    pub custom_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MassSmsRequest {
    pub phone_numbers: Vec<String>,
    pub message: String,
}

// ==================== RESPONSES ====================

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub uptime_secs: u64,
    pub participants: i64,
    pub responses: i64,
    pub sms_sender: String,
    pub sms_ready: bool,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantList {
    pub count: usize,
    pub participants: Vec<Participant>,
}

impl From<Vec<Participant>> for ParticipantList {
    fn from(participants: Vec<Participant>) -> Self {
        Self {
            count: participants.len(),
            participants,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsentSent {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResult {
    #[serde(flatten)]
    pub report: IngestReport,
    /// Present when consent requests went out right after the upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent: Option<BatchSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhoneUpload {
    pub count: usize,
    pub phone_numbers: Vec<String>,
    pub rejected: Vec<RejectedRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cleared {
    pub participants_deleted: usize,
    pub responses_deleted: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetResult {
    pub reset: usize,
}
