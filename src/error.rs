//! Error kinds surfaced by survey operations.

use thiserror::Error;

/// Result type for operations that report a [`SurveyError`].
pub type SurveyResult<T> = std::result::Result<T, SurveyError>;

/// Error kinds shared by the engine, dispatcher and HTTP layer.
#[derive(Error, Debug)]
pub enum SurveyError {
    /// Bad phone, missing survey URL, empty message, unreadable CSV.
    #[error("{0}")]
    InvalidInput(String),

    /// Requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The SMS provider rejected or never answered the request.
    #[error("Send failed: {0}")]
    Transport(String),

    /// Roster store read or write failed.
    #[error("Database error: {0}")]
    Store(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Fatal(String),
}

impl SurveyError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// HTTP status used when the error reaches a client.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::NotFound(_) => 404,
            Self::Transport(_) => 502,
            Self::Store(_) | Self::Fatal(_) => 500,
        }
    }
}

impl From<rusqlite::Error> for SurveyError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<csv::Error> for SurveyError {
    fn from(e: csv::Error) -> Self {
        Self::InvalidInput(format!("Could not parse CSV: {}", e))
    }
}

impl From<anyhow::Error> for SurveyError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<SurveyError>() {
            Ok(inner) => inner,
            Err(e) => match e.downcast::<rusqlite::Error>() {
                Ok(db) => Self::Store(db.to_string()),
                Err(e) => Self::Fatal(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(SurveyError::invalid("bad phone").http_status(), 400);
        assert_eq!(SurveyError::NotFound("x".into()).http_status(), 404);
        assert_eq!(SurveyError::Transport("x".into()).http_status(), 502);
        assert_eq!(SurveyError::Store("x".into()).http_status(), 500);
        assert_eq!(SurveyError::Fatal("x".into()).http_status(), 500);
    }

    #[test]
    fn invalid_input_message_is_bare() {
        let err = SurveyError::invalid("Survey URL is required");
        assert_eq!(err.to_string(), "Survey URL is required");
    }

    #[test]
    fn anyhow_round_trips_survey_error() {
        let err: anyhow::Error = SurveyError::invalid("empty").into();
        let back: SurveyError = err.into();
        assert!(matches!(back, SurveyError::InvalidInput(ref m) if m == "empty"));
    }

    #[test]
    fn anyhow_database_error_becomes_store() {
        let err: anyhow::Error = rusqlite::Error::QueryReturnedNoRows.into();
        let back: SurveyError = err.into();
        assert!(matches!(back, SurveyError::Store(_)));
    }
}
