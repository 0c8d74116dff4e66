//! Outbound SMS transport.

use crate::error::SurveyResult;

mod twilio;

pub use twilio::TwilioSender;

/// Trait for anything that can deliver a text message.
pub trait SmsSender: Send + Sync {
    /// Send `body` to `to`. Returns `SurveyError::Transport` on any failure.
    fn send(&self, to: &str, body: &str) -> SurveyResult<()>;

    /// Get the name of this sender for display purposes
    fn name(&self) -> &str;

    /// Check if this sender has what it needs to send
    fn is_ready(&self) -> bool;
}
