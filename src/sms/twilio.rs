//! Twilio-compatible REST sender.
//!
//! Posts form-encoded `To`/`From`/`Body` to `{base}/Accounts/{sid}/Messages.json`
//! with HTTP Basic auth. Only `201 Created` counts as sent.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use super::SmsSender;
use crate::config::SmsCredentials;
use crate::error::{SurveyError, SurveyResult};

pub struct TwilioSender {
    client: Client,
    credentials: SmsCredentials,
}

impl TwilioSender {
    pub fn new(credentials: SmsCredentials, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("surveysms/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            credentials,
        })
    }

    fn messages_url(&self, account_sid: &str) -> String {
        format!("{}/Accounts/{}/Messages.json", self.credentials.api_base, account_sid)
    }
}

impl SmsSender for TwilioSender {
    fn send(&self, to: &str, body: &str) -> SurveyResult<()> {
        let (Some(sid), Some(token), Some(from)) = (
            self.credentials.account_sid.as_deref(),
            self.credentials.auth_token.as_deref(),
            self.credentials.phone_number.as_deref(),
        ) else {
            return Err(SurveyError::Transport(
                "SMS credentials are not configured".to_string(),
            ));
        };

        let response = self
            .client
            .post(self.messages_url(sid))
            .basic_auth(sid, Some(token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .map_err(|e| SurveyError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::CREATED {
            debug!(to, "SMS accepted by provider");
            Ok(())
        } else {
            let detail = response.text().unwrap_or_default();
            Err(SurveyError::Transport(format!(
                "provider returned HTTP {}: {}",
                status.as_u16(),
                detail.trim()
            )))
        }
    }

    fn name(&self) -> &str {
        "twilio"
    }

    fn is_ready(&self) -> bool {
        self.credentials.is_complete()
    }
}
