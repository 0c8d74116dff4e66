//! Runtime configuration
//!
//! Loaded once at startup from environment variables and threaded through
//! the server, dispatcher and SMS sender. Command-line flags may override
//! individual values after loading.

use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

// Environment variable names
const ENV_ACCOUNT_SID: &str = "TWILIO_ACCOUNT_SID";
const ENV_AUTH_TOKEN: &str = "TWILIO_AUTH_TOKEN";
const ENV_PHONE_NUMBER: &str = "TWILIO_PHONE_NUMBER";
const ENV_API_BASE: &str = "TWILIO_API_BASE";
const ENV_PORT: &str = "PORT";
const ENV_DB_PATH: &str = "SURVEY_DB_PATH";
const ENV_SEND_DELAY_MS: &str = "SMS_SEND_DELAY_MS";
const ENV_SMS_TIMEOUT_SECS: &str = "SMS_TIMEOUT_SECS";

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_API_BASE: &str = "https://api.twilio.com/2010-04-01";
pub const DEFAULT_SEND_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_SMS_TIMEOUT: Duration = Duration::from_secs(15);

/// Credentials for the SMS provider. Any missing value disables sending.
#[derive(Debug, Clone, Default)]
pub struct SmsCredentials {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub phone_number: Option<String>,
    pub api_base: String,
}

impl SmsCredentials {
    pub fn is_complete(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.phone_number.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub sms: SmsCredentials,
    /// Pause between consecutive sends in a batch.
    pub send_delay: Duration,
    pub sms_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get(ENV_PORT) {
            Some(p) => p
                .parse()
                .map_err(|_| anyhow!("{} must be a port number, got '{}'", ENV_PORT, p))?,
            None => DEFAULT_PORT,
        };

        let db_path = match get(ENV_DB_PATH) {
            Some(p) => PathBuf::from(p),
            None => default_db_path()?,
        };

        let send_delay = match get(ENV_SEND_DELAY_MS) {
            Some(ms) => Duration::from_millis(
                ms.parse()
                    .map_err(|_| anyhow!("{} must be milliseconds, got '{}'", ENV_SEND_DELAY_MS, ms))?,
            ),
            None => DEFAULT_SEND_DELAY,
        };

        let sms_timeout = match get(ENV_SMS_TIMEOUT_SECS) {
            Some(s) => Duration::from_secs(
                s.parse()
                    .map_err(|_| anyhow!("{} must be seconds, got '{}'", ENV_SMS_TIMEOUT_SECS, s))?,
            ),
            None => DEFAULT_SMS_TIMEOUT,
        };

        let sms = SmsCredentials {
            account_sid: get(ENV_ACCOUNT_SID),
            auth_token: get(ENV_AUTH_TOKEN),
            phone_number: get(ENV_PHONE_NUMBER),
            api_base: get(ENV_API_BASE)
                .map(|b| b.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        };

        Ok(Self {
            port,
            db_path,
            sms,
            send_delay,
            sms_timeout,
        })
    }
}

fn default_db_path() -> Result<PathBuf> {
    let config_dir =
        dirs::config_dir().ok_or_else(|| anyhow!("Could not find config directory"))?;
    Ok(config_dir.join("surveysms").join("survey.db"))
}
