use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit record of one inbound SMS, stored exactly as the transport reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    pub phone: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl Response {
    pub fn new(phone: String, body: String, received_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            phone,
            body,
            received_at,
        }
    }
}
