use serde::Serialize;

/// Per-recipient outcome of a fan-out. Individual failures never abort a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub success: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub phone: String,
    pub reason: String,
}

impl BatchSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_success(&mut self, phone: impl Into<String>) {
        self.success.push(phone.into());
    }

    pub fn push_failure(&mut self, phone: impl Into<String>, reason: impl Into<String>) {
        self.failed.push(BatchFailure {
            phone: phone.into(),
            reason: reason.into(),
        });
    }

    pub fn total(&self) -> usize {
        self.success.len() + self.failed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_serializes_as_success_and_failed() {
        let mut summary = BatchSummary::new();
        summary.push_success("+16475551212");
        summary.push_failure("+16475550000", "provider returned HTTP 400");

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["success"][0], "+16475551212");
        assert_eq!(json["failed"][0]["phone"], "+16475550000");
        assert_eq!(json["failed"][0]["reason"], "provider returned HTTP 400");
        assert_eq!(summary.total(), 2);
    }
}
