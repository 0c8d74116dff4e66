use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsentStatus {
    #[default]
    Pending,
    Consented,
    Declined,
}

impl ConsentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Consented => "consented",
            Self::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "consented" => Self::Consented,
            "declined" => Self::Declined,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Demographic column that can be filled from an uploaded CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Calltime,
    LastFedVoteIntent,
    Gender,
    Age,
    Education,
    PhoneType,
    Region,
    Notes,
}

impl Attribute {
    pub const ALL: [Attribute; 8] = [
        Self::Calltime,
        Self::LastFedVoteIntent,
        Self::Gender,
        Self::Age,
        Self::Education,
        Self::PhoneType,
        Self::Region,
        Self::Notes,
    ];

    /// Database column name.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Calltime => "calltime",
            Self::LastFedVoteIntent => "last_fed_vote_intent",
            Self::Gender => "gender",
            Self::Age => "age",
            Self::Education => "education",
            Self::PhoneType => "phone_type",
            Self::Region => "region",
            Self::Notes => "notes",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attributes {
    pub calltime: Option<String>,
    pub last_fed_vote_intent: Option<String>,
    pub gender: Option<String>,
    pub age: Option<String>,
    pub education: Option<String>,
    pub phone_type: Option<String>,
    pub region: Option<String>,
    pub notes: Option<String>,
}

impl Attributes {
    pub fn get(&self, attr: Attribute) -> Option<&str> {
        self.slot(attr).as_deref()
    }

    pub fn set(&mut self, attr: Attribute, value: Option<String>) {
        *self.slot_mut(attr) = value;
    }

    pub fn is_empty(&self) -> bool {
        Attribute::ALL.iter().all(|a| self.get(*a).is_none())
    }

    fn slot(&self, attr: Attribute) -> &Option<String> {
        match attr {
            Attribute::Calltime => &self.calltime,
            Attribute::LastFedVoteIntent => &self.last_fed_vote_intent,
            Attribute::Gender => &self.gender,
            Attribute::Age => &self.age,
            Attribute::Education => &self.education,
            Attribute::PhoneType => &self.phone_type,
            Attribute::Region => &self.region,
            Attribute::Notes => &self.notes,
        }
    }

    fn slot_mut(&mut self, attr: Attribute) -> &mut Option<String> {
        match attr {
            Attribute::Calltime => &mut self.calltime,
            Attribute::LastFedVoteIntent => &mut self.last_fed_vote_intent,
            Attribute::Gender => &mut self.gender,
            Attribute::Age => &mut self.age,
            Attribute::Education => &mut self.education,
            Attribute::PhoneType => &mut self.phone_type,
            Attribute::Region => &mut self.region,
            Attribute::Notes => &mut self.notes,
        }
    }
}

/// A roster entry, keyed by canonical phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub phone: String,
    pub consent_status: ConsentStatus,
    pub consent_timestamp: Option<DateTime<Utc>>,
    pub email: Option<String>,
    pub survey_sent: bool,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl Participant {
    pub fn new(phone: String) -> Self {
        Self {
            phone,
            consent_status: ConsentStatus::Pending,
            consent_timestamp: None,
            email: None,
            survey_sent: false,
            created_at: Utc::now(),
            attributes: Attributes::default(),
        }
    }

    pub fn with_attributes(phone: String, attributes: Attributes) -> Self {
        Self {
            attributes,
            ..Self::new(phone)
        }
    }
}

/// Field-level update applied by phone. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantPatch {
    pub consent_status: Option<ConsentStatus>,
    pub consent_timestamp: Option<DateTime<Utc>>,
    pub email: Option<String>,
    pub survey_sent: Option<bool>,
}

impl ParticipantPatch {
    pub fn consent(at: DateTime<Utc>) -> Self {
        Self {
            consent_status: Some(ConsentStatus::Consented),
            consent_timestamp: Some(at),
            ..Self::default()
        }
    }

    pub fn decline() -> Self {
        Self {
            consent_status: Some(ConsentStatus::Declined),
            ..Self::default()
        }
    }

    /// Supplying an email counts as consent.
    pub fn email(address: String, at: DateTime<Utc>) -> Self {
        Self {
            email: Some(address),
            ..Self::consent(at)
        }
    }

    pub fn survey_sent(sent: bool) -> Self {
        Self {
            survey_sent: Some(sent),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.consent_status.is_none()
            && self.consent_timestamp.is_none()
            && self.email.is_none()
            && self.survey_sent.is_none()
    }
}
