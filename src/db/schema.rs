pub const SCHEMA_VERSION: i32 = 1;

pub const SCHEMA_V1: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY,
    version INTEGER NOT NULL
);

-- Survey roster, one row per canonical phone
CREATE TABLE IF NOT EXISTS participants (
    phone TEXT PRIMARY KEY,
    consent_status TEXT NOT NULL DEFAULT 'pending'
        CHECK(consent_status IN ('pending', 'consented', 'declined')),
    consent_timestamp TEXT,
    email TEXT,
    survey_sent INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    calltime TEXT,
    last_fed_vote_intent TEXT,
    gender TEXT,
    age TEXT,
    education TEXT,
    phone_type TEXT,
    region TEXT,
    notes TEXT
);

-- Every inbound SMS, sender exactly as the transport reported it
CREATE TABLE IF NOT EXISTS responses (
    id TEXT PRIMARY KEY,
    phone TEXT NOT NULL,
    body TEXT NOT NULL,
    received_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_participant_status ON participants(consent_status, survey_sent);
CREATE INDEX IF NOT EXISTS idx_participant_created ON participants(created_at);
CREATE INDEX IF NOT EXISTS idx_response_phone ON responses(phone);
CREATE INDEX IF NOT EXISTS idx_response_received ON responses(received_at);
"#;
