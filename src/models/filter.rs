use serde::{Deserialize, Serialize};

/// Targeting filter over consented participants. Every set field narrows the
/// result (AND composition).
///
/// Dashboard forms post every field, often as strings, so numeric and boolean
/// fields also accept their string spellings and empty strings mean "unset".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantFilter {
    /// Case-insensitive equality
    #[serde(deserialize_with = "empty_string_as_none")]
    pub gender: Option<String>,
    /// Case-insensitive equality
    #[serde(deserialize_with = "empty_string_as_none")]
    pub phone_type: Option<String>,
    /// Case-insensitive substring
    #[serde(deserialize_with = "empty_string_as_none")]
    pub region: Option<String>,
    /// Case-insensitive substring
    #[serde(deserialize_with = "empty_string_as_none")]
    pub education: Option<String>,
    /// Case-insensitive substring on `last_fed_vote_intent`
    #[serde(deserialize_with = "empty_string_as_none")]
    pub vote_intent: Option<String>,
    #[serde(deserialize_with = "lenient_int")]
    pub age_min: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub age_max: Option<i64>,
    /// Exact string match on the stored age
    #[serde(deserialize_with = "empty_string_as_none")]
    pub age_exact: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub has_email: Option<bool>,
    #[serde(deserialize_with = "lenient_bool")]
    pub survey_sent: Option<bool>,
    /// RFC 3339 instant or `YYYY-MM-DD`
    #[serde(deserialize_with = "empty_string_as_none")]
    pub created_after: Option<String>,
    /// RFC 3339 instant or `YYYY-MM-DD`
    #[serde(deserialize_with = "empty_string_as_none")]
    pub created_before: Option<String>,
}

/// Deserialize empty strings as None.
fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntOrText {
    Int(i64),
    Float(f64),
    Text(String),
}

fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<IntOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IntOrText::Int(n)) => Ok(Some(n)),
        Some(IntOrText::Float(f)) => Ok(Some(f.trunc() as i64)),
        Some(IntOrText::Text(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("expected an integer, got '{}'", s)))
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrText {
    Bool(bool),
    Text(String),
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<BoolOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(BoolOrText::Bool(b)) => Ok(Some(b)),
        Some(BoolOrText::Text(s)) => match s.trim().to_lowercase().as_str() {
            "" | "any" | "all" => Ok(None),
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" => Ok(Some(false)),
            other => Err(serde::de::Error::custom(format!(
                "expected true or false, got '{}'",
                other
            ))),
        },
    }
}
