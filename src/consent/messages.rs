//! Fixed outbound message bodies.

pub const CONSENT_REQUEST: &str = "Hi! This is Pallas Data. You previously expressed interest in participating in our surveys. We'd like to text you survey links occasionally. Reply 'YES' to consent or 'NO' to opt out. You can also reply with your email address if you want to also get surveys emailed to you. Thanks!";

pub const UNKNOWN_SENDER: &str = "We couldn't identify your number in our system. Please text START to join our survey list.";

pub const CONSENT_CONFIRMED: &str = "Thank you for consenting! You'll receive survey links occasionally. Reply STOP anytime to unsubscribe.";

pub const OPTED_OUT: &str = "You've been removed from our survey list. Thank you!";

pub const HELP: &str = "Reply YES to consent to SMS surveys, NO to opt out, or provide your email address to sign up for both SMS and email surveys.";

pub fn email_saved(address: &str) -> String {
    format!(
        "Thanks! We've saved your email: {}. You're now signed up for email surveys. Reply STOP anytime to unsubscribe.",
        address
    )
}

/// Empty TwiML document returned to the provider's webhook call.
pub const EMPTY_TWIML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#;
