//! Consent state machine driven by inbound SMS replies.
//!
//! ```text
//! pending   --YES/email--> consented
//! pending   --NO/STOP----> declined
//! consented --NO/STOP----> declined      (timestamp kept)
//! consented --YES/email--> consented     (timestamp refreshed)
//! declined  --YES/email--> consented
//! *         --other------> unchanged
//! ```

pub mod classify;
pub mod engine;
pub mod messages;
pub mod resolver;

pub use classify::{classify, extract_email, is_valid_email, Intent};
pub use engine::{handle_inbound, record_inbound, send_reply, InboundOutcome};
pub use resolver::{lookup_variants, resolve, Resolution};
