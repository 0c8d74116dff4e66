mod batch;
mod filter;
mod participant;
mod response;

pub use batch::{BatchFailure, BatchSummary};
pub use filter::ParticipantFilter;
pub use participant::{Attribute, Attributes, ConsentStatus, Participant, ParticipantPatch};
pub use response::Response;
