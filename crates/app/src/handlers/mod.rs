//! Command and query handlers. One handler struct per aggregate; each
//! implements the handler trait for every message it owns.

mod assessments;
mod clients;
mod projects;

pub use assessments::AssessmentHandlers;
pub use clients::ClientHandlers;
pub use projects::ProjectHandlers;
