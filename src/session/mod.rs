pub mod calendar;
pub mod tracker;

pub use calendar::{FixedSessionCalendar, SessionCalendar, SessionName, SessionSpec, SessionWindow};
pub use tracker::{ActiveSession, SessionClassifier, SessionTransition, SessionWindowTracker};
