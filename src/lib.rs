//! Volume-at-price, value-area and session delta-pivot engine for streaming
//! trade ticks.
//!
//! Feed ticks in timestamp order to [`LevelEngine::process_tick`]; each closed
//! session yields a [`SessionSummary`] with its value area, delta pivot and
//! extension levels. The building blocks are usable on their own:
//! [`PriceLevelAccumulator`], [`ValueAreaCalculator`],
//! [`SessionWindowTracker`], [`RollingDeltaPivotDetector`] and
//! [`pivot::extension`].

pub mod archive;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod pivot;
pub mod profile;
pub mod replay;
pub mod session;

pub use archive::{BarArchive, BarCompletion};
pub use engine::{Diagnostic, EngineConfig, LevelEngine, SessionKey, SessionSummary};
pub use error::{LevelError, LevelResult};
pub use model::bar::{Bar, BarBuilder, CompletedBar};
pub use model::tick::{Side, Tick};
pub use pivot::{Direction, PivotConfig, RollingDeltaPivotDetector, SessionPivot};
pub use profile::{FinalizedProfile, PriceLevelAccumulator, ValueArea, ValueAreaCalculator};
pub use session::{
    FixedSessionCalendar, SessionCalendar, SessionClassifier, SessionName, SessionWindowTracker,
};
