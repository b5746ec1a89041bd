pub mod detector;
pub mod extension;

pub use detector::{PivotConfig, RollingDeltaPivotDetector, SessionPivot, DEFAULT_WINDOW_BARS};
pub use extension::{
    extension, extension_levels, Direction, ExtensionLevel, DEFAULT_EXTENSION_PERCENTS,
};
