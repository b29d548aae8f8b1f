pub mod display;
pub mod tracker;

pub use display::ProgressDisplay;
pub use tracker::{ProgressInfo, ProgressStatus, ProgressTracker, TaskKind};
