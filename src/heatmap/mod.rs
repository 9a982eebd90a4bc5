//! Cursor heatmap core: grid, kernel deposition, color ramp, statistics.
//!
//! Heat never decays on its own. Only an explicit clear (or a cell-size
//! change) resets it.

pub mod color;
pub mod grid;
pub mod kernel;
pub mod stats;

pub use color::{color_for, Rgb, OVERLAY_ALPHA};
pub use grid::{Grid, Snapshot};
pub use stats::{GridStats, StatsTicker};
