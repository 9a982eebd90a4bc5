use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Default surface identity when `--page` is not given.
pub const DEFAULT_PAGE: &str = "/desktop";
/// Pixels per cell.
pub const DEFAULT_CELL_SIZE: u32 = 10;
/// Kernel reach in cells.
pub const DEFAULT_KERNEL_RADIUS: f64 = 2.0;
/// Heat at which a cell is fully red.
pub const DEFAULT_MAX_INTENSITY: f64 = 10.0;
/// Minimum spacing between debounced snapshot writes.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
/// Stats rescan period.
pub const DEFAULT_STATS_MS: u64 = 1000;

/// Runtime-tunable heatmap parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    pub cell_size: u32,
    pub kernel_radius: f64,
    pub max_intensity: f64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
            kernel_radius: DEFAULT_KERNEL_RADIUS,
            max_intensity: DEFAULT_MAX_INTENSITY,
        }
    }
}

impl HeatmapConfig {
    /// Clamp every field into its valid range.
    pub fn sanitized(self) -> Self {
        Self {
            cell_size: self.cell_size.max(1),
            kernel_radius: finite_non_negative(self.kernel_radius, DEFAULT_KERNEL_RADIUS),
            max_intensity: finite_non_negative(self.max_intensity, DEFAULT_MAX_INTENSITY),
        }
    }

    /// Apply CLI overrides on top of persisted values.
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(cs) = cli.cell_size {
            self.cell_size = cs;
        }
        if let Some(r) = cli.kernel_radius {
            self.kernel_radius = r;
        }
        if let Some(m) = cli.max_intensity {
            self.max_intensity = m;
        }
        self.sanitized()
    }
}

fn finite_non_negative(v: f64, fallback: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        fallback
    }
}

/// Command-line options.
#[derive(Debug, Parser)]
#[command(
    name = "cursorheat",
    about = "Transparent desktop overlay that records a persistent cursor heatmap",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Cli {
    /// Surface identity the heatmap is stored under
    #[arg(long, default_value = DEFAULT_PAGE)]
    pub page: String,

    /// Store file (defaults to <data dir>/cursorheat/store.json)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Keep everything in memory; nothing is written to disk
    #[arg(long, default_value_t = false)]
    pub memory_store: bool,

    /// Directory exported PNG and text files are written to
    #[arg(long, default_value = ".")]
    pub export_dir: PathBuf,

    /// Pixels per grid cell
    #[arg(long)]
    pub cell_size: Option<u32>,

    /// Kernel radius in cells
    #[arg(long)]
    pub kernel_radius: Option<f64>,

    /// Intensity mapped to full red
    #[arg(long)]
    pub max_intensity: Option<f64>,

    /// Minimum milliseconds between snapshot writes
    #[arg(long, default_value_t = DEFAULT_DEBOUNCE_MS)]
    pub debounce_ms: u64,

    /// Milliseconds between stats rescans
    #[arg(long, default_value_t = DEFAULT_STATS_MS)]
    pub stats_ms: u64,
}

impl Cli {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn stats_period(&self) -> Duration {
        Duration::from_millis(self.stats_ms)
    }

    /// Store path, falling back to the per-user data directory, then `./`.
    pub fn store_path(&self) -> PathBuf {
        if let Some(p) = &self.store {
            return p.clone();
        }
        match dirs::data_dir() {
            Some(mut dir) => {
                dir.push("cursorheat");
                dir.push("store.json");
                dir
            }
            None => {
                log::warn!("Could not determine data directory, using ./cursorheat-store.json");
                PathBuf::from("cursorheat-store.json")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps() {
        let c = HeatmapConfig {
            cell_size: 0,
            kernel_radius: -3.0,
            max_intensity: f64::NAN,
        }
        .sanitized();
        assert_eq!(c.cell_size, 1);
        assert_eq!(c.kernel_radius, 0.0);
        assert_eq!(c.max_intensity, DEFAULT_MAX_INTENSITY);
    }

    #[test]
    fn cli_overrides_persisted() {
        let cli = Cli::parse_from(["cursorheat", "--cell-size", "20", "--page", "/docs"]);
        let c = HeatmapConfig {
            cell_size: 5,
            kernel_radius: 4.0,
            max_intensity: 30.0,
        }
        .with_overrides(&cli);
        assert_eq!(c.cell_size, 20);
        assert_eq!(c.kernel_radius, 4.0);
        assert_eq!(cli.page, "/docs");
        assert_eq!(cli.debounce(), Duration::from_millis(500));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let c: HeatmapConfig = serde_json::from_str(r#"{"kernel_radius":3.0}"#).unwrap();
        assert_eq!(c.cell_size, DEFAULT_CELL_SIZE);
        assert_eq!(c.kernel_radius, 3.0);
    }
}
