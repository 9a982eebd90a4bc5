use glam::DVec2;

use super::grid::Grid;
use crate::config::HeatmapConfig;

/// Deposit one pointer sample at surface position `(x, y)` in pixels.
///
/// Every cell whose center lies within `kernel_radius` grid units of the
/// sample receives `(r - d + 1) / (r + 1)`: 1.0 at the center, falling
/// linearly to `1 / (r + 1)` at the rim. Heat only accumulates.
pub fn deposit(grid: &mut Grid, config: &HeatmapConfig, x: f64, y: f64) {
    if grid.is_empty() || !x.is_finite() || !y.is_finite() {
        return;
    }

    let cell_size = config.cell_size.max(1) as f64;
    let radius = config.kernel_radius.max(0.0);
    let g = DVec2::new(x, y) / cell_size;

    let Some((min_col, max_col)) = span(g.x, radius, grid.cols()) else {
        return;
    };
    let Some((min_row, max_row)) = span(g.y, radius, grid.rows()) else {
        return;
    };

    for row in min_row..=max_row {
        for col in min_col..=max_col {
            let center = DVec2::new(col as f64 + 0.5, row as f64 + 0.5);
            let dist = center.distance(g);
            if dist <= radius {
                grid.add_at(row, col, (radius - dist + 1.0) / (radius + 1.0));
            }
        }
    }
}

/// Inclusive index range `[floor(c - r), floor(c + r)]` clamped to
/// `[0, len - 1]`, or `None` when it misses the grid entirely.
fn span(center: f64, radius: f64, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let lo = (center - radius).floor().max(0.0);
    let hi = (center + radius).floor().min((len - 1) as f64);
    if hi < lo {
        return None;
    }
    Some((lo as usize, hi as usize))
}
