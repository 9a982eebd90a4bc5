use std::time::Duration;

use instant::Instant;

use super::grid::Grid;

/// Summary figures over the whole grid.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GridStats {
    pub total: f64,
    pub average: f64,
    pub max: f64,
}

impl GridStats {
    /// One pass over every cell. Pure read.
    pub fn scan(grid: &Grid) -> Self {
        let mut total = 0.0f64;
        let mut max = 0.0f64;
        for &v in grid.cells() {
            total += v;
            max = max.max(v);
        }
        let count = grid.cell_count();
        let average = if count > 0 { total / count as f64 } else { 0.0 };
        Self { total, average, max }
    }
}

/// Rescans the grid at most once per `period`.
pub struct StatsTicker {
    period: Duration,
    last_scan: Option<Instant>,
    latest: GridStats,
}

impl StatsTicker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_scan: None,
            latest: GridStats::default(),
        }
    }

    /// Returns fresh stats when the period has elapsed since the last scan.
    pub fn poll(&mut self, now: Instant, grid: &Grid) -> Option<GridStats> {
        let due = match self.last_scan {
            Some(last) => now.duration_since(last) >= self.period,
            None => true,
        };
        if !due {
            return None;
        }
        self.last_scan = Some(now);
        self.latest = GridStats::scan(grid);
        Some(self.latest)
    }

    pub fn latest(&self) -> GridStats {
        self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_grid() {
        let s = GridStats::scan(&Grid::new(3, 3));
        assert_eq!(s, GridStats::default());
    }

    #[test]
    fn single_hot_cell() {
        let mut g = Grid::new(3, 3);
        g.set(1, 1, 5.0);
        let s = GridStats::scan(&g);
        assert_eq!(s.total, 5.0);
        assert!((s.average - 5.0 / 9.0).abs() < 1e-6);
        assert_eq!(s.max, 5.0);
    }

    #[test]
    fn total_keeps_small_cells_next_to_large_ones() {
        let mut g = Grid::new(1, 2);
        g.set(0, 0, 16_777_216.0);
        g.set(0, 1, 1.0);
        assert_eq!(GridStats::scan(&g).total, 16_777_217.0);
    }

    #[test]
    fn empty_grid_average_is_zero() {
        let s = GridStats::scan(&Grid::new(0, 4));
        assert_eq!(s.average, 0.0);
    }

    #[test]
    fn ticker_respects_period() {
        let mut g = Grid::new(2, 2);
        let mut ticker = StatsTicker::new(Duration::from_secs(1));
        let t0 = Instant::now();

        assert!(ticker.poll(t0, &g).is_some());
        g.set(0, 0, 2.0);
        assert!(ticker.poll(t0 + Duration::from_millis(400), &g).is_none());
        assert_eq!(ticker.latest().total, 0.0);

        let s = ticker.poll(t0 + Duration::from_millis(1000), &g).unwrap();
        assert_eq!(s.total, 2.0);
        assert_eq!(ticker.latest().max, 2.0);
    }
}
