use serde::{Deserialize, Serialize};

/// Serialized grid: row-major nested rows, as persisted in the store.
///
/// Rows may be ragged when read back from disk; consumers always use each
/// row's own length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(pub Vec<Vec<f64>>);

impl Snapshot {
    pub fn rows(&self) -> usize {
        self.0.len()
    }

    /// Widest row.
    pub fn cols(&self) -> usize {
        self.0.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Cell value, or `None` outside this snapshot's own bounds.
    /// Negative and non-finite values read as 0.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.0
            .get(row)
            .and_then(|r| r.get(col))
            .map(|&v| sanitize(v))
    }
}

/// Heat accumulator covering the overlay surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    /// Non-negative heat values, row-major.
    cells: Vec<f64>,
}

impl Grid {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![0.0; rows * cols],
        }
    }

    /// Cell counts covering `width x height` pixels at `cell_size` px per cell.
    pub fn dims_for(width: u32, height: u32, cell_size: u32) -> (usize, usize) {
        let cs = cell_size.max(1);
        (height.div_ceil(cs) as usize, width.div_ceil(cs) as usize)
    }

    /// Fresh all-zero grid sized to a surface.
    pub fn for_surface(width: u32, height: u32, cell_size: u32) -> Self {
        let (rows, cols) = Self::dims_for(width, height, cell_size);
        Self::new(rows, cols)
    }

    /// Copy the overlap of `old` into `new`. Cells outside the overlap stay
    /// zero: shrinking drops heat, growing leaves the new area cold.
    pub fn merge(old: &Snapshot, mut new: Grid) -> Grid {
        let rows = old.rows().min(new.rows);
        for (row, src) in old.0.iter().enumerate().take(rows) {
            let cols = src.len().min(new.cols);
            let base = row * new.cols;
            for (dst, &v) in new.cells[base..base + cols].iter_mut().zip(src) {
                *dst = sanitize(v);
            }
        }
        new
    }

    #[cfg(test)]
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self::merge(snapshot, Self::new(snapshot.rows(), snapshot.cols()))
    }

    pub fn to_snapshot(&self) -> Snapshot {
        if self.cols == 0 {
            return Snapshot(vec![Vec::new(); self.rows]);
        }
        Snapshot(self.cells.chunks(self.cols).map(<[f64]>::to_vec).collect())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[f64] {
        &self.cells
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row < self.rows && col < self.cols {
            self.cells[row * self.cols + col]
        } else {
            0.0
        }
    }

    /// Overwrite one cell. Out-of-range indices are ignored.
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        if row < self.rows && col < self.cols {
            self.cells[row * self.cols + col] = sanitize(value);
        }
    }

    /// Add heat at `(row, col)`, clamping both indices into range first.
    /// Does nothing on a grid with no cells.
    pub fn add_at(&mut self, row: usize, col: usize, delta: f64) {
        if self.is_empty() {
            return;
        }
        let row = row.min(self.rows - 1);
        let col = col.min(self.cols - 1);
        let cell = &mut self.cells[row * self.cols + col];
        *cell = sanitize(*cell + delta);
    }

    pub fn fill(&mut self, value: f64) {
        self.cells.fill(sanitize(value));
    }

    pub fn clear(&mut self) {
        self.cells.fill(0.0);
    }

    /// True if any cell carries heat.
    pub fn has_heat(&self) -> bool {
        self.cells.iter().any(|&v| v > 0.0)
    }

    /// Iterate `(row, col, intensity)` over cells with heat.
    pub fn hot_cells(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let cols = self.cols.max(1);
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &v)| v > 0.0)
            .map(move |(i, &v)| (i / cols, i % cols, v))
    }
}

fn sanitize(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}
