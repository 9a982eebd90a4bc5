//! One surface's heatmap session: the grid plus everything that feeds,
//! persists, and reads it. All entry points run on the event-loop thread.

use std::path::PathBuf;
use std::time::Duration;

use instant::Instant;

use crate::config::HeatmapConfig;
use crate::elements::{DesktopTree, ElementScores, ElementTree, IndexedTree};
use crate::export::{self, ExportError, ExportSink, TREE_EXPORT_FILE};
use crate::heatmap::kernel;
use crate::heatmap::{Grid, GridStats, StatsTicker};
use crate::store::{KeyValueStore, SnapshotStore, WriteDebouncer};

/// Store key for the persisted [`HeatmapConfig`].
pub const SETTINGS_KEY: &str = "heatmapSettings";
/// Store key for the last element-tree snapshot.
pub const ELEMENT_TREE_KEY: &str = "selectedElementTree";

/// Grid lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No surface size seen yet; input is ignored.
    Uninitialized,
    /// Grid allocated, no heat.
    Sized,
    /// At least one cell carries heat.
    Populated,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Uninitialized => "uninitialized",
            Phase::Sized => "sized",
            Phase::Populated => "populated",
        }
    }
}

pub struct HeatmapSession<S> {
    page: String,
    config: HeatmapConfig,
    grid: Grid,
    surface: (u32, u32),
    phase: Phase,
    store: SnapshotStore<S>,
    debouncer: WriteDebouncer,
    stats: StatsTicker,
    overlay_visible: bool,
    elements: ElementScores,
}

impl<S: KeyValueStore> HeatmapSession<S> {
    pub fn new(
        page: impl Into<String>,
        config: HeatmapConfig,
        store: SnapshotStore<S>,
        debounce: Duration,
        stats_period: Duration,
    ) -> Self {
        Self {
            page: page.into(),
            config: config.sanitized(),
            grid: Grid::new(0, 0),
            surface: (0, 0),
            phase: Phase::Uninitialized,
            store,
            debouncer: WriteDebouncer::new(debounce),
            stats: StatsTicker::new(stats_period),
            overlay_visible: true,
            elements: ElementScores::default(),
        }
    }

    /// Settings saved by a previous session, if any.
    pub fn persisted_config(store: &SnapshotStore<S>) -> Option<HeatmapConfig> {
        store
            .get_json::<HeatmapConfig>(SETTINGS_KEY)
            .map(HeatmapConfig::sanitized)
    }

    // --- Inbound events ---

    /// Rebuild the grid for a new surface size, carrying heat over from the
    /// live grid or, on first sizing, from the stored snapshot.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::debug!("Ignoring zero-area resize {width}x{height}");
            return;
        }
        if (width, height) == self.surface && self.phase != Phase::Uninitialized {
            return;
        }

        let fresh = Grid::for_surface(width, height, self.config.cell_size);
        self.grid = match self.phase {
            Phase::Uninitialized => match self.store.load(&self.page) {
                Some(stored) => {
                    log::info!(
                        "Restored {}x{} snapshot for {}",
                        stored.rows(),
                        stored.cols(),
                        self.page
                    );
                    Grid::merge(&stored, fresh)
                }
                None => fresh,
            },
            Phase::Sized | Phase::Populated => Grid::merge(&self.grid.to_snapshot(), fresh),
        };
        self.surface = (width, height);
        self.phase = if self.grid.has_heat() {
            Phase::Populated
        } else {
            Phase::Sized
        };

        if self.elements.tree().len() <= 1 {
            self.retarget_elements(&DesktopTree::screen(width, height));
        }

        log::info!(
            "Surface {}x{} -> grid {}x{} ({})",
            width,
            height,
            self.grid.rows(),
            self.grid.cols(),
            self.phase.label()
        );
    }

    /// Deposit heat at a surface position and arm the debounced write.
    pub fn pointer_moved(&mut self, x: f32, y: f32, now: Instant) {
        if self.phase == Phase::Uninitialized {
            return;
        }
        kernel::deposit(&mut self.grid, &self.config, f64::from(x), f64::from(y));
        self.elements.record_move(x, y);
        if self.phase == Phase::Sized && self.grid.has_heat() {
            self.phase = Phase::Populated;
        }
        self.debouncer.schedule(now);
    }

    /// Credit a click to the element under the cursor.
    pub fn clicked(&mut self, x: f32, y: f32) -> Option<usize> {
        self.elements.record_click(x, y)
    }

    /// Per-frame housekeeping. Returns true when a debounced write went out.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.debouncer.poll(now) {
            self.save();
            true
        } else {
            false
        }
    }

    pub fn poll_stats(&mut self, now: Instant) -> Option<GridStats> {
        self.stats.poll(now, &self.grid)
    }

    /// Write now, superseding any pending debounced write.
    pub fn flush(&mut self) {
        self.debouncer.take();
        self.save();
    }

    // --- Controls ---

    /// Changing resolution discards accumulated heat.
    pub fn set_cell_size(&mut self, cell_size: u32) {
        let cell_size = cell_size.max(1);
        if cell_size == self.config.cell_size {
            return;
        }
        self.config.cell_size = cell_size;
        if self.phase != Phase::Uninitialized {
            let (w, h) = self.surface;
            self.grid = Grid::for_surface(w, h, cell_size);
            self.phase = Phase::Sized;
            self.flush();
            log::info!(
                "Cell size {} px: grid reset to {}x{}",
                cell_size,
                self.grid.rows(),
                self.grid.cols()
            );
        }
        self.persist_settings();
    }

    pub fn set_kernel_radius(&mut self, radius: f64) {
        self.config = HeatmapConfig {
            kernel_radius: radius,
            ..self.config
        }
        .sanitized();
        self.persist_settings();
    }

    pub fn set_max_intensity(&mut self, max_intensity: f64) {
        self.config = HeatmapConfig {
            max_intensity,
            ..self.config
        }
        .sanitized();
        self.persist_settings();
    }

    pub fn set_overlay_visible(&mut self, visible: bool) {
        self.overlay_visible = visible;
    }

    pub fn clear(&mut self) {
        self.grid.clear();
        if self.phase == Phase::Populated {
            self.phase = Phase::Sized;
        }
        self.flush();
    }

    /// Saturate every cell at twice the max intensity.
    pub fn simulate_max(&mut self) {
        self.grid.fill(self.config.max_intensity * 2.0);
        if self.grid.has_heat() {
            self.phase = Phase::Populated;
        }
        self.flush();
    }

    /// Swap in a fresh walk of the element tree.
    pub fn retarget_elements<T: ElementTree>(&mut self, tree: &T) {
        self.elements.retarget(IndexedTree::build(tree));
    }

    // --- Outputs ---

    /// Fresh scan of the live grid.
    #[cfg(test)]
    pub fn stats(&self) -> GridStats {
        GridStats::scan(&self.grid)
    }

    /// Result of the last periodic scan.
    pub fn latest_stats(&self) -> GridStats {
        self.stats.latest()
    }

    pub fn export_page(&self, sink: &mut dyn ExportSink) -> Result<PathBuf, ExportError> {
        export::export_page(sink, &self.grid, &self.config)
    }

    /// Aggregate every stored surface, this one's pending heat included.
    pub fn export_combined(&mut self, sink: &mut dyn ExportSink) -> Result<PathBuf, ExportError> {
        self.flush();
        export::export_combined(sink, &self.store, self.config.cell_size)
    }

    /// Persist the element snapshot and write its outline.
    pub fn export_elements(&mut self, sink: &mut dyn ExportSink) -> Result<PathBuf, ExportError> {
        if let Err(e) = self.store.put_json(ELEMENT_TREE_KEY, &self.elements.snapshot()) {
            log::warn!("Failed to persist element tree: {e}");
        }
        sink.export_text(&self.elements.outline(), TREE_EXPORT_FILE)
    }

    // --- Accessors ---

    pub fn page(&self) -> &str {
        &self.page
    }

    pub fn config(&self) -> &HeatmapConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    pub fn elements(&self) -> &ElementScores {
        &self.elements
    }

    #[cfg(test)]
    pub fn store(&self) -> &SnapshotStore<S> {
        &self.store
    }

    pub fn write_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    // --- Persistence ---

    /// An unsized grid is never written so a stored snapshot is not clobbered
    /// before it had a chance to be merged.
    fn save(&mut self) {
        if self.phase == Phase::Uninitialized {
            return;
        }
        if let Err(e) = self.store.save(&self.page, &self.grid) {
            log::warn!("Failed to save heatmap for {}: {e}", self.page);
        }
    }

    fn persist_settings(&mut self) {
        if let Err(e) = self.store.put_json(SETTINGS_KEY, &self.config) {
            log::warn!("Failed to save heatmap settings: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::MemorySink;
    use crate::export::COMBINED_EXPORT_FILE;
    use crate::heatmap::Snapshot;
    use crate::store::MemoryStore;

    const DEBOUNCE: Duration = Duration::from_millis(500);

    /// Memory store that counts `set` calls.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        writes: usize,
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: String) -> Result<(), crate::store::StoreError> {
            self.writes += 1;
            self.inner.set(key, value)
        }

        fn keys(&self) -> Vec<String> {
            self.inner.keys()
        }
    }

    fn session() -> HeatmapSession<CountingStore> {
        session_with(MemoryStore::new())
    }

    fn session_with(inner: MemoryStore) -> HeatmapSession<CountingStore> {
        HeatmapSession::new(
            "/test",
            HeatmapConfig::default(),
            SnapshotStore::new(CountingStore { inner, writes: 0 }),
            DEBOUNCE,
            Duration::from_secs(1),
        )
    }

    fn writes(s: &HeatmapSession<CountingStore>) -> usize {
        s.store().backend().writes
    }

    #[test]
    fn burst_of_moves_writes_once() {
        let mut s = session();
        s.resize(100, 100);
        let t0 = Instant::now();

        for i in 0..20 {
            s.pointer_moved(50.0, 50.0, t0 + Duration::from_millis(i * 10));
            s.tick(t0 + Duration::from_millis(i * 10));
        }
        assert_eq!(writes(&s), 0);
        assert!(!s.tick(t0 + Duration::from_millis(499)));
        assert!(s.tick(t0 + DEBOUNCE));
        assert!(!s.tick(t0 + Duration::from_millis(900)));
        assert_eq!(writes(&s), 1);

        s.pointer_moved(10.0, 10.0, t0 + Duration::from_millis(1000));
        assert!(s.write_pending());
        s.flush();
        assert_eq!(writes(&s), 2);
        assert!(!s.tick(t0 + Duration::from_secs(5)));
        assert_eq!(writes(&s), 2);
    }

    #[test]
    fn lifecycle() {
        let mut s = session();
        let now = Instant::now();
        assert_eq!(s.phase(), Phase::Uninitialized);

        s.pointer_moved(5.0, 5.0, now);
        assert_eq!(s.phase(), Phase::Uninitialized);
        assert!(!s.write_pending());

        s.resize(95, 41);
        assert_eq!(s.phase(), Phase::Sized);
        assert_eq!((s.grid().rows(), s.grid().cols()), (5, 10));

        s.pointer_moved(5.0, 5.0, now);
        assert_eq!(s.phase(), Phase::Populated);
        assert_eq!(s.grid().get(0, 0), 1.0);

        s.clear();
        assert_eq!(s.phase(), Phase::Sized);
        assert_eq!(s.stats(), GridStats::default());
        let saved = s.store().load("/test").unwrap();
        assert!(saved.0.iter().flatten().all(|&v| v == 0.0));
    }

    #[test]
    fn first_resize_restores_stored_heat() {
        let mut store = SnapshotStore::new(MemoryStore::new());
        store
            .save("/test", &Grid::from_snapshot(&Snapshot(vec![vec![0.0, 3.0]])))
            .unwrap();

        let mut s = HeatmapSession::new(
            "/test",
            HeatmapConfig::default(),
            store,
            DEBOUNCE,
            Duration::from_secs(1),
        );
        s.resize(40, 20);
        assert_eq!(s.phase(), Phase::Populated);
        assert_eq!(s.grid().get(0, 1), 3.0);
        assert_eq!(s.grid().cols(), 4);
    }

    #[test]
    fn later_resize_merges_live_grid() {
        let mut s = session();
        s.resize(100, 100);
        s.pointer_moved(5.0, 5.0, Instant::now());
        s.pointer_moved(95.0, 95.0, Instant::now());

        s.resize(50, 50);
        assert_eq!((s.grid().rows(), s.grid().cols()), (5, 5));
        assert_eq!(s.grid().get(0, 0), 1.0);
        assert_eq!(s.phase(), Phase::Populated);

        s.resize(100, 100);
        assert_eq!(s.grid().get(9, 9), 0.0);
    }

    #[test]
    fn flush_before_sizing_keeps_stored_snapshot() {
        let mut mem = MemoryStore::new();
        mem.set("heatmapData_/test", "[[7.0]]".into()).unwrap();
        let mut s = session_with(mem);
        s.flush();
        assert_eq!(s.store().load("/test"), Some(Snapshot(vec![vec![7.0]])));
    }

    #[test]
    fn cell_size_change_discards_heat_and_persists_settings() {
        let mut s = session();
        s.resize(100, 100);
        s.pointer_moved(50.0, 50.0, Instant::now());

        s.set_cell_size(20);
        assert_eq!(s.phase(), Phase::Sized);
        assert_eq!((s.grid().rows(), s.grid().cols()), (5, 5));
        assert!(!s.grid().has_heat());
        assert!(!s.write_pending());
        assert_eq!(s.store().load("/test").unwrap().rows(), 5);

        let cfg = HeatmapSession::persisted_config(s.store()).unwrap();
        assert_eq!(cfg.cell_size, 20);
    }

    #[test]
    fn tuning_is_sanitized_and_persisted() {
        let mut s = session();
        s.set_kernel_radius(-1.0);
        s.set_max_intensity(40.0);
        assert_eq!(s.config().kernel_radius, 0.0);
        let cfg = HeatmapSession::persisted_config(s.store()).unwrap();
        assert_eq!(cfg.max_intensity, 40.0);
    }

    #[test]
    fn simulate_max_saturates() {
        let mut s = session();
        s.resize(30, 20);
        s.set_max_intensity(10.0);
        s.simulate_max();
        assert_eq!(s.phase(), Phase::Populated);
        let st = s.stats();
        assert_eq!(st.max, 20.0);
        assert_eq!(st.average, 20.0);
        assert_eq!(st.total, 120.0);
    }

    #[test]
    fn combined_export_includes_pending_heat() {
        let mut s = session();
        s.resize(20, 10);
        s.pointer_moved(5.0, 5.0, Instant::now());
        assert!(s.write_pending());

        let mut sink = MemorySink::default();
        s.export_combined(&mut sink).unwrap();
        assert!(!s.write_pending());
        assert_eq!(sink.images[0].0, COMBINED_EXPORT_FILE);
        assert_eq!(sink.images[0].1.dimensions(), (20, 10));
    }

    #[test]
    fn element_tree_export() {
        let mut s = session();
        s.resize(100, 100);
        s.pointer_moved(10.0, 10.0, Instant::now());
        assert_eq!(s.clicked(10.0, 10.0), Some(0));

        let mut sink = MemorySink::default();
        s.export_elements(&mut sink).unwrap();
        assert_eq!(sink.texts[0], (TREE_EXPORT_FILE.to_string(), "<desktop> #0 heat=1 click=1\n".to_string()));
        assert!(s.store().backend().get(ELEMENT_TREE_KEY).is_some());
    }

    #[test]
    fn overlay_toggle_does_not_touch_grid() {
        let mut s = session();
        s.resize(20, 20);
        s.pointer_moved(5.0, 5.0, Instant::now());
        s.set_overlay_visible(false);
        assert!(!s.overlay_visible());
        assert!(s.grid().has_heat());
    }
}
