//! PNG / text export of the current surface and of all stored surfaces.

use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};

use crate::config::HeatmapConfig;
use crate::heatmap::{Grid, GridStats, OVERLAY_ALPHA};
use crate::render::overlay::{draw_grid, RasterCanvas};
use crate::store::{KeyValueStore, SnapshotStore};

pub const PAGE_EXPORT_FILE: &str = "heatmap-screenshot.png";
pub const COMBINED_EXPORT_FILE: &str = "combined-aggregated-heatmap.png";
pub const TREE_EXPORT_FILE: &str = "element-tree.txt";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no heatmap data found in the store")]
    NoSnapshots,
    #[error("nothing to export: the surface has no cells")]
    EmptySurface,
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("export I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Conditions the user should just be told about, not warned of.
    pub fn is_notice(&self) -> bool {
        matches!(self, ExportError::NoSnapshots | ExportError::EmptySurface)
    }
}

/// Destination for rendered exports.
pub trait ExportSink {
    fn export_image(&mut self, image: &RgbaImage, filename: &str) -> Result<PathBuf, ExportError>;
    fn export_text(&mut self, text: &str, filename: &str) -> Result<PathBuf, ExportError>;
}

/// Writes exports as files into one directory.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn target(&self, filename: &str) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(&self.dir)?;
        Ok(self.dir.join(filename))
    }
}

impl ExportSink for DirectorySink {
    fn export_image(&mut self, image: &RgbaImage, filename: &str) -> Result<PathBuf, ExportError> {
        let path = self.target(filename)?;
        image.save_with_format(&path, ImageFormat::Png)?;
        log::info!("Exported {}x{} image to {}", image.width(), image.height(), path.display());
        Ok(path)
    }

    fn export_text(&mut self, text: &str, filename: &str) -> Result<PathBuf, ExportError> {
        let path = self.target(filename)?;
        fs::write(&path, text)?;
        log::info!("Exported {} bytes to {}", text.len(), path.display());
        Ok(path)
    }
}

fn canvas_for(grid: &Grid, cell_size: u32) -> Result<RasterCanvas, ExportError> {
    if grid.is_empty() {
        return Err(ExportError::EmptySurface);
    }
    let cs = cell_size.max(1);
    Ok(RasterCanvas::new(grid.cols() as u32 * cs, grid.rows() as u32 * cs))
}

/// Current surface as the live overlay shows it (translucent cells on a
/// transparent background).
pub fn render_page(grid: &Grid, config: &HeatmapConfig) -> Result<RgbaImage, ExportError> {
    let mut canvas = canvas_for(grid, config.cell_size)?;
    draw_grid(&mut canvas, grid, config.cell_size, config.max_intensity, OVERLAY_ALPHA);
    Ok(canvas.into_image())
}

/// Aggregate grid, opaque, normalized by its own maximum.
pub fn render_combined(aggregate: &Grid, cell_size: u32) -> Result<RgbaImage, ExportError> {
    let mut canvas = canvas_for(aggregate, cell_size)?;
    let max = GridStats::scan(aggregate).max;
    draw_grid(&mut canvas, aggregate, cell_size, max, 1.0);
    Ok(canvas.into_image())
}

pub fn export_page(
    sink: &mut dyn ExportSink,
    grid: &Grid,
    config: &HeatmapConfig,
) -> Result<PathBuf, ExportError> {
    let image = render_page(grid, config)?;
    sink.export_image(&image, PAGE_EXPORT_FILE)
}

/// Sum every stored surface and export the result.
pub fn export_combined<S: KeyValueStore>(
    sink: &mut dyn ExportSink,
    store: &SnapshotStore<S>,
    cell_size: u32,
) -> Result<PathBuf, ExportError> {
    let keys = store.list_keys();
    let aggregate = store.aggregate(&keys).ok_or(ExportError::NoSnapshots)?;
    log::info!(
        "Aggregated {} snapshot(s) into {}x{} grid",
        keys.len(),
        aggregate.rows(),
        aggregate.cols()
    );
    let image = render_combined(&aggregate, cell_size)?;
    sink.export_image(&image, COMBINED_EXPORT_FILE)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use image::Rgba;

    /// Keeps exports in memory.
    #[derive(Default)]
    pub(crate) struct MemorySink {
        pub images: Vec<(String, RgbaImage)>,
        pub texts: Vec<(String, String)>,
    }

    impl ExportSink for MemorySink {
        fn export_image(&mut self, image: &RgbaImage, filename: &str) -> Result<PathBuf, ExportError> {
            self.images.push((filename.to_owned(), image.clone()));
            Ok(PathBuf::from(filename))
        }

        fn export_text(&mut self, text: &str, filename: &str) -> Result<PathBuf, ExportError> {
            self.texts.push((filename.to_owned(), text.to_owned()));
            Ok(PathBuf::from(filename))
        }
    }

    #[test]
    fn combined_without_data_is_a_notice() {
        let store = SnapshotStore::new(MemoryStore::new());
        let mut sink = MemorySink::default();
        let err = export_combined(&mut sink, &store, 10).unwrap_err();
        assert!(matches!(err, ExportError::NoSnapshots));
        assert!(err.is_notice());
        assert!(sink.images.is_empty());
    }

    #[test]
    fn combined_normalizes_by_aggregate_max() {
        let mut store = SnapshotStore::new(MemoryStore::new());
        let mut a = Grid::new(1, 2);
        a.set(0, 0, 1.0);
        let mut b = Grid::new(1, 3);
        b.set(0, 0, 1.0);
        b.set(0, 2, 1.0);
        store.save("/a", &a).unwrap();
        store.save("/b", &b).unwrap();

        let mut sink = MemorySink::default();
        export_combined(&mut sink, &store, 2).unwrap();
        let (name, img) = &sink.images[0];
        assert_eq!(name, COMBINED_EXPORT_FILE);
        assert_eq!(img.dimensions(), (6, 2));
        // Aggregate [[2, 0, 1]], max 2: red, empty, orange.
        assert_eq!(*img.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(2, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(*img.get_pixel(4, 1), Rgba([255, 165, 0, 255]));
    }

    #[test]
    fn page_export_uses_cell_size() {
        let mut g = Grid::new(2, 3);
        g.set(1, 1, 3.0);
        let cfg = HeatmapConfig {
            cell_size: 4,
            ..HeatmapConfig::default()
        };
        let mut sink = MemorySink::default();
        export_page(&mut sink, &g, &cfg).unwrap();
        let (name, img) = &sink.images[0];
        assert_eq!(name, PAGE_EXPORT_FILE);
        assert_eq!(img.dimensions(), (12, 8));
        assert!(img.get_pixel(5, 5)[3] > 0);
        assert_eq!(img.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn empty_surface_is_a_notice() {
        let mut sink = MemorySink::default();
        let err = export_page(&mut sink, &Grid::new(0, 0), &HeatmapConfig::default()).unwrap_err();
        assert!(err.is_notice());
    }

    #[test]
    fn directory_sink_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path().join("out"));
        let path = sink.export_image(&RgbaImage::new(3, 2), "x.png").unwrap();
        let back = image::open(&path).unwrap().to_rgba8();
        assert_eq!(back.dimensions(), (3, 2));

        let path = sink.export_text("<desktop>\n", TREE_EXPORT_FILE).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "<desktop>\n");
    }
}
