use image::{Rgba, RgbaImage};

use crate::heatmap::{color_for, Grid, Rgb};

/// Anything the heat grid can be painted onto.
pub trait OverlaySurface {
    /// Wipe the whole surface to transparent.
    fn clear(&mut self);
    /// Fill an axis-aligned rectangle (surface pixels) with `color` at `alpha`.
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgb, alpha: f32);
}

/// Paint every cell with heat as one `cell_size` square.
/// Cold cells are skipped entirely.
pub fn draw_grid(
    surface: &mut impl OverlaySurface,
    grid: &Grid,
    cell_size: u32,
    max_intensity: f64,
    alpha: f32,
) {
    surface.clear();
    let cs = cell_size.max(1) as f32;
    for (row, col, intensity) in grid.hot_cells() {
        surface.fill_rect(
            col as f32 * cs,
            row as f32 * cs,
            cs,
            cs,
            color_for(intensity, max_intensity),
            alpha,
        );
    }
}

// ---------------------------------------------------------------------------
// CPU raster (exports)
// ---------------------------------------------------------------------------

/// RGBA image canvas with source-over blending.
pub struct RasterCanvas {
    image: RgbaImage,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    #[cfg(test)]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

impl OverlaySurface for RasterCanvas {
    fn clear(&mut self) {
        for px in self.image.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgb, alpha: f32) {
        let (iw, ih) = self.image.dimensions();
        let x0 = x.max(0.0).floor() as u32;
        let y0 = y.max(0.0).floor() as u32;
        let x1 = ((x + w).max(0.0).ceil() as u32).min(iw);
        let y1 = ((y + h).max(0.0).ceil() as u32).min(ih);
        let a = alpha.clamp(0.0, 1.0);

        for py in y0..y1 {
            for px in x0..x1 {
                let dst = self.image.get_pixel_mut(px, py);
                *dst = blend_over(*dst, color, a);
            }
        }
    }
}

/// Straight-alpha source-over composite.
fn blend_over(dst: Rgba<u8>, src: Rgb, alpha: f32) -> Rgba<u8> {
    let da = dst[3] as f32 / 255.0;
    let out_a = alpha + da * (1.0 - alpha);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mix = |s: u8, d: u8| -> u8 {
        let c = (s as f32 * alpha + d as f32 * da * (1.0 - alpha)) / out_a;
        c.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        mix(src.r, dst[0]),
        mix(src.g, dst[1]),
        mix(src.b, dst[2]),
        (out_a * 255.0).round() as u8,
    ])
}

// ---------------------------------------------------------------------------
// Live overlay (egui background layer)
// ---------------------------------------------------------------------------

/// Paints into egui's background layer, below the control panel.
pub struct EguiOverlay {
    painter: egui::Painter,
    /// Surface pixels -> egui points.
    scale: f32,
}

impl EguiOverlay {
    pub fn new(ctx: &egui::Context) -> Self {
        Self {
            painter: ctx.layer_painter(egui::LayerId::background()),
            scale: 1.0 / ctx.pixels_per_point().max(f32::EPSILON),
        }
    }
}

impl OverlaySurface for EguiOverlay {
    fn clear(&mut self) {
        // egui rebuilds its shape list each frame and the pass clears the
        // swapchain image, so there is nothing to erase here.
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgb, alpha: f32) {
        let rect = egui::Rect::from_min_size(
            egui::pos2(x * self.scale, y * self.scale),
            egui::vec2(w * self.scale, h * self.scale),
        );
        let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        self.painter.rect_filled(
            rect,
            0.0,
            egui::Color32::from_rgba_unmultiplied(color.r, color.g, color.b, a),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heatmap::OVERLAY_ALPHA;

    /// Records calls instead of drawing.
    #[derive(Default)]
    struct Recorder {
        clears: usize,
        rects: Vec<(f32, f32, f32, f32, Rgb)>,
    }

    impl OverlaySurface for Recorder {
        fn clear(&mut self) {
            self.clears += 1;
        }

        fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgb, _alpha: f32) {
            self.rects.push((x, y, w, h, color));
        }
    }

    #[test]
    fn only_hot_cells_are_painted() {
        let mut g = Grid::new(3, 4);
        g.set(0, 1, 10.0);
        g.set(2, 3, 5.0);

        let mut r = Recorder::default();
        draw_grid(&mut r, &g, 10, 10.0, OVERLAY_ALPHA);

        assert_eq!(r.clears, 1);
        assert_eq!(
            r.rects,
            vec![
                (10.0, 0.0, 10.0, 10.0, Rgb::new(255, 0, 0)),
                (30.0, 20.0, 10.0, 10.0, Rgb::new(255, 165, 0)),
            ]
        );
    }

    #[test]
    fn raster_blends_at_overlay_alpha() {
        let mut g = Grid::new(1, 2);
        g.set(0, 0, 10.0);
        let mut canvas = RasterCanvas::new(20, 10);
        draw_grid(&mut canvas, &g, 10, 10.0, OVERLAY_ALPHA);

        let img = canvas.into_image();
        let hot = img.get_pixel(5, 5);
        assert_eq!(&hot.0[..3], &[255, 0, 0]);
        assert!((178..=179).contains(&hot[3]));
        assert_eq!(*img.get_pixel(15, 5), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn raster_clips_out_of_bounds() {
        let mut canvas = RasterCanvas::new(4, 4);
        canvas.fill_rect(-2.0, 2.0, 100.0, 100.0, Rgb::new(1, 2, 3), 1.0);
        let img = canvas.image();
        assert_eq!(*img.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(*img.get_pixel(3, 3), Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn clear_resets_raster() {
        let mut canvas = RasterCanvas::new(2, 2);
        canvas.fill_rect(0.0, 0.0, 2.0, 2.0, Rgb::new(9, 9, 9), 1.0);
        canvas.clear();
        assert!(canvas.image().pixels().all(|p| p[3] == 0));
    }
}
