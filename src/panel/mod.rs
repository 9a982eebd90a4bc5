pub mod ring;

use winit::window::Window;

use self::ring::RingBuffer;
use crate::heatmap::{GridStats, OVERLAY_ALPHA};
use crate::render::overlay::{draw_grid, EguiOverlay};
use crate::render::GpuState;
use crate::session::HeatmapSession;
use crate::store::KeyValueStore;

/// Number of frame times to keep for the FPS readout.
const FRAME_HISTORY_LEN: usize = 300;
/// Number of stats samples shown in the totals sparkline.
const TOTALS_HISTORY_LEN: usize = 120;

/// A control the user touched this frame. The shell applies these to the
/// session after the egui pass so the panel only ever reads session state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PanelAction {
    SetCellSize(u32),
    SetKernelRadius(f64),
    SetMaxIntensity(f64),
    SetOverlayVisible(bool),
    Clear,
    SimulateMax,
    ExportPage,
    ExportCombined,
    ExportElements,
}

/// Everything the shell needs to paint and apply one egui frame.
pub struct PanelFrame {
    pub primitives: Vec<egui::epaint::ClippedPrimitive>,
    pub textures_delta: egui::TexturesDelta,
    pub screen_descriptor: egui_wgpu::ScreenDescriptor,
    pub actions: Vec<PanelAction>,
}

/// F12 control panel plus the live heat overlay, both drawn through egui.
pub struct ControlPanel {
    pub egui_ctx: egui::Context,
    pub egui_state: egui_winit::State,
    pub egui_renderer: egui_wgpu::Renderer,

    pub visible: bool,
    f12_was_down: bool,

    /// Rolling window of frame times (seconds).
    frame_times: RingBuffer<f64>,
    pub fps: f64,
    pub frame_time_avg: f64,

    /// Grid totals from the periodic stats scan.
    totals: RingBuffer<f64>,

    /// Last user-facing message (export result, empty store, ...).
    notice: Option<String>,

    // Periodic log accumulator.
    frame_count: u64,
    log_timer: f64,
    log_frame_count: u32,
    log_frame_sum: f64,
    log_frame_min: f64,
    log_frame_max: f64,
}

impl ControlPanel {
    pub fn new(window: &Window, gpu: &GpuState) -> Self {
        let egui_ctx = egui::Context::default();

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            Some(gpu.device.limits().max_texture_dimension_2d as usize),
        );

        let egui_renderer = egui_wgpu::Renderer::new(
            &gpu.device,
            gpu.surface_config.format,
            egui_wgpu::RendererOptions {
                depth_stencil_format: None,
                msaa_samples: 1,
                dithering: true,
                predictable_texture_filtering: false,
            },
        );

        Self {
            egui_ctx,
            egui_state,
            egui_renderer,
            visible: false,
            f12_was_down: false,
            frame_times: RingBuffer::new(FRAME_HISTORY_LEN),
            fps: 0.0,
            frame_time_avg: 0.0,
            totals: RingBuffer::new(TOTALS_HISTORY_LEN),
            notice: None,
            frame_count: 0,
            log_timer: 0.0,
            log_frame_count: 0,
            log_frame_sum: 0.0,
            log_frame_min: f64::MAX,
            log_frame_max: 0.0,
        }
    }

    /// Record a frame time, update rolling stats, and periodically log.
    pub fn record_frame(&mut self, dt: f64) {
        self.frame_count += 1;
        self.frame_times.push(dt);

        if !self.frame_times.is_empty() {
            let sum: f64 = self.frame_times.iter().sum();
            self.frame_time_avg = sum / self.frame_times.len() as f64;
            self.fps = if self.frame_time_avg > 0.0 {
                1.0 / self.frame_time_avg
            } else {
                0.0
            };
        }

        // Periodic log (every 5s).
        self.log_frame_count += 1;
        self.log_frame_sum += dt;
        self.log_frame_min = self.log_frame_min.min(dt);
        self.log_frame_max = self.log_frame_max.max(dt);
        self.log_timer += dt;

        if self.log_timer >= 5.0 {
            let avg_ms = (self.log_frame_sum / self.log_frame_count as f64) * 1000.0;
            let fps = self.log_frame_count as f64 / self.log_timer;
            log::info!(
                "FPS: {:.0} | avg: {:.2}ms | min: {:.2}ms | max: {:.2}ms | total frames: {}",
                fps,
                avg_ms,
                self.log_frame_min * 1000.0,
                self.log_frame_max * 1000.0,
                self.frame_count,
            );
            self.log_timer = 0.0;
            self.log_frame_count = 0;
            self.log_frame_sum = 0.0;
            self.log_frame_min = f64::MAX;
            self.log_frame_max = 0.0;
        }
    }

    pub fn record_stats(&mut self, stats: GridStats) {
        self.totals.push(stats.total);
    }

    pub fn set_notice(&mut self, message: impl Into<String>) {
        self.notice = Some(message.into());
    }

    /// Handle F12 toggle. Returns true if visibility changed.
    pub fn poll_toggle(&mut self, f12_down: bool) -> bool {
        // Edge-detect: trigger on press, not hold.
        if f12_down && !self.f12_was_down {
            self.f12_was_down = true;
            self.visible = !self.visible;
            return true;
        }
        if !f12_down {
            self.f12_was_down = false;
        }
        false
    }

    /// Forward a winit event to egui. Returns true if egui consumed it.
    pub fn on_window_event(&mut self, window: &Window, event: &winit::event::WindowEvent) -> bool {
        self.egui_state.on_window_event(window, event).consumed
    }

    /// Paint the heat overlay and (if visible) the panel for this frame.
    pub fn run_frame<S: KeyValueStore>(
        &mut self,
        window: &Window,
        screen_w: u32,
        screen_h: u32,
        session: &HeatmapSession<S>,
    ) -> PanelFrame {
        let raw_input = self.egui_state.take_egui_input(window);

        let config = *session.config();
        let ui_state = UiSnapshot {
            visible: self.visible,
            page: session.page().to_owned(),
            rows: session.grid().rows(),
            cols: session.grid().cols(),
            phase: session.phase().label(),
            stats: session.latest_stats(),
            totals: self.totals.iter().copied().collect(),
            write_pending: session.write_pending(),
            tracked_elements: session.elements().tree().len(),
            fps: self.fps,
            frame_time_avg: self.frame_time_avg,
            notice: self.notice.clone(),
        };

        let mut controls = Controls {
            cell_size: config.cell_size,
            kernel_radius: config.kernel_radius,
            max_intensity: config.max_intensity,
            show_overlay: session.overlay_visible(),
        };
        let before = controls;
        let mut actions = Vec::new();

        let ctx = self.egui_ctx.clone();
        let full_output = ctx.run(raw_input, |ctx| {
            if session.overlay_visible() {
                let mut overlay = EguiOverlay::new(ctx);
                draw_grid(
                    &mut overlay,
                    session.grid(),
                    config.cell_size,
                    config.max_intensity,
                    OVERLAY_ALPHA,
                );
            }
            draw_ui(ctx, &ui_state, &mut controls, &mut actions);
        });

        controls.diff_into(&before, &mut actions);

        self.egui_state
            .handle_platform_output(window, full_output.platform_output);

        let pixels_per_point = full_output.pixels_per_point;
        let primitives = self.egui_ctx.tessellate(full_output.shapes, pixels_per_point);

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [screen_w, screen_h],
            pixels_per_point,
        };

        PanelFrame {
            primitives,
            textures_delta: full_output.textures_delta,
            screen_descriptor,
            actions,
        }
    }

    /// Upload egui textures and buffers. Call before the overlay render pass.
    pub fn prepare_egui(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        frame: &PanelFrame,
    ) -> Vec<wgpu::CommandBuffer> {
        for (id, image_delta) in &frame.textures_delta.set {
            self.egui_renderer
                .update_texture(device, queue, *id, image_delta);
        }

        self.egui_renderer.update_buffers(
            device,
            queue,
            encoder,
            &frame.primitives,
            &frame.screen_descriptor,
        )
    }

    pub fn render_egui(&self, render_pass: &mut wgpu::RenderPass<'static>, frame: &PanelFrame) {
        self.egui_renderer
            .render(render_pass, &frame.primitives, &frame.screen_descriptor);
    }

    /// Free textures after present.
    pub fn free_textures(&mut self, textures_delta: &egui::TexturesDelta) {
        for &id in &textures_delta.free {
            self.egui_renderer.free_texture(&id);
        }
    }
}

// ---------------------------------------------------------------------------
// UI snapshot + free-function draw (avoids borrow conflicts with egui_ctx)
// ---------------------------------------------------------------------------

struct UiSnapshot {
    visible: bool,
    page: String,
    rows: usize,
    cols: usize,
    phase: &'static str,
    stats: GridStats,
    totals: Vec<f64>,
    write_pending: bool,
    tracked_elements: usize,
    fps: f64,
    frame_time_avg: f64,
    notice: Option<String>,
}

/// Slider / checkbox values, read from the session and diffed afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Controls {
    cell_size: u32,
    kernel_radius: f64,
    max_intensity: f64,
    show_overlay: bool,
}

impl Controls {
    fn diff_into(&self, before: &Controls, actions: &mut Vec<PanelAction>) {
        if self.cell_size != before.cell_size {
            actions.push(PanelAction::SetCellSize(self.cell_size));
        }
        if self.kernel_radius != before.kernel_radius {
            actions.push(PanelAction::SetKernelRadius(self.kernel_radius));
        }
        if self.max_intensity != before.max_intensity {
            actions.push(PanelAction::SetMaxIntensity(self.max_intensity));
        }
        if self.show_overlay != before.show_overlay {
            actions.push(PanelAction::SetOverlayVisible(self.show_overlay));
        }
    }
}

fn draw_ui(
    ctx: &egui::Context,
    s: &UiSnapshot,
    controls: &mut Controls,
    actions: &mut Vec<PanelAction>,
) {
    if !s.visible {
        return;
    }

    let panel_frame = egui::Frame::NONE
        .fill(egui::Color32::from_rgba_unmultiplied(20, 20, 20, 220))
        .corner_radius(6.0)
        .inner_margin(10.0);

    egui::Window::new("Heatmap")
        .default_pos([10.0, 10.0])
        .default_width(300.0)
        .resizable(true)
        .frame(panel_frame)
        .show(ctx, |ui| {
            ui.style_mut().visuals.override_text_color = Some(egui::Color32::from_gray(220));

            // --- Surface ---
            ui.heading("Surface");
            ui.label(format!("Page: {}", s.page));
            ui.label(format!("Grid: {} x {} ({})", s.rows, s.cols, s.phase));
            ui.label(format!(
                "Elements tracked: {}{}",
                s.tracked_elements,
                if s.write_pending { " | save pending" } else { "" }
            ));
            ui.add_space(4.0);

            // --- Stats ---
            ui.heading("Stats");
            ui.label(
                egui::RichText::new(format!(
                    "Total {:.2} | Avg {:.2} | Max {:.2}",
                    s.stats.total, s.stats.average, s.stats.max
                ))
                .monospace(),
            );
            if !s.totals.is_empty() {
                let peak = s.totals.iter().copied().fold(0.0f64, f64::max).max(1.0);
                let (response, painter) =
                    ui.allocate_painter(egui::vec2(280.0, 40.0), egui::Sense::hover());
                let rect = response.rect;
                let bar_width = rect.width() / TOTALS_HISTORY_LEN as f32;

                for (i, &t) in s.totals.iter().enumerate() {
                    let h = (t / peak) as f32 * rect.height();
                    let x = rect.left() + i as f32 * bar_width;
                    painter.rect_filled(
                        egui::Rect::from_min_max(
                            egui::pos2(x, rect.bottom() - h),
                            egui::pos2(x + bar_width.max(1.0), rect.bottom()),
                        ),
                        0.0,
                        egui::Color32::from_rgb(255, 140, 60),
                    );
                }
            }
            ui.add_space(4.0);

            // --- Tuning ---
            ui.heading("Tuning");
            ui.horizontal(|ui| {
                ui.label("Cell size:");
                ui.add(egui::Slider::new(&mut controls.cell_size, 2..=50).suffix(" px"));
            });
            ui.horizontal(|ui| {
                ui.label("Radius:");
                ui.add(egui::Slider::new(&mut controls.kernel_radius, 1.0..=10.0).suffix(" cells"));
            });
            ui.horizontal(|ui| {
                ui.label("Max intensity:");
                ui.add(egui::Slider::new(&mut controls.max_intensity, 1.0..=100.0));
            });
            ui.checkbox(&mut controls.show_overlay, "Show overlay");
            ui.add_space(4.0);

            // --- Actions ---
            ui.heading("Actions");
            ui.horizontal(|ui| {
                if ui.button("Clear").clicked() {
                    actions.push(PanelAction::Clear);
                }
                if ui.button("Simulate max").clicked() {
                    actions.push(PanelAction::SimulateMax);
                }
            });
            ui.horizontal(|ui| {
                if ui.button("Export page").clicked() {
                    actions.push(PanelAction::ExportPage);
                }
                if ui.button("Export combined").clicked() {
                    actions.push(PanelAction::ExportCombined);
                }
            });
            if ui.button("Export element tree").clicked() {
                actions.push(PanelAction::ExportElements);
            }
            if let Some(notice) = &s.notice {
                ui.label(egui::RichText::new(notice).color(egui::Color32::from_rgb(255, 220, 120)));
            }
            ui.add_space(4.0);

            // --- Info ---
            ui.heading("Info");
            ui.label(format!(
                "FPS: {:.1} | {:.2}ms",
                s.fps,
                s.frame_time_avg * 1000.0
            ));
            ui.label("F12: Toggle | ESC: Quit");
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controls() -> Controls {
        Controls {
            cell_size: 10,
            kernel_radius: 2.0,
            max_intensity: 10.0,
            show_overlay: true,
        }
    }

    #[test]
    fn untouched_controls_emit_nothing() {
        let c = controls();
        let mut actions = Vec::new();
        c.diff_into(&c, &mut actions);
        assert!(actions.is_empty());
    }

    #[test]
    fn changed_controls_emit_setters() {
        let before = controls();
        let after = Controls {
            cell_size: 25,
            show_overlay: false,
            ..before
        };
        let mut actions = Vec::new();
        after.diff_into(&before, &mut actions);
        assert_eq!(
            actions,
            vec![
                PanelAction::SetCellSize(25),
                PanelAction::SetOverlayVisible(false)
            ]
        );
    }
}
