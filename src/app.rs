use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use instant::Instant;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowAttributes, WindowId, WindowLevel};

use crate::config::Cli;
use crate::export::{DirectorySink, ExportError};
use crate::panel::{ControlPanel, PanelAction};
#[cfg(windows)]
use crate::platform;
use crate::render::{self, GpuState};
use crate::session::HeatmapSession;
use crate::store::{JsonFileStore, KeyValueStore, MemoryStore, SnapshotStore};

/// How often the desktop window list is re-enumerated.
#[cfg_attr(not(windows), allow(dead_code))]
const WINDOW_REFRESH_INTERVAL: Duration = Duration::from_secs(2);

type Session = HeatmapSession<Box<dyn KeyValueStore>>;

/// Top-level application state.
struct App {
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    panel: Option<ControlPanel>,

    session: Session,
    sink: DirectorySink,

    last_frame_time: Option<Instant>,
    #[cfg_attr(not(windows), allow(dead_code))]
    last_window_scan: Option<Instant>,
    last_cursor: Option<(f32, f32)>,
    #[cfg_attr(not(windows), allow(dead_code))]
    left_was_down: bool,

    screen_w: u32,
    screen_h: u32,

    #[cfg(windows)]
    own_hwnd: Option<windows::Win32::Foundation::HWND>,

    /// Startup failure surfaced from `run` after the loop exits.
    fatal: Option<Box<dyn Error>>,
}

/// File-backed store unless disabled; falls back to memory if the file
/// cannot be opened so the overlay still runs.
fn open_store(cli: &Cli) -> Box<dyn KeyValueStore> {
    if cli.memory_store {
        log::info!("Using in-memory store; nothing will be persisted");
        return Box::new(MemoryStore::new());
    }
    let path = cli.store_path();
    match JsonFileStore::open(&path) {
        Ok(store) => {
            log::info!("Using store {}", path.display());
            Box::new(store)
        }
        Err(e) => {
            log::warn!(
                "Cannot open store {} ({e}); falling back to memory",
                path.display()
            );
            Box::new(MemoryStore::new())
        }
    }
}

impl App {
    fn new(cli: &Cli) -> Self {
        let store = SnapshotStore::new(open_store(cli));
        let config = Session::persisted_config(&store)
            .unwrap_or_default()
            .with_overrides(cli);
        log::info!(
            "Config: cell {} px | radius {} | max {}",
            config.cell_size,
            config.kernel_radius,
            config.max_intensity
        );

        Self {
            window: None,
            gpu: None,
            panel: None,
            session: HeatmapSession::new(
                cli.page.clone(),
                config,
                store,
                cli.debounce(),
                cli.stats_period(),
            ),
            sink: DirectorySink::new(&cli.export_dir),
            last_frame_time: None,
            last_window_scan: None,
            last_cursor: None,
            left_was_down: false,
            screen_w: 0,
            screen_h: 0,
            #[cfg(windows)]
            own_hwnd: None,
            fatal: None,
        }
    }

    fn create_overlay(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Box<dyn Error>> {
        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or("no monitor found")?;
        let screen_size = monitor.size();

        // No with_transparent(true) on Windows: it sets WS_EX_LAYERED, which
        // conflicts with DirectComposition. Start hidden so DWM doesn't cache
        // stale frame state before the overlay styles land.
        let attrs = WindowAttributes::default()
            .with_title("cursorheat")
            .with_decorations(false)
            .with_visible(false)
            .with_window_level(WindowLevel::AlwaysOnTop)
            .with_inner_size(screen_size)
            .with_position(winit::dpi::PhysicalPosition::new(0, 0));
        #[cfg(not(windows))]
        let attrs = attrs.with_transparent(true);

        let window = Arc::new(event_loop.create_window(attrs)?);

        #[cfg(windows)]
        {
            platform::win32::setup_overlay(&window);
            self.own_hwnd = platform::win32::get_hwnd(&window);
        }

        let size = window.inner_size();
        self.screen_w = size.width;
        self.screen_h = size.height;
        log::info!(
            "Overlay window created: {}x{} on {:?}",
            size.width,
            size.height,
            monitor.name().unwrap_or_default()
        );

        let gpu = GpuState::new(window.clone())?;
        self.panel = Some(ControlPanel::new(&window, &gpu));
        self.gpu = Some(gpu);

        self.session.resize(size.width, size.height);

        event_loop.set_control_flow(ControlFlow::Poll);
        window.set_visible(true);
        self.window = Some(window);
        Ok(())
    }

    /// Feed cursor motion to the session; only actual moves deposit.
    fn cursor_at(&mut self, x: f32, y: f32, now: Instant) {
        if self.last_cursor == Some((x, y)) {
            return;
        }
        self.last_cursor = Some((x, y));
        self.session.pointer_moved(x, y, now);
    }

    /// Clicks on the panel itself are not attributed to elements.
    fn click(&mut self) {
        let over_panel = self
            .panel
            .as_ref()
            .is_some_and(|p| p.visible && p.egui_ctx.is_pointer_over_area());
        if let (Some((x, y)), false) = (self.last_cursor, over_panel) {
            if let Some(index) = self.session.clicked(x, y) {
                log::debug!("Click at ({x:.0}, {y:.0}) -> element #{index}");
            }
        }
    }

    #[cfg(windows)]
    fn poll_pointer(&mut self, now: Instant) {
        let (x, y) = platform::win32::get_mouse_pos();
        self.cursor_at(x, y, now);

        let down = platform::win32::is_left_button_down();
        if down && !self.left_was_down {
            self.click();
        }
        self.left_was_down = down;
    }

    #[cfg(windows)]
    fn refresh_windows(&mut self, now: Instant) {
        let due = self
            .last_window_scan
            .map_or(true, |t| now.duration_since(t) >= WINDOW_REFRESH_INTERVAL);
        if !due {
            return;
        }
        self.last_window_scan = Some(now);
        let windows = platform::win32::enumerate_windows(self.own_hwnd);
        let tree = crate::elements::DesktopTree::screen(self.screen_w, self.screen_h)
            .with_windows(windows);
        self.session.retarget_elements(&tree);
    }

    fn set_panel_visible_effects(&self) {
        let Some(panel) = &self.panel else { return };
        log::info!("Control panel {}", if panel.visible { "shown" } else { "hidden" });
        #[cfg(windows)]
        if let Some(window) = &self.window {
            platform::win32::set_click_through(window, !panel.visible);
        }
    }

    fn render_frame(&mut self) -> Vec<PanelAction> {
        let (Some(window), Some(gpu), Some(panel)) = (&self.window, &self.gpu, &mut self.panel)
        else {
            return Vec::new();
        };

        let frame = panel.run_frame(window, self.screen_w, self.screen_h, &self.session);

        gpu.draw_overlay(|encoder, view| {
            let uploads = panel.prepare_egui(&gpu.device, &gpu.queue, encoder, &frame);
            let mut pass = render::clear_pass(encoder, view);
            panel.render_egui(&mut pass, &frame);
            uploads
        });
        panel.free_textures(&frame.textures_delta);

        frame.actions
    }

    fn apply(&mut self, action: PanelAction) {
        match action {
            PanelAction::SetCellSize(cs) => self.session.set_cell_size(cs),
            PanelAction::SetKernelRadius(r) => self.session.set_kernel_radius(r),
            PanelAction::SetMaxIntensity(m) => self.session.set_max_intensity(m),
            PanelAction::SetOverlayVisible(v) => self.session.set_overlay_visible(v),
            PanelAction::Clear => {
                self.session.clear();
                self.notify("Heatmap cleared".to_string());
            }
            PanelAction::SimulateMax => self.session.simulate_max(),
            PanelAction::ExportPage => {
                let result = self.session.export_page(&mut self.sink);
                self.report_export(result);
            }
            PanelAction::ExportCombined => {
                let result = self.session.export_combined(&mut self.sink);
                self.report_export(result);
            }
            PanelAction::ExportElements => {
                let result = self.session.export_elements(&mut self.sink);
                self.report_export(result);
            }
        }
    }

    fn report_export(&mut self, result: Result<PathBuf, ExportError>) {
        let message = match result {
            Ok(path) => format!("Saved {}", path.display()),
            Err(e) if e.is_notice() => {
                log::info!("{e}");
                e.to_string()
            }
            Err(e) => {
                log::warn!("Export failed: {e}");
                format!("Export failed: {e}")
            }
        };
        self.notify(message);
    }

    fn notify(&mut self, message: String) {
        if let Some(panel) = &mut self.panel {
            panel.set_notice(message);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.create_overlay(event_loop) {
            log::error!("Overlay setup failed: {e}");
            self.fatal = Some(e);
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // The overlay is click-through, so hotkeys are polled globally.
        #[cfg(windows)]
        {
            if platform::win32::is_escape_pressed() {
                log::info!("ESC pressed, exiting");
                event_loop.exit();
                return;
            }
            let f12 = platform::win32::is_f12_pressed();
            if self.panel.as_mut().is_some_and(|p| p.poll_toggle(f12)) {
                self.set_panel_visible_effects();
            }
        }
        #[cfg(not(windows))]
        let _ = event_loop;

        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if let (Some(window), Some(panel)) = (&self.window, &mut self.panel) {
            panel.on_window_event(window, &event);
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(new_size.width, new_size.height);
                }
                if new_size.width > 0 && new_size.height > 0 {
                    self.screen_w = new_size.width;
                    self.screen_h = new_size.height;
                }
                self.session.resize(new_size.width, new_size.height);
            }
            WindowEvent::CursorMoved { position, .. } => {
                #[cfg(not(windows))]
                self.cursor_at(position.x as f32, position.y as f32, Instant::now());
                #[cfg(windows)]
                let _ = position;
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                #[cfg(not(windows))]
                self.click();
            }
            WindowEvent::KeyboardInput { event: key, .. } => match key.logical_key {
                // Windows polls F12 globally in about_to_wait.
                Key::Named(NamedKey::F12) if cfg!(not(windows)) && !key.repeat => {
                    if self
                        .panel
                        .as_mut()
                        .is_some_and(|p| p.poll_toggle(key.state.is_pressed()))
                    {
                        self.set_panel_visible_effects();
                    }
                }
                Key::Named(NamedKey::Escape) if key.state.is_pressed() => {
                    log::info!("ESC pressed, exiting");
                    event_loop.exit();
                }
                _ => {}
            },
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                if let Some(last) = self.last_frame_time {
                    let dt = now.duration_since(last).as_secs_f64();
                    if let Some(panel) = &mut self.panel {
                        panel.record_frame(dt);
                    }
                }
                self.last_frame_time = Some(now);

                #[cfg(windows)]
                {
                    self.poll_pointer(now);
                    self.refresh_windows(now);
                }

                self.session.tick(now);
                if let Some(stats) = self.session.poll_stats(now) {
                    log::debug!(
                        "Stats: total {:.2} | avg {:.2} | max {:.2}",
                        stats.total,
                        stats.average,
                        stats.max
                    );
                    if let Some(panel) = &mut self.panel {
                        panel.record_stats(stats);
                    }
                }

                for action in self.render_frame() {
                    self.apply(action);
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.session.flush();
        log::info!("Heatmap for {} flushed", self.session.page());
    }
}

/// Entry point: create the event loop and run until exit.
pub fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let event_loop = EventLoop::new()?;
    let mut app = App::new(&cli);
    event_loop.run_app(&mut app)?;
    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
