pub mod overlay;

use std::sync::Arc;
use winit::window::Window;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to create wgpu surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter found: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create wgpu device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

/// Alpha modes that let the desktop show through cleared pixels, best first.
const SEE_THROUGH_ALPHA: [wgpu::CompositeAlphaMode; 2] = [
    wgpu::CompositeAlphaMode::PreMultiplied,
    wgpu::CompositeAlphaMode::PostMultiplied,
];

/// The overlay repaints every frame, so a dropped frame is never worth a stall.
const PRESENT_PREFERENCE: [wgpu::PresentMode; 2] =
    [wgpu::PresentMode::Mailbox, wgpu::PresentMode::Fifo];

/// Swapchain settings picked from what the surface supports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceChoice {
    pub format: wgpu::TextureFormat,
    pub alpha_mode: wgpu::CompositeAlphaMode,
    pub present_mode: wgpu::PresentMode,
}

impl SurfaceChoice {
    /// egui-wgpu applies its own gamma, so a linear format is preferred.
    pub fn pick(
        formats: &[wgpu::TextureFormat],
        alpha_modes: &[wgpu::CompositeAlphaMode],
        present_modes: &[wgpu::PresentMode],
    ) -> Self {
        let format = formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| formats.first().copied())
            .unwrap_or(wgpu::TextureFormat::Bgra8Unorm);
        let alpha_mode = SEE_THROUGH_ALPHA
            .into_iter()
            .find(|m| alpha_modes.contains(m))
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let present_mode = PRESENT_PREFERENCE
            .into_iter()
            .find(|m| present_modes.contains(m))
            .unwrap_or(wgpu::PresentMode::Fifo);
        Self {
            format,
            alpha_mode,
            present_mode,
        }
    }

    pub fn see_through(&self) -> bool {
        SEE_THROUGH_ALPHA.contains(&self.alpha_mode)
    }
}

/// Device plus the transparent swapchain the heat overlay and panel are
/// presented on. Both are egui shapes; nothing else is drawn.
pub struct GpuState {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    pub surface_config: wgpu::SurfaceConfiguration,
}

#[cfg(windows)]
fn instance_descriptor() -> wgpu::InstanceDescriptor {
    // Per-pixel alpha on Windows needs DX12 presenting through DirectComposition.
    wgpu::InstanceDescriptor {
        backends: wgpu::Backends::DX12,
        backend_options: wgpu::BackendOptions {
            dx12: wgpu::Dx12BackendOptions {
                presentation_system: wgpu_types::Dx12SwapchainKind::DxgiFromVisual,
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

#[cfg(not(windows))]
fn instance_descriptor() -> wgpu::InstanceDescriptor {
    wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    }
}

impl GpuState {
    pub fn new(window: Arc<Window>) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&instance_descriptor());
        let surface = instance.create_surface(window)?;

        // A fullscreen overlay has no reason to wake the discrete GPU.
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;
        let info = adapter.get_info();
        log::info!("Overlay adapter {} on {:?}", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("cursorheat_device"),
            ..Default::default()
        }))?;

        let caps = surface.get_capabilities(&adapter);
        let choice = SurfaceChoice::pick(&caps.formats, &caps.alpha_modes, &caps.present_modes);
        if !choice.see_through() {
            log::warn!(
                "Surface offers no see-through alpha mode ({:?}); heat overlay will cover the desktop",
                caps.alpha_modes
            );
        }
        log::info!("Overlay surface {choice:?}");

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: choice.format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: choice.present_mode,
            alpha_mode: choice.alpha_mode,
            view_formats: Vec::new(),
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
        })
    }

    /// Follow the overlay window to a new size. Zero-area sizes are skipped.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
    }

    /// Acquire the next swapchain image, let `paint` record into it, then
    /// submit `paint`'s extra command buffers ahead of the frame's own and
    /// present. A lost or outdated surface is reconfigured and the frame dropped.
    pub fn draw_overlay<F>(&self, paint: F)
    where
        F: FnOnce(&mut wgpu::CommandEncoder, &wgpu::TextureView) -> Vec<wgpu::CommandBuffer>,
    {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Overlay surface out of date, reconfiguring");
                self.surface.configure(&self.device, &self.surface_config);
                return;
            }
            Err(e) => {
                log::warn!("Dropping overlay frame: {e}");
                return;
            }
        };

        let view = output.texture.create_view(&Default::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("overlay_encoder"),
            });
        let uploads = paint(&mut encoder, &view);

        self.queue
            .submit(uploads.into_iter().chain([encoder.finish()]));
        output.present();
    }
}

/// Pass that wipes `view` to fully transparent. The lifetime is detached so
/// egui_wgpu can paint into it.
pub fn clear_pass(
    encoder: &mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
) -> wgpu::RenderPass<'static> {
    encoder
        .begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("overlay_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            ..Default::default()
        })
        .forget_lifetime()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::{CompositeAlphaMode as Alpha, PresentMode, TextureFormat};

    #[test]
    fn prefers_linear_format() {
        let c = SurfaceChoice::pick(
            &[TextureFormat::Bgra8UnormSrgb, TextureFormat::Rgba8Unorm],
            &[Alpha::Opaque, Alpha::PreMultiplied],
            &[PresentMode::Fifo],
        );
        assert_eq!(c.format, TextureFormat::Rgba8Unorm);
        assert_eq!(c.alpha_mode, Alpha::PreMultiplied);
        assert_eq!(c.present_mode, PresentMode::Fifo);
        assert!(c.see_through());
    }

    #[test]
    fn srgb_only_surface_still_gets_a_format() {
        let c = SurfaceChoice::pick(&[TextureFormat::Bgra8UnormSrgb], &[], &[]);
        assert_eq!(c.format, TextureFormat::Bgra8UnormSrgb);
        assert_eq!(SurfaceChoice::pick(&[], &[], &[]).format, TextureFormat::Bgra8Unorm);
    }

    #[test]
    fn falls_back_to_post_multiplied_then_auto() {
        let post = SurfaceChoice::pick(&[], &[Alpha::Opaque, Alpha::PostMultiplied], &[]);
        assert_eq!(post.alpha_mode, Alpha::PostMultiplied);

        let opaque = SurfaceChoice::pick(&[], &[Alpha::Opaque], &[]);
        assert_eq!(opaque.alpha_mode, Alpha::Auto);
        assert!(!opaque.see_through());
    }

    #[test]
    fn mailbox_wins_when_offered() {
        let c = SurfaceChoice::pick(
            &[],
            &[],
            &[PresentMode::Fifo, PresentMode::Immediate, PresentMode::Mailbox],
        );
        assert_eq!(c.present_mode, PresentMode::Mailbox);
    }
}
