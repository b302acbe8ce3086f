//! State shared by every renderer variant: target size, main framebuffer,
//! clear color, clock and render variables.

use glam::{Mat4, Vec3};
use log::{info, warn};

use crate::renderer::backend::{
    Caps, CapsFlags, ClearOp, CommandStream, FramebufferDesc, FramebufferId, Owned, PassDescriptor,
    ViewId, ViewRect, ViewTransform,
};
use crate::errors::Result;
use crate::renderer::settings::{RenderVariables, RendererSettings};
use crate::scene::Scene;

/// sRGB transfer function inverse, per channel.
#[inline]
#[must_use]
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Packs an sRGB sky color as a linear `0xRRGGBBFF` clear value.
#[must_use]
pub fn clear_color_from_sky(sky: Vec3) -> u32 {
    let channel = |c: f32| (srgb_to_linear(c).clamp(0.0, 1.0) * 255.0).round() as u32;
    (channel(sky.x) << 24) | (channel(sky.y) << 16) | (channel(sky.z) << 8) | 0xff
}

#[derive(Debug)]
pub struct RendererCore {
    pub settings: RendererSettings,
    pub variables: RenderVariables,
    width: u32,
    height: u32,
    clear_color: u32,
    /// Seconds accumulated over `render` calls.
    time: f32,
    frame_buffer: Owned<FramebufferId>,
    view: Mat4,
    proj: Mat4,
}

impl RendererCore {
    /// Fails when the settings do not validate.
    pub fn new(settings: RendererSettings) -> Result<Self> {
        settings.validate()?;
        let variables = RenderVariables::from_settings(&settings);
        let clear_color = settings.fallback_clear_color;
        Ok(Self {
            settings,
            variables,
            width: 0,
            height: 0,
            clear_color,
            time: 0.0,
            frame_buffer: Owned::invalid(),
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        })
    }

    /// Requirements of every variant: an HDR multisampled render target.
    #[must_use]
    pub fn supported(caps: &Caps) -> bool {
        caps.has(CapsFlags::RGBA16F_MSAA_TARGET)
    }

    /// Records the new target size and (re)creates the main framebuffer when
    /// it is missing or has a different size.
    pub fn reset(&mut self, gpu: &mut dyn CommandStream, width: u32, height: u32) {
        let resized = width != self.width || height != self.height;
        self.width = width;
        self.height = height;
        if self.frame_buffer.is_valid() && !resized {
            return;
        }
        self.frame_buffer = gpu.create_framebuffer(&FramebufferDesc {
            label: "main_hdr".into(),
            width,
            height,
            depth: true,
        });
        if self.frame_buffer.is_valid() {
            info!("Main framebuffer created: {width}x{height}");
        } else {
            warn!("Failed to create framebuffer");
        }
    }

    /// Advances the clock and picks the frame's clear color.
    pub fn begin_frame(&mut self, scene: &Scene, dt: f32) {
        self.time += dt;
        self.clear_color = if scene.loaded {
            clear_color_from_sky(scene.sky_color)
        } else {
            self.settings.fallback_clear_color
        };
    }

    /// Derives this frame's view and projection from the scene camera.
    pub fn set_view_projection(&mut self, scene: &Scene) -> ViewTransform {
        let aspect = if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        };
        self.view = scene.camera.view_matrix();
        self.proj = scene.camera.projection_matrix(aspect);
        ViewTransform {
            view: self.view,
            proj: self.proj,
        }
    }

    /// The clearing pass that draws into the main framebuffer.
    #[must_use]
    pub fn main_pass(&self, id: ViewId, name: &'static str) -> PassDescriptor {
        PassDescriptor::new(id, name)
            .with_rect(self.view_rect())
            .with_clear(ClearOp::ColorDepth {
                rgba: self.clear_color,
                depth: 1.0,
            })
            .with_target(self.frame_buffer.valid_id())
    }

    /// Releases the framebuffer. Size and clock are kept.
    pub fn shutdown(&mut self) {
        self.frame_buffer = Owned::invalid();
    }

    #[inline]
    #[must_use]
    pub fn view_rect(&self) -> ViewRect {
        ViewRect::new(0, 0, self.width, self.height)
    }

    #[must_use]
    pub fn frame_buffer(&self) -> Option<FramebufferId> {
        self.frame_buffer.valid_id()
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn clear_color(&self) -> u32 {
        self.clear_color
    }

    #[must_use]
    pub fn time(&self) -> f32 {
        self.time
    }

    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        self.proj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sky_clear_color_is_linear_and_opaque() {
        assert_eq!(clear_color_from_sky(Vec3::ZERO), 0x0000_00ff);
        assert_eq!(clear_color_from_sky(Vec3::ONE), 0xffff_ffff);
        // sRGB 0.5 is ~0.214 linear
        assert_eq!(clear_color_from_sky(Vec3::new(0.5, 0.0, 2.0)), (55 << 24) | (0xff << 8) | 0xff);
    }

    #[test]
    fn unloaded_scene_uses_fallback_color() {
        let mut core = RendererCore::new(RendererSettings::default()).unwrap();
        core.begin_frame(&Scene::default(), 0.25);
        core.begin_frame(&Scene::default(), 0.25);
        assert_eq!(core.clear_color(), 0x3030_30ff);
        assert!((core.time() - 0.5).abs() < f32::EPSILON);
    }
}
