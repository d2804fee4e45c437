//! Per-eye color and depth render targets.

use crate::{eye::Eye, runtime::RenderSize};

pub const EYE_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const EYE_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Color and depth for a single eye.
pub struct EyeTarget {
    pub color_tex: wgpu::Texture,
    pub color: wgpu::TextureView,
    pub depth: wgpu::TextureView,
    // Keep alive for the lifetime of the view.
    _depth_tex: wgpu::Texture,
}

/// Both eyes' targets, sized once from the runtime's recommendation.
pub struct EyeTargets {
    eyes: [EyeTarget; 2],
    pub size: RenderSize,
}

impl EyeTargets {
    pub fn new(device: &wgpu::Device, size: RenderSize) -> Self {
        let extent = wgpu::Extent3d {
            width: size.width.max(1),
            height: size.height.max(1),
            depth_or_array_layers: 1,
        };

        let create_tex = |label: &str, format, usage| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: extent,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };

        let make_eye = |eye: Eye| {
            let (color_label, depth_label) = match eye {
                Eye::Left => ("Left Eye Color", "Left Eye Depth"),
                Eye::Right => ("Right Eye Color", "Right Eye Depth"),
            };
            // Sampled by the mirror blit, read by the compositor.
            let color_tex = create_tex(
                color_label,
                EYE_COLOR_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
            );
            let depth_tex = create_tex(
                depth_label,
                EYE_DEPTH_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            );
            EyeTarget {
                color: color_tex.create_view(&wgpu::TextureViewDescriptor::default()),
                depth: depth_tex.create_view(&wgpu::TextureViewDescriptor::default()),
                color_tex,
                _depth_tex: depth_tex,
            }
        };

        log::debug!("Allocated eye targets {}x{}", extent.width, extent.height);
        Self {
            eyes: [make_eye(Eye::Left), make_eye(Eye::Right)],
            size,
        }
    }

    pub fn eye(&self, eye: Eye) -> &EyeTarget {
        &self.eyes[eye.index()]
    }
}
