// wgpu device, surface, and render pipeline setup.

use crate::config::Color;
use crate::renderer::texture_atlas::AtlasError;

/// GPU state holding the wgpu instance, adapter, device, and queue.
/// Surface management is separate because it requires a window handle.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Create a new GPU context without a surface (headless).
    pub async fn new_headless() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = request_adapter(&instance, None).await?;
        let (device, queue) = request_device(&adapter).await?;
        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }
}

/// Select a high-performance adapter, compatible with `surface` when given.
pub async fn request_adapter(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
) -> Result<wgpu::Adapter, GpuError> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: surface,
        })
        .await
        .map_err(|_| GpuError::AdapterNotFound)?;

    let info = adapter.get_info();
    log::info!(
        "GPU adapter: {} ({:?}, {:?})",
        info.name,
        info.device_type,
        info.backend
    );
    Ok(adapter)
}

/// Downlevel limits with the adapter's own texture dimension limits.
pub fn required_limits(adapter_limits: wgpu::Limits) -> wgpu::Limits {
    wgpu::Limits::downlevel_defaults().using_resolution(adapter_limits)
}

pub async fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue), GpuError> {
    let required_limits = required_limits(adapter.limits());
    log::info!(
        "Max texture dimension: {}",
        required_limits.max_texture_dimension_2d
    );
    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("glyphgrid Device"),
            required_features: wgpu::Features::empty(),
            required_limits,
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::Off,
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
        })
        .await
        .map_err(GpuError::DeviceCreationFailed)
}

/// Errors that can occur during GPU initialization.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    AdapterNotFound,
    #[error("GPU surface creation failed: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),
    #[error("GPU device creation failed: {0}")]
    DeviceCreationFailed(wgpu::RequestDeviceError),
    #[error("glyph atlas creation failed: {0}")]
    Atlas(#[from] AtlasError),
}

/// Configuration for the render surface, extracted for testability.
#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub present_mode: wgpu::PresentMode,
}

impl SurfaceConfig {
    /// Uses Fifo present mode (guaranteed available, v-synced).
    pub fn new(width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            present_mode: wgpu::PresentMode::Fifo,
        }
    }

    pub fn to_wgpu_config(&self) -> wgpu::SurfaceConfiguration {
        wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: self.format,
            width: self.width,
            height: self.height,
            present_mode: self.present_mode,
            desired_maximum_frame_latency: 2,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
        }
    }
}

/// Prefer an sRGB format so linear instance colors are gamma-encoded on write.
pub fn choose_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .find(|f| f.is_srgb())
        .or_else(|| formats.first())
        .copied()
}

/// Background clear color as linear values for an sRGB surface.
pub fn clear_color(background: Color) -> wgpu::Color {
    let [r, g, b, a] = background.to_linear_array();
    wgpu::Color {
        r: r as f64,
        g: g as f64,
        b: b as f64,
        a: a as f64,
    }
}

/// One textured quad: a cell background, a glyph, or an underline cursor.
/// Layout must match the QuadInstance struct in quad.wgsl.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadInstance {
    pub rect: [f32; 4],  // x, y, width, height in pixels
    pub uv: [f32; 4],    // left, top, right, bottom in the atlas
    pub color: [f32; 4], // linear RGBA
}

impl QuadInstance {
    /// Zero-area quad; rasterizes no fragments.
    pub const EMPTY: QuadInstance = QuadInstance {
        rect: [0.0; 4],
        uv: [0.0; 4],
        color: [0.0; 4],
    };

    pub fn vertex_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x4,
                    offset: 0,
                    shader_location: 0,
                },
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x4,
                    offset: 16,
                    shader_location: 1,
                },
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x4,
                    offset: 32,
                    shader_location: 2,
                },
            ],
        }
    }
}

/// Uniform data for the quad shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SurfaceUniforms {
    pub surface_size: [f32; 2],
    pub _padding: [f32; 2],
}

impl SurfaceUniforms {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface_size: [width as f32, height as f32],
            _padding: [0.0; 2],
        }
    }
}

/// Group 0: uniforms (binding 0), atlas texture (binding 1), sampler (binding 2).
pub fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Quad Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

pub fn create_render_pipeline(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Quad Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/quad.wgsl").into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Quad Pipeline Layout"),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Quad Render Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[QuadInstance::vertex_buffer_layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Allocate a zeroed R8 atlas texture, written to region by region.
pub fn create_atlas_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Glyph Atlas"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

/// Glyphs are drawn at their packed pixel size, so nearest sampling is exact.
pub fn create_atlas_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Atlas Sampler"),
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::FilterMode::Nearest,
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        ..Default::default()
    })
}

pub fn create_atlas_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniform_buffer: &wgpu::Buffer,
    atlas_view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Quad Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(atlas_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::surface::{GpuBackend, SurfaceBackend};
    use crate::renderer::texture_atlas::{FontStyle, GlyphBitmap, GlyphKey, TextureAtlas};

    /// GPU tests return early on machines without an adapter.
    fn try_create_headless() -> Option<GpuContext> {
        pollster::block_on(GpuContext::new_headless()).ok()
    }

    // ── Pure data tests ────────────────────────────────────────────

    #[test]
    fn surface_config_uses_fifo_and_keeps_dimensions() {
        let cfg = SurfaceConfig::new(1280, 720, wgpu::TextureFormat::Bgra8UnormSrgb);
        let wgpu_cfg = cfg.to_wgpu_config();
        assert_eq!((wgpu_cfg.width, wgpu_cfg.height), (1280, 720));
        assert_eq!(wgpu_cfg.format, wgpu::TextureFormat::Bgra8UnormSrgb);
        assert_eq!(wgpu_cfg.present_mode, wgpu::PresentMode::Fifo);
    }

    #[test]
    fn surface_format_prefers_srgb() {
        let formats = [
            wgpu::TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Bgra8UnormSrgb,
        ];
        assert_eq!(
            choose_surface_format(&formats),
            Some(wgpu::TextureFormat::Bgra8UnormSrgb)
        );
        assert_eq!(
            choose_surface_format(&[wgpu::TextureFormat::Rgba8Unorm]),
            Some(wgpu::TextureFormat::Rgba8Unorm)
        );
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn required_limits_take_texture_size_from_adapter() {
        let adapter_limits = wgpu::Limits {
            max_texture_dimension_1d: 16384,
            max_texture_dimension_2d: 16384,
            ..wgpu::Limits::default()
        };
        let limits = required_limits(adapter_limits);
        assert_eq!(limits.max_texture_dimension_2d, 16384);
        let downlevel = wgpu::Limits::downlevel_defaults();
        assert_eq!(limits.max_bind_groups, downlevel.max_bind_groups);
        assert_eq!(limits.max_buffer_size, downlevel.max_buffer_size);
    }

    #[test]
    fn device_exposes_adapter_texture_size() {
        let Some(ctx) = try_create_headless() else {
            return;
        };
        assert_eq!(
            ctx.device.limits().max_texture_dimension_2d,
            ctx.adapter.limits().max_texture_dimension_2d
        );
    }

    #[test]
    fn clear_color_is_linear() {
        let c = clear_color(Color::new(0.5, 0.0, 1.0, 1.0));
        assert!((c.r - 0.214).abs() < 0.001);
        assert_eq!(c.g, 0.0);
        assert!((c.b - 1.0).abs() < 1e-6);
        assert_eq!(c.a, 1.0);
    }

    #[test]
    fn quad_instance_is_48_bytes() {
        assert_eq!(std::mem::size_of::<QuadInstance>(), 48);
        assert_eq!(bytemuck::bytes_of(&QuadInstance::EMPTY), &[0u8; 48]);
    }

    #[test]
    fn quad_instance_layout_has_three_vec4_attributes() {
        let layout = QuadInstance::vertex_buffer_layout();
        assert_eq!(layout.array_stride, 48);
        assert_eq!(layout.step_mode, wgpu::VertexStepMode::Instance);
        let offsets: Vec<u64> = layout.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 16, 32]);
    }

    #[test]
    fn surface_uniforms_are_16_bytes() {
        assert_eq!(std::mem::size_of::<SurfaceUniforms>(), 16);
        assert_eq!(SurfaceUniforms::new(800, 600).surface_size, [800.0, 600.0]);
    }

    // ── GPU tests ──────────────────────────────────────────────────

    #[test]
    fn shader_compiles_and_pipeline_creates() {
        let Some(ctx) = try_create_headless() else {
            return;
        };
        let layout = create_bind_group_layout(&ctx.device);
        let _pipeline =
            create_render_pipeline(&ctx.device, wgpu::TextureFormat::Bgra8UnormSrgb, &layout);
    }

    #[test]
    fn atlas_texture_is_r8_with_requested_size() {
        let Some(ctx) = try_create_headless() else {
            return;
        };
        let texture = create_atlas_texture(&ctx.device, 64, 32);
        assert_eq!((texture.width(), texture.height()), (64, 32));
        assert_eq!(texture.format(), wgpu::TextureFormat::R8Unorm);
    }

    #[test]
    fn gpu_backed_atlas_grows_within_device_limits() {
        let Some(ctx) = try_create_headless() else {
            return;
        };
        let backend = GpuBackend::new(ctx.device.clone(), ctx.queue.clone());
        let max = backend.max_dimension();
        let mut atlas = TextureAtlas::with_capacity(backend, 8, 16, 4).unwrap();
        for i in 0..64u32 {
            let key = GlyphKey::glyph(char::from_u32(0x41 + i).unwrap(), FontStyle::Regular);
            atlas
                .add_item(key, GlyphBitmap::new(vec![0x80; 128], 8, 16))
                .unwrap();
        }
        assert!(atlas.generation() >= 1);
        assert!(atlas.surface().texture.width() <= max);
        assert_eq!(atlas.surface().texture.width(), atlas.width());
    }

    #[test]
    fn bind_group_creates_for_atlas_view() {
        let Some(ctx) = try_create_headless() else {
            return;
        };
        let uniform_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Test Uniforms"),
            size: std::mem::size_of::<SurfaceUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM,
            mapped_at_creation: false,
        });
        let texture = create_atlas_texture(&ctx.device, 64, 64);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = create_atlas_sampler(&ctx.device);
        let layout = create_bind_group_layout(&ctx.device);
        let _bind_group =
            create_atlas_bind_group(&ctx.device, &layout, &uniform_buffer, &view, &sampler);
    }
}
