// Backing surfaces for the texture atlas: a wgpu texture for rendering, a byte
// buffer for headless use.

use crate::renderer::texture_atlas::PixelRect;

/// Creates and writes the single-channel surfaces a `TextureAtlas` packs into.
pub trait SurfaceBackend {
    type Surface;

    /// Largest width or height a surface may have.
    fn max_dimension(&self) -> u32;

    /// Allocate a zeroed `width` x `height` surface.
    fn create_surface(&mut self, width: u32, height: u32) -> Self::Surface;

    /// Copy a tightly packed `region.width() * region.height()` bitmap into the surface.
    fn write_region(&mut self, surface: &mut Self::Surface, region: PixelRect, pixels: &[u8]);
}

// ── GPU ─────────────────────────────────────────────────────────────────

/// An R8 atlas texture and the view bound by the grid pipeline.
pub struct GpuSurface {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// Allocates atlas surfaces as wgpu textures.
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl GpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }
}

impl SurfaceBackend for GpuBackend {
    type Surface = GpuSurface;

    fn max_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn create_surface(&mut self, width: u32, height: u32) -> GpuSurface {
        let texture = crate::renderer::gpu::create_atlas_texture(&self.device, width, height);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuSurface { texture, view }
    }

    fn write_region(&mut self, surface: &mut GpuSurface, region: PixelRect, pixels: &[u8]) {
        let extent = wgpu::Extent3d {
            width: region.width(),
            height: region.height(),
            depth_or_array_layers: 1,
        };
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &surface.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.left,
                    y: region.top,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(region.width()),
                rows_per_image: Some(region.height()),
            },
            extent,
        );
    }
}

// ── CPU ─────────────────────────────────────────────────────────────────

/// Default dimension limit for CPU surfaces, matching common GPU limits.
pub const DEFAULT_CPU_MAX_DIMENSION: u32 = 8192;

/// A surface held in memory, one byte per pixel, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuSurface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl CpuSurface {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Read back a region as a tightly packed bitmap.
    pub fn read_region(&self, region: PixelRect) -> Vec<u8> {
        let mut out = Vec::with_capacity((region.width() * region.height()) as usize);
        for y in region.top..region.bottom {
            let start = (y * self.width + region.left) as usize;
            out.extend_from_slice(&self.data[start..start + region.width() as usize]);
        }
        out
    }
}

/// Allocates in-memory surfaces.
#[derive(Debug, Clone)]
pub struct CpuBackend {
    max_dimension: u32,
    surfaces_created: usize,
}

impl CpuBackend {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension,
            surfaces_created: 0,
        }
    }

    /// Number of surfaces allocated so far (one per atlas construction or growth).
    pub fn surfaces_created(&self) -> usize {
        self.surfaces_created
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new(DEFAULT_CPU_MAX_DIMENSION)
    }
}

impl SurfaceBackend for CpuBackend {
    type Surface = CpuSurface;

    fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn create_surface(&mut self, width: u32, height: u32) -> CpuSurface {
        self.surfaces_created += 1;
        CpuSurface {
            width,
            height,
            data: vec![0; (width * height) as usize],
        }
    }

    fn write_region(&mut self, surface: &mut CpuSurface, region: PixelRect, pixels: &[u8]) {
        let row_len = region.width() as usize;
        for (i, row) in pixels.chunks_exact(row_len).enumerate() {
            let start = ((region.top as usize + i) * surface.width as usize) + region.left as usize;
            surface.data[start..start + row_len].copy_from_slice(row);
        }
    }
}
