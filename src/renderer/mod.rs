pub mod compositor;
pub mod cursor;
pub mod damage;
pub mod gpu;
pub mod rasterizer;
pub mod surface;
pub mod texture_atlas;

use std::sync::Arc;
use std::time::Instant;

use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::config::types::FontConfig;
use crate::config::Color;
use crate::display::DisplayState;
use compositor::{instance_byte_offset, Compositor, FrameUpdate, GridDimensions};
use gpu::{
    choose_surface_format, clear_color, create_atlas_bind_group, create_atlas_sampler,
    create_bind_group_layout, create_render_pipeline, request_adapter, request_device, GpuError,
    QuadInstance, SurfaceConfig, SurfaceUniforms,
};
use rasterizer::{CosmicRasterizer, GlyphRasterizer};
use surface::GpuBackend;
use texture_atlas::TextureAtlas;

/// Instances reserved beyond the cell quads, for cursors.
const CURSOR_HEADROOM: usize = 16;

/// Top-level render coordinator.
/// Holds the GPU state, the glyph atlas and rasterizer, and the cached instances.
pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: SurfaceConfig,
    render_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    instance_count: u32,
    sampler: wgpu::Sampler,
    atlas: TextureAtlas<GpuBackend>,
    bound_generation: u64,
    rasterizer: CosmicRasterizer,
    compositor: Compositor,
    clear_color: wgpu::Color,
}

impl Renderer {
    /// Create the GPU context for `window`, the glyph atlas sized for the font's
    /// cell, and the quad pipeline.
    pub async fn new(
        window: Arc<Window>,
        background: Color,
        font: &FontConfig,
        atlas_capacity: usize,
    ) -> Result<Self, GpuError> {
        let size = window.inner_size();
        let scale_factor = window.scale_factor() as f32;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(window)?;
        let adapter = request_adapter(&instance, Some(&surface)).await?;
        let (device, queue) = request_device(&adapter).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format =
            choose_surface_format(&surface_caps.formats).ok_or(GpuError::AdapterNotFound)?;
        log::info!("Selected surface format: {:?} (is_srgb={})", format, format.is_srgb());

        // Clamp to the device limit; large HiDPI windows can exceed it.
        let max_dim = device.limits().max_texture_dimension_2d;
        let width = size.width.min(max_dim).max(1);
        let height = size.height.min(max_dim).max(1);
        let surface_config = SurfaceConfig::new(width, height, format);
        surface.configure(&device, &surface_config.to_wgpu_config());

        let rasterizer = CosmicRasterizer::new(&font.family, font.size as f32 * scale_factor);
        let (cell_w, cell_h) = rasterizer.cell_size();
        let atlas = TextureAtlas::with_capacity(
            GpuBackend::new(device.clone(), queue.clone()),
            cell_w,
            cell_h,
            atlas_capacity,
        )?;

        let dims = GridDimensions::new(width, height, cell_w as f32, cell_h as f32);
        log::info!("Grid: {}x{} cells of {cell_w}x{cell_h}px", dims.columns, dims.rows);
        let instance_capacity = 2 * dims.columns * dims.rows + CURSOR_HEADROOM;

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Surface Uniforms"),
            contents: bytemuck::bytes_of(&SurfaceUniforms::new(width, height)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let instance_buffer = create_instance_buffer(&device, instance_capacity);

        let sampler = create_atlas_sampler(&device);
        let bind_group_layout = create_bind_group_layout(&device);
        let render_pipeline = create_render_pipeline(&device, format, &bind_group_layout);
        let bind_group = create_atlas_bind_group(
            &device,
            &bind_group_layout,
            &uniform_buffer,
            &atlas.surface().view,
            &sampler,
        );
        let bound_generation = atlas.generation();

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            render_pipeline,
            bind_group_layout,
            bind_group,
            uniform_buffer,
            instance_buffer,
            instance_capacity,
            instance_count: 0,
            sampler,
            atlas,
            bound_generation,
            rasterizer,
            compositor: Compositor::new(dims),
            clear_color: clear_color(background),
        })
    }

    /// (columns, rows) that fit in the current surface.
    pub fn grid_size(&self) -> (usize, usize) {
        let dims = self.compositor.dims();
        (dims.columns, dims.rows)
    }

    /// Reconfigure the surface for a new window size and return the (columns, rows)
    /// that now fit. Zero-sized windows (minimized) keep the previous grid.
    pub fn resize(&mut self, width: u32, height: u32) -> (usize, usize) {
        if width == 0 || height == 0 {
            return self.grid_size();
        }
        let max_dim = self.device.limits().max_texture_dimension_2d;
        let width = width.min(max_dim);
        let height = height.min(max_dim);

        self.surface_config = SurfaceConfig::new(width, height, self.surface_config.format);
        self.surface
            .configure(&self.device, &self.surface_config.to_wgpu_config());
        self.queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&SurfaceUniforms::new(width, height)),
        );

        self.compositor.resize_window(width, height)
    }

    /// Reconfigure the surface at its current size, after it was lost or outdated.
    pub fn reconfigure(&mut self) {
        self.surface
            .configure(&self.device, &self.surface_config.to_wgpu_config());
    }

    /// Recompute dirty cells and cursors from `state`, upload what changed, draw,
    /// and record the frame time in `state`.
    pub fn render(&mut self, state: &mut DisplayState) -> Result<(), wgpu::SurfaceError> {
        let start = Instant::now();

        let (grid, cursors) = state.frame_parts();
        let update = self
            .compositor
            .update(grid, cursors, &mut self.atlas, &mut self.rasterizer);

        if self.bound_generation != self.atlas.generation() {
            self.bind_group = create_atlas_bind_group(
                &self.device,
                &self.bind_group_layout,
                &self.uniform_buffer,
                &self.atlas.surface().view,
                &self.sampler,
            );
            self.bound_generation = self.atlas.generation();
        }
        self.upload_instances(&update);

        let result = self.draw();
        state.record_render_duration(start.elapsed());
        result
    }

    fn upload_instances(&mut self, update: &FrameUpdate) {
        let cells = self.compositor.cell_instances();
        let cursors = self.compositor.cursor_instances();
        let needed = cells.len() + cursors.len();

        if needed > self.instance_capacity {
            self.instance_capacity = needed.next_power_of_two();
            self.instance_buffer = create_instance_buffer(&self.device, self.instance_capacity);
            write_instances(&self.queue, &self.instance_buffer, 0, cells);
        } else if update.full {
            write_instances(&self.queue, &self.instance_buffer, 0, cells);
        } else {
            for rows in &update.dirty_rows {
                for range in self.compositor.row_instance_ranges(rows.clone()) {
                    let first = range.start;
                    write_instances(&self.queue, &self.instance_buffer, first, &cells[range]);
                }
            }
        }
        write_instances(&self.queue, &self.instance_buffer, cells.len(), cursors);
        self.instance_count = needed as u32;
    }

    fn draw(&self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Grid Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if self.instance_count > 0 {
                render_pass.set_pipeline(&self.render_pipeline);
                render_pass.set_bind_group(0, &self.bind_group, &[]);
                render_pass.set_vertex_buffer(0, self.instance_buffer.slice(..));
                render_pass.draw(0..6, 0..self.instance_count);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

fn create_instance_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Quad Instances"),
        size: instance_byte_offset(capacity.max(1)),
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn write_instances(
    queue: &wgpu::Queue,
    buffer: &wgpu::Buffer,
    first: usize,
    instances: &[QuadInstance],
) {
    if instances.is_empty() {
        return;
    }
    queue.write_buffer(buffer, instance_byte_offset(first), bytemuck::cast_slice(instances));
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu::GpuContext;

    #[test]
    fn instance_buffer_holds_requested_capacity() {
        let Some(ctx) = pollster::block_on(GpuContext::new_headless()).ok() else {
            return;
        };
        let buffer = create_instance_buffer(&ctx.device, 10);
        assert_eq!(buffer.size(), 10 * std::mem::size_of::<QuadInstance>() as u64);
        assert!(buffer.usage().contains(wgpu::BufferUsages::VERTEX));
    }

    #[test]
    fn empty_instance_buffer_is_still_valid() {
        let Some(ctx) = pollster::block_on(GpuContext::new_headless()).ok() else {
            return;
        };
        let buffer = create_instance_buffer(&ctx.device, 0);
        assert_eq!(buffer.size(), std::mem::size_of::<QuadInstance>() as u64);
        write_instances(&ctx.queue, &buffer, 0, &[]);
        write_instances(&ctx.queue, &buffer, 0, &[QuadInstance::EMPTY]);
        ctx.queue.submit(std::iter::empty());
    }
}
