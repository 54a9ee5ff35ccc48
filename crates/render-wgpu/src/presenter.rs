use crate::blit::BlitPipeline;
use crate::gpu::GpuContext;
use crate::texture::{self, DisplayTexture};
use framelink_backend::MappedChannel;
use framelink_common::{PixelFormat, SurfaceExtent};
use framelink_render::{DisplaySink, PresentError};

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.1,
    g: 0.1,
    b: 0.1,
    a: 1.0,
};

/// Windowed [`DisplaySink`]: uploads the color channel into a persistent
/// texture and blits it over the whole surface.
pub struct WgpuPresenter {
    gpu: GpuContext,
    blit: BlitPipeline,
    texture: DisplayTexture,
    bind_group: wgpu::BindGroup,
}

impl WgpuPresenter {
    pub fn new(gpu: GpuContext, extent: SurfaceExtent) -> Self {
        let blit = BlitPipeline::new(&gpu.device, gpu.surface_format());
        let texture = DisplayTexture::new(&gpu.device, extent);
        let bind_group = blit.bind(&gpu.device, &texture);
        Self {
            gpu,
            blit,
            texture,
            bind_group,
        }
    }

    fn reallocate(&mut self, extent: SurfaceExtent) {
        self.texture = DisplayTexture::new(&self.gpu.device, extent);
        self.bind_group = self.blit.bind(&self.gpu.device, &self.texture);
    }
}

impl DisplaySink for WgpuPresenter {
    fn extent(&self) -> SurfaceExtent {
        self.texture.extent()
    }

    fn resize(&mut self, extent: SurfaceExtent) -> Result<(), PresentError> {
        texture::check_extent(extent, self.gpu.max_texture_dimension())?;
        self.gpu.resize(extent);
        self.reallocate(extent);
        tracing::debug!(%extent, "display texture reallocated");
        Ok(())
    }

    fn upload_and_present(&mut self, color: &MappedChannel<'_>) -> Result<(), PresentError> {
        if color.format() != PixelFormat::Rgba8Srgb {
            return Err(PresentError::WrongFormat(color.format()));
        }
        if color.extent != self.texture.extent() {
            texture::check_extent(color.extent, self.gpu.max_texture_dimension())?;
            self.reallocate(color.extent);
        }
        self.texture.write(&self.gpu.queue, color.bytes());

        let output = match self.gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Outdated) => {
                self.gpu.reconfigure();
                tracing::debug!("surface outdated, skipping present");
                return Ok(());
            }
            Err(wgpu::SurfaceError::Lost) => {
                self.gpu.reconfigure();
                return Err(PresentError::SurfaceLost);
            }
            Err(wgpu::SurfaceError::Timeout) => return Err(PresentError::Timeout),
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(PresentError::OutOfMemory),
            Err(e) => return Err(PresentError::Other(e.to_string())),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("present_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });
            self.blit.draw(&mut pass, &self.bind_group);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}
