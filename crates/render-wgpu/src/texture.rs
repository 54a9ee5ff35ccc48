use framelink_common::SurfaceExtent;
use framelink_render::PresentError;

pub const DISPLAY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Reject extents the device cannot allocate a texture for.
pub(crate) fn check_extent(extent: SurfaceExtent, max_dimension: u32) -> Result<(), PresentError> {
    if extent.width > max_dimension || extent.height > max_dimension {
        Err(PresentError::TooLarge {
            extent,
            max: max_dimension,
        })
    } else {
        Ok(())
    }
}

/// GPU texture mirroring the frame's color channel.
pub struct DisplayTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    extent: SurfaceExtent,
}

impl DisplayTexture {
    pub fn new(device: &wgpu::Device, extent: SurfaceExtent) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("display_texture"),
            size: Self::size(extent),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DISPLAY_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            extent,
        }
    }

    fn size(extent: SurfaceExtent) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: extent.width.max(1),
            height: extent.height.max(1),
            depth_or_array_layers: 1,
        }
    }

    pub fn extent(&self) -> SurfaceExtent {
        self.extent
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Overwrite the whole texture with tightly packed RGBA8 rows.
    pub fn write(&self, queue: &wgpu::Queue, rgba: &[u8]) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.extent.width),
                rows_per_image: Some(self.extent.height),
            },
            Self::size(self.extent),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extents_past_the_device_limit_are_rejected() {
        assert!(check_extent(SurfaceExtent::new(8192, 8192), 8192).is_ok());
        assert!(check_extent(SurfaceExtent::new(1, 1), 8192).is_ok());
        assert!(matches!(
            check_extent(SurfaceExtent::new(9000, 4000), 8192),
            Err(PresentError::TooLarge { max: 8192, .. })
        ));
        assert!(check_extent(SurfaceExtent::new(800, 8193), 8192).is_err());
    }
}
