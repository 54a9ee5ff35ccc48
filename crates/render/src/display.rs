use framelink_backend::MappedChannel;
use framelink_common::{PixelFormat, SurfaceExtent};

#[derive(Debug, thiserror::Error)]
pub enum PresentError {
    #[error("display expects an rgba8 color channel, got {0:?}")]
    WrongFormat(PixelFormat),
    #[error("{extent} exceeds the display limit of {max} pixels per side")]
    TooLarge { extent: SurfaceExtent, max: u32 },
    #[error("presentation surface lost")]
    SurfaceLost,
    #[error("timed out acquiring the next surface texture")]
    Timeout,
    #[error("out of GPU memory")]
    OutOfMemory,
    #[error("presentation failed: {0}")]
    Other(String),
}

/// Display-side consumer of the color channel.
///
/// Holds a texture mirroring the frame target. `upload_and_present` reads
/// straight from the mapped channel, so callers run it between map and unmap.
pub trait DisplaySink {
    /// Current size of the display texture.
    fn extent(&self) -> SurfaceExtent;

    /// Reallocate the display texture (and any surface configuration) to
    /// `extent`.
    fn resize(&mut self, extent: SurfaceExtent) -> Result<(), PresentError>;

    /// Copy `color` into the display texture and present one full-surface
    /// quad sampling it. Rows of `color` run bottom to top.
    fn upload_and_present(&mut self, color: &MappedChannel<'_>) -> Result<(), PresentError>;
}

/// Headless display that keeps a CPU copy of the last presented frame.
#[derive(Debug, Default, Clone)]
pub struct CpuDisplay {
    extent: SurfaceExtent,
    texels: Vec<[u8; 4]>,
    reallocations: u64,
    sub_image_updates: u64,
    presented: u64,
}

impl CpuDisplay {
    pub fn new(extent: SurfaceExtent) -> Self {
        Self {
            extent,
            texels: vec![[0; 4]; extent.pixel_count()],
            ..Self::default()
        }
    }

    /// Texture contents, rows bottom to top.
    pub fn texels(&self) -> &[[u8; 4]] {
        &self.texels
    }

    /// Times the texture storage was reallocated, counting `resize` calls
    /// and uploads whose size did not match.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Uploads that fit the existing storage.
    pub fn sub_image_updates(&self) -> u64 {
        self.sub_image_updates
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    fn reallocate(&mut self, extent: SurfaceExtent) {
        self.extent = extent;
        self.texels = vec![[0; 4]; extent.pixel_count()];
        self.reallocations += 1;
    }
}

impl DisplaySink for CpuDisplay {
    fn extent(&self) -> SurfaceExtent {
        self.extent
    }

    fn resize(&mut self, extent: SurfaceExtent) -> Result<(), PresentError> {
        self.reallocate(extent);
        Ok(())
    }

    fn upload_and_present(&mut self, color: &MappedChannel<'_>) -> Result<(), PresentError> {
        let pixels = color
            .rgba8()
            .ok_or(PresentError::WrongFormat(color.format()))?;
        if color.extent == self.extent {
            self.sub_image_updates += 1;
        } else {
            tracing::debug!(from = %self.extent, to = %color.extent, "display texture size mismatch, reallocating");
            self.reallocate(color.extent);
        }
        self.texels.copy_from_slice(pixels);
        self.presented += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framelink_backend::ChannelPixels;
    use framelink_common::Channel;

    #[test]
    fn matching_upload_is_a_sub_image_update() {
        let mut display = CpuDisplay::new(SurfaceExtent::new(2, 1));
        let px = [[255, 0, 0, 255], [0, 255, 0, 255]];
        let view = MappedChannel::new(
            Channel::Color,
            SurfaceExtent::new(2, 1),
            ChannelPixels::Rgba8(&px),
        );
        display.upload_and_present(&view).unwrap();
        assert_eq!(display.sub_image_updates(), 1);
        assert_eq!(display.reallocations(), 0);
        assert_eq!(display.texels(), &px);
        assert_eq!(display.presented(), 1);
    }

    #[test]
    fn mismatched_upload_reallocates() {
        let mut display = CpuDisplay::new(SurfaceExtent::new(4, 4));
        let px = [[9, 9, 9, 255]; 3];
        let view = MappedChannel::new(
            Channel::Color,
            SurfaceExtent::new(3, 1),
            ChannelPixels::Rgba8(&px),
        );
        display.upload_and_present(&view).unwrap();
        assert_eq!(display.extent(), SurfaceExtent::new(3, 1));
        assert_eq!(display.reallocations(), 1);
    }

    #[test]
    fn id_channel_is_rejected() {
        let mut display = CpuDisplay::new(SurfaceExtent::new(1, 1));
        let ids = [1u32];
        let view = MappedChannel::new(
            Channel::ObjectId,
            SurfaceExtent::new(1, 1),
            ChannelPixels::U32(&ids),
        );
        assert!(matches!(
            display.upload_and_present(&view),
            Err(PresentError::WrongFormat(PixelFormat::U32))
        ));
        assert_eq!(display.presented(), 0);
    }
}
