use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Drawable size in physical pixels.
///
/// Either dimension may be zero (a minimized window); use [`SurfaceExtent::is_empty`]
/// before deriving anything from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SurfaceExtent {
    pub width: u32,
    pub height: u32,
}

impl SurfaceExtent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width over height, or `None` for a zero-area extent.
    pub fn aspect(&self) -> Option<f32> {
        if self.is_empty() {
            None
        } else {
            Some(self.width as f32 / self.height as f32)
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn to_array(self) -> [u32; 2] {
        [self.width, self.height]
    }
}

impl From<[u32; 2]> for SurfaceExtent {
    fn from([width, height]: [u32; 2]) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for SurfaceExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Error parsing a `WIDTHxHEIGHT` string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid extent {input:?}: expected WIDTHxHEIGHT")]
pub struct ParseExtentError {
    pub input: String,
}

impl FromStr for SurfaceExtent {
    type Err = ParseExtentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseExtentError {
            input: s.to_string(),
        };
        let (w, h) = s.split_once(['x', 'X']).ok_or_else(err)?;
        let width = w.trim().parse().map_err(|_| err())?;
        let height = h.trim().parse().map_err(|_| err())?;
        Ok(Self { width, height })
    }
}

/// Storage layout of one channel's pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8 bits per component, sRGB-encoded, RGBA order.
    Rgba8Srgb,
    /// One unsigned 32-bit integer per pixel.
    U32,
}

/// A named output buffer of a frame target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    Color,
    PrimitiveId,
    ObjectId,
    InstanceId,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Color,
        Channel::PrimitiveId,
        Channel::ObjectId,
        Channel::InstanceId,
    ];

    /// Frame parameter that requests this channel.
    pub fn param_name(self) -> &'static str {
        match self {
            Channel::Color => "channel.color",
            Channel::PrimitiveId => "channel.primitiveId",
            Channel::ObjectId => "channel.objectId",
            Channel::InstanceId => "channel.instanceId",
        }
    }

    pub fn from_param_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.param_name() == name)
    }

    /// The only format this channel is produced in.
    pub fn format(self) -> PixelFormat {
        match self {
            Channel::Color => PixelFormat::Rgba8Srgb,
            Channel::PrimitiveId | Channel::ObjectId | Channel::InstanceId => PixelFormat::U32,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.param_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_of_720p() {
        let e = SurfaceExtent::new(1280, 720);
        assert_eq!(e.aspect(), Some(1280.0 / 720.0));
    }

    #[test]
    fn zero_extent_has_no_aspect() {
        assert!(SurfaceExtent::new(0, 0).is_empty());
        assert_eq!(SurfaceExtent::new(0, 600).aspect(), None);
        assert_eq!(SurfaceExtent::new(800, 0).aspect(), None);
    }

    #[test]
    fn parse_extent() {
        let e: SurfaceExtent = "800x600".parse().unwrap();
        assert_eq!(e, SurfaceExtent::new(800, 600));
        assert!("800".parse::<SurfaceExtent>().is_err());
        assert!("axb".parse::<SurfaceExtent>().is_err());
        assert_eq!(e.to_string(), "800x600");
    }

    #[test]
    fn channel_names_round_trip() {
        for c in Channel::ALL {
            assert_eq!(Channel::from_param_name(c.param_name()), Some(c));
        }
        assert_eq!(Channel::from_param_name("channel.depth"), None);
    }

    #[test]
    fn color_is_srgb_ids_are_u32() {
        assert_eq!(Channel::Color.format(), PixelFormat::Rgba8Srgb);
        assert_eq!(Channel::ObjectId.format(), PixelFormat::U32);
    }
}
