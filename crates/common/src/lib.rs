//! Shared types used across the framelink crates.
//!
//! Nothing here talks to a backend or a GPU; these are the plain values that
//! cross crate boundaries (surface sizes, channel names, pixel formats).

mod types;

pub use types::{Channel, ParseExtentError, PixelFormat, SurfaceExtent};
