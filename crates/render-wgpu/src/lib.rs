//! wgpu presentation for framelink.
//!
//! The color channel is uploaded into a persistent sRGB texture and drawn as
//! one full-surface quad.
//!
//! # Invariants
//! - The display texture is only written before the pass that samples it is
//!   recorded.
//! - The texture is reallocated whenever the frame size changes.

mod blit;
mod gpu;
mod presenter;
mod shaders;
mod texture;

pub use gpu::{GpuContext, GpuInitError};
pub use presenter::WgpuPresenter;
pub use texture::DISPLAY_FORMAT;
