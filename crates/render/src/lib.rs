//! Render → synchronize → present.
//!
//! # Invariants
//! - Committed camera aspect equals width/height of the committed frame size.
//! - After a reconfiguration the display texture matches the frame size.
//! - A frame without a pending resize commits nothing.
//! - Every map is paired with an unmap before the next render.

mod display;
mod error;
mod resize;
pub mod setup;
mod sync;
mod viewer;

pub use display::{CpuDisplay, DisplaySink, PresentError};
pub use error::ViewerError;
pub use resize::{
    ResizeCoordinator, ResizeOutcome, SurfaceSizeReceiver, SurfaceSizeSender,
    surface_size_channel,
};
pub use setup::{CameraConfig, RendererConfig};
pub use sync::{FrameSynchronizer, SyncError, SyncState};
pub use viewer::{FrameStats, Viewer, ViewerConfig};
