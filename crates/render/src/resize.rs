use crate::display::DisplaySink;
use crate::error::ViewerError;
use framelink_backend::{Backend, BackendExt, ObjectRef};
use framelink_common::SurfaceExtent;
use std::sync::mpsc;

/// Create the size channel between the windowing layer and the viewer.
pub fn surface_size_channel() -> (SurfaceSizeSender, SurfaceSizeReceiver) {
    let (tx, rx) = mpsc::channel();
    (SurfaceSizeSender { tx }, SurfaceSizeReceiver { rx })
}

/// Windowing side of the size channel. Not `Clone`: there is one producer.
#[derive(Debug)]
pub struct SurfaceSizeSender {
    tx: mpsc::Sender<SurfaceExtent>,
}

impl SurfaceSizeSender {
    /// Report a new drawable size. Returns false once the viewer is gone.
    pub fn notify(&self, width: u32, height: u32) -> bool {
        self.tx.send(SurfaceExtent::new(width, height)).is_ok()
    }
}

#[derive(Debug)]
pub struct SurfaceSizeReceiver {
    rx: mpsc::Receiver<SurfaceExtent>,
}

impl SurfaceSizeReceiver {
    /// Drain every pending event and keep the most recent.
    pub fn take_latest(&self) -> Option<SurfaceExtent> {
        self.rx.try_iter().last()
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    /// No size event was pending.
    Unchanged,
    /// Camera, frame target and display were reconfigured to this size.
    Resized(SurfaceExtent),
    /// A zero-area size arrived and was ignored.
    Skipped(SurfaceExtent),
}

/// Keeps camera aspect, frame size and display texture in step with the
/// window.
#[derive(Debug)]
pub struct ResizeCoordinator {
    camera: ObjectRef,
    frame: ObjectRef,
    sizes: SurfaceSizeReceiver,
    current: SurfaceExtent,
}

impl ResizeCoordinator {
    pub fn new(
        camera: ObjectRef,
        frame: ObjectRef,
        sizes: SurfaceSizeReceiver,
        initial: SurfaceExtent,
    ) -> Self {
        Self {
            camera,
            frame,
            sizes,
            current: initial,
        }
    }

    /// Size last applied to the frame target.
    pub fn current(&self) -> SurfaceExtent {
        self.current
    }

    /// Apply the latest pending size, if any. Runs once per frame, before
    /// rendering.
    pub fn reconcile(
        &mut self,
        backend: &mut dyn Backend,
        display: &mut dyn DisplaySink,
    ) -> Result<ResizeOutcome, ViewerError> {
        let Some(extent) = self.sizes.take_latest() else {
            return Ok(ResizeOutcome::Unchanged);
        };
        let Some(aspect) = extent.aspect() else {
            tracing::debug!(%extent, kept = %self.current, "ignoring zero-area resize");
            return Ok(ResizeOutcome::Skipped(extent));
        };

        backend.edit(self.camera).set("aspect", aspect).commit()?;
        backend.edit(self.frame).set("size", extent).commit()?;
        display.resize(extent)?;
        tracing::debug!(from = %self.current, to = %extent, aspect, "surface resized");
        self.current = extent;
        Ok(ResizeOutcome::Resized(extent))
    }
}
