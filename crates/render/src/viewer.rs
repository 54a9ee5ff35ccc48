use crate::display::DisplaySink;
use crate::error::ViewerError;
use crate::resize::{ResizeCoordinator, ResizeOutcome, SurfaceSizeReceiver};
use crate::setup::{self, CameraConfig, RendererConfig};
use crate::sync::FrameSynchronizer;
use framelink_backend::{Backend, ObjectHandle, ObjectRef};
use framelink_common::{Channel, SurfaceExtent};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct ViewerConfig {
    pub extent: SurfaceExtent,
    pub camera: CameraConfig,
    pub renderer: RendererConfig,
}

/// What one call to [`Viewer::frame`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    /// Zero-based index of this frame.
    pub index: u64,
    /// Size of the presented color channel.
    pub extent: SurfaceExtent,
    pub resize: ResizeOutcome,
    pub elapsed: Duration,
}

/// Owns the device and every per-frame component.
///
/// Per frame: reconcile pending resize, render, wait, map color, upload and
/// present, unmap. A fatal backend error stops the viewer for good.
pub struct Viewer<D: DisplaySink> {
    backend: Box<dyn Backend>,
    camera: ObjectHandle,
    frame: ObjectHandle,
    sync: FrameSynchronizer,
    resize: ResizeCoordinator,
    display: D,
    stopped: bool,
}

impl<D: DisplaySink> Viewer<D> {
    /// Create camera, renderer and frame target on `backend`. The world is
    /// owned by the frame from here on.
    pub fn new(
        mut backend: Box<dyn Backend>,
        world: ObjectHandle,
        mut display: D,
        sizes: SurfaceSizeReceiver,
        config: &ViewerConfig,
    ) -> Result<Self, ViewerError> {
        let extent = config.extent;
        if extent.is_empty() {
            return Err(ViewerError::EmptyExtent(extent));
        }
        let camera = setup::create_camera(backend.as_mut(), &config.camera, extent)?;
        let renderer = setup::create_renderer(backend.as_mut(), &config.renderer)?;
        let frame = setup::create_frame(backend.as_mut(), extent, camera.object(), renderer, world)?;
        for object in [camera.object(), frame.object()] {
            if backend.commit_count(object) == 0 {
                return Err(ViewerError::Rejected(object));
            }
        }
        if display.extent() != extent {
            display.resize(extent)?;
        }
        tracing::info!(%extent, camera = %camera, frame = %frame, "viewer ready");

        Ok(Self {
            sync: FrameSynchronizer::new(frame.object()),
            resize: ResizeCoordinator::new(camera.object(), frame.object(), sizes, extent),
            backend,
            camera,
            frame,
            display,
            stopped: false,
        })
    }

    /// Run one full frame.
    pub fn frame(&mut self) -> Result<FrameStats, ViewerError> {
        if self.stopped {
            return Err(ViewerError::Stopped);
        }
        let result = self.run_frame();
        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::error!("stopping viewer: {e}");
                self.stopped = true;
            }
        }
        result
    }

    fn run_frame(&mut self) -> Result<FrameStats, ViewerError> {
        let start = Instant::now();
        let index = self.sync.completed_frames();
        let resize = self
            .resize
            .reconcile(self.backend.as_mut(), &mut self.display)?;

        self.sync.render(self.backend.as_mut())?;
        self.sync.wait(self.backend.as_mut())?;
        let extent = self
            .sync
            .with_mapped(self.backend.as_mut(), Channel::Color, |color| {
                self.display.upload_and_present(color)?;
                Ok::<_, ViewerError>(color.extent)
            })?;

        let stats = FrameStats {
            index,
            extent,
            resize,
            elapsed: start.elapsed(),
        };
        tracing::trace!(?stats, "frame done");
        Ok(stats)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn camera(&self) -> ObjectRef {
        self.camera.object()
    }

    pub fn frame_target(&self) -> ObjectRef {
        self.frame.object()
    }

    /// Size last applied to camera and frame target.
    pub fn extent(&self) -> SurfaceExtent {
        self.resize.current()
    }

    pub fn frames_presented(&self) -> u64 {
        self.sync.completed_frames()
    }

    /// Release the frame target (and with it renderer and world) and the
    /// camera. Hands the display back.
    pub fn shutdown(self) -> Result<D, ViewerError> {
        let Viewer {
            mut backend,
            camera,
            frame,
            display,
            stopped,
            ..
        } = self;
        if stopped {
            // Every call on a poisoned device fails.
            return Ok(display);
        }
        backend.release(frame)?;
        backend.release(camera)?;
        tracing::info!("viewer shut down");
        Ok(display)
    }
}
