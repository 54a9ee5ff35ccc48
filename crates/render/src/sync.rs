use framelink_backend::{Backend, BackendError, MappedChannel, ObjectRef};
use framelink_common::Channel;

/// Where the frame target is in its render cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Rendering,
    /// `wait()` returned; channels can be mapped.
    Ready,
    Mapped(Channel),
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("cannot {op} a frame that is {state:?}")]
    InvalidTransition { op: &'static str, state: SyncState },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl SyncError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Backend(e) if e.is_fatal())
    }
}

/// Serializes render, wait, map and unmap on one frame target.
///
/// A frame goes `Idle → Rendering → Ready → Mapped → Idle`. Every call out of
/// order is rejected before it reaches the backend. A failed backend call
/// leaves the state where it was.
#[derive(Debug)]
pub struct FrameSynchronizer {
    frame: ObjectRef,
    state: SyncState,
    completed: u64,
}

impl FrameSynchronizer {
    pub fn new(frame: ObjectRef) -> Self {
        Self {
            frame,
            state: SyncState::Idle,
            completed: 0,
        }
    }

    pub fn frame(&self) -> ObjectRef {
        self.frame
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Frames that went all the way back to `Idle`.
    pub fn completed_frames(&self) -> u64 {
        self.completed
    }

    fn expect(&self, op: &'static str, state: SyncState) -> Result<(), SyncError> {
        if self.state == state {
            Ok(())
        } else {
            Err(SyncError::InvalidTransition {
                op,
                state: self.state,
            })
        }
    }

    /// Start rendering against the committed camera, renderer and world.
    pub fn render(&mut self, backend: &mut dyn Backend) -> Result<(), SyncError> {
        self.expect("render", SyncState::Idle)?;
        backend.render(self.frame)?;
        self.state = SyncState::Rendering;
        Ok(())
    }

    /// Block until the frame is complete. No timeout.
    pub fn wait(&mut self, backend: &mut dyn Backend) -> Result<(), SyncError> {
        self.expect("wait", SyncState::Rendering)?;
        backend.wait(self.frame)?;
        self.state = SyncState::Ready;
        Ok(())
    }

    /// Borrow a completed channel. The view cannot outlive the next call on
    /// `backend`; release it with [`unmap`](Self::unmap).
    pub fn map<'b>(
        &mut self,
        backend: &'b mut dyn Backend,
        channel: Channel,
    ) -> Result<MappedChannel<'b>, SyncError> {
        self.expect("map", SyncState::Ready)?;
        let view = backend.map(self.frame, channel)?;
        self.state = SyncState::Mapped(channel);
        Ok(view)
    }

    pub fn unmap(&mut self, backend: &mut dyn Backend, channel: Channel) -> Result<(), SyncError> {
        self.expect("unmap", SyncState::Mapped(channel))?;
        backend.unmap(self.frame, channel)?;
        self.state = SyncState::Idle;
        self.completed += 1;
        Ok(())
    }

    /// Map `channel`, run `f` on it, then unmap, whether or not `f` succeeded.
    ///
    /// When both `f` and the unmap fail, the error from `f` is returned.
    /// A panic in `f` skips the unmap; the frame stays mapped.
    pub fn with_mapped<R, E>(
        &mut self,
        backend: &mut dyn Backend,
        channel: Channel,
        f: impl FnOnce(&MappedChannel<'_>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<SyncError>,
    {
        let result = {
            let view = self.map(&mut *backend, channel)?;
            f(&view)
        };
        let unmapped = self.unmap(backend, channel);
        let value = result?;
        unmapped?;
        Ok(value)
    }
}
