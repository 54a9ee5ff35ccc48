use crate::display::PresentError;
use crate::sync::SyncError;
use framelink_backend::{BackendError, ObjectRef};
use framelink_common::SurfaceExtent;

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("backend: {0}")]
    Backend(#[from] BackendError),
    #[error("frame sync: {0}")]
    Sync(#[from] SyncError),
    #[error("display: {0}")]
    Present(#[from] PresentError),
    #[error("viewer stopped after a fatal backend error")]
    Stopped,
    #[error("cannot start viewer with a {0} surface")]
    EmptyExtent(SurfaceExtent),
    #[error("device rejected the startup commit of {0}")]
    Rejected(ObjectRef),
}

impl ViewerError {
    /// True when no further frame can be produced.
    pub fn is_fatal(&self) -> bool {
        match self {
            ViewerError::Backend(e) => e.is_fatal(),
            ViewerError::Sync(e) => e.is_fatal(),
            ViewerError::Present(_) => false,
            ViewerError::Stopped | ViewerError::EmptyExtent(_) | ViewerError::Rejected(_) => true,
        }
    }
}
