use crate::object::{ObjectKind, ObjectRef};
use framelink_common::Channel;

/// Synchronous protocol errors.
///
/// Parameter validation problems are not here: those go through the status
/// channel (see [`crate::status`]).
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("library {0:?} not found")]
    LibraryNotFound(String),
    #[error("unsupported {kind} subtype {subtype:?}")]
    UnsupportedSubtype { kind: ObjectKind, subtype: String },
    #[error("unknown object {0}")]
    UnknownObject(ObjectRef),
    #[error("{0} was released by its owner")]
    Released(ObjectRef),
    #[error("{object} is not a {expected}")]
    WrongKind {
        object: ObjectRef,
        expected: ObjectKind,
    },
    #[error("{0} has never been committed successfully")]
    NotCommitted(ObjectRef),
    #[error("{0} already has a render in flight")]
    RenderInFlight(ObjectRef),
    #[error("{0} has no completed render; call render() and wait() first")]
    NotReady(ObjectRef),
    #[error("{0} still has mapped channels")]
    FrameMapped(ObjectRef),
    #[error("{channel} of {frame} is already mapped")]
    AlreadyMapped { frame: ObjectRef, channel: Channel },
    #[error("{channel} of {frame} is not mapped")]
    NotMapped { frame: ObjectRef, channel: Channel },
    #[error("{channel} was not requested on {frame}")]
    ChannelNotRequested { frame: ObjectRef, channel: Channel },
    #[error("device aborted after a fatal error: {0}")]
    Fatal(String),
}

impl BackendError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Fatal(_))
    }
}
