//! Renderer object-graph protocol.
//!
//! Objects (camera, renderer, world, frame...) are created on a device and
//! mutated with a stage-then-commit protocol. Ownership of an object moves
//! into a parent with `set_and_release`; handles are move-only so the type
//! system tracks who still owns what. Validation problems and fatal
//! conditions arrive on a status channel rather than as return values.

mod backend;
mod error;
pub mod library;
mod object;
mod param;
pub mod reference;
pub mod status;
pub mod trace;

pub use backend::{Backend, BackendExt, ChannelPixels, MappedChannel, ParamEdit};
pub use error::BackendError;
pub use library::{DEFAULT_LIBRARY, DeviceConfig, DeviceLimits, LibraryInfo};
pub use object::{ObjectHandle, ObjectKind, ObjectRef};
pub use param::ParamValue;
pub use reference::ReferenceDevice;
pub use status::{
    CollectingStatusHandler, ProcessStatusHandler, Severity, StatusAction, StatusHandler,
    StatusMessage,
};
