//! Backend library discovery.
//!
//! Libraries are looked up by name once at startup. The returned device is
//! opaque to the caller beyond the [`Backend`] trait.

use crate::backend::Backend;
use crate::error::BackendError;
use crate::reference::ReferenceDevice;
use crate::status::StatusHandler;
use framelink_common::SurfaceExtent;
use std::path::PathBuf;

/// Library loaded when none is named on the command line.
pub const DEFAULT_LIBRARY: &str = "environment";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryInfo {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub description: &'static str,
}

impl LibraryInfo {
    fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.contains(&name)
    }
}

const LIBRARIES: &[LibraryInfo] = &[LibraryInfo {
    name: "reference",
    aliases: &["environment"],
    description: "CPU ray caster (triangles, matte, perspective camera)",
}];

/// Built-in libraries, in listing order.
pub fn available() -> &'static [LibraryInfo] {
    LIBRARIES
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Largest frame the device can allocate.
    pub max_frame_extent: SurfaceExtent,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_frame_extent: SurfaceExtent::new(16384, 16384),
        }
    }
}

/// Options applied when a device is created.
#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    /// Write every protocol call to `<dir>/framelink-trace.jsonl`.
    pub trace_dir: Option<PathBuf>,
    /// Report unknown parameters and every commit on the status channel.
    pub debug: bool,
    pub limits: DeviceLimits,
}

/// Load library `name` and create its default device.
pub fn load(
    name: &str,
    config: DeviceConfig,
    status: Box<dyn StatusHandler>,
) -> Result<Box<dyn Backend>, BackendError> {
    let info = LIBRARIES
        .iter()
        .find(|l| l.matches(name))
        .ok_or_else(|| BackendError::LibraryNotFound(name.to_string()))?;
    tracing::info!(library = info.name, requested = name, "loading backend library");
    match info.name {
        "reference" => Ok(Box::new(ReferenceDevice::new(config, status))),
        other => Err(BackendError::LibraryNotFound(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::CollectingStatusHandler;

    #[test]
    fn default_name_resolves_to_reference() {
        assert!(available().iter().any(|l| l.matches(DEFAULT_LIBRARY)));
        let dev = load(
            DEFAULT_LIBRARY,
            DeviceConfig::default(),
            Box::new(CollectingStatusHandler::new()),
        );
        assert!(dev.is_ok());
    }

    #[test]
    fn unknown_library_fails() {
        let err = load(
            "helide",
            DeviceConfig::default(),
            Box::new(CollectingStatusHandler::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, BackendError::LibraryNotFound(n) if n == "helide"));
    }

    #[test]
    fn unwritable_trace_dir_only_warns() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let log = CollectingStatusHandler::new();
        let dev = load(
            "reference",
            DeviceConfig {
                trace_dir: Some(blocker.join("trace")),
                ..DeviceConfig::default()
            },
            Box::new(log.clone()),
        );
        assert!(dev.is_ok());
        assert_eq!(log.messages().len(), 1);
    }
}
