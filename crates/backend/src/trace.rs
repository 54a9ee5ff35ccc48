//! Call tracing for debugging a device session.
//!
//! Each protocol call becomes one JSON object per line in
//! `<trace dir>/framelink-trace.jsonl`, in call order.

use crate::object::ObjectRef;
use crate::param::ParamValue;
use framelink_common::Channel;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const TRACE_FILE_NAME: &str = "framelink-trace.jsonl";

/// One recorded protocol call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum TraceEvent {
    NewObject {
        object: ObjectRef,
        subtype: String,
    },
    SetParam {
        object: ObjectRef,
        name: String,
        value: ParamValue,
    },
    UnsetParam {
        object: ObjectRef,
        name: String,
    },
    Commit {
        object: ObjectRef,
    },
    Release {
        object: ObjectRef,
    },
    Render {
        frame: ObjectRef,
    },
    Wait {
        frame: ObjectRef,
    },
    Map {
        frame: ObjectRef,
        channel: Channel,
    },
    Unmap {
        frame: ObjectRef,
        channel: Channel,
    },
}

/// Append-only JSON-lines writer.
pub struct TraceRecorder {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl TraceRecorder {
    /// Create the trace directory if needed and start a fresh trace file.
    pub fn create(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(TRACE_FILE_NAME);
        let writer = BufWriter::new(File::create(&path)?);
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&mut self, event: &TraceEvent) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    /// Read a trace file back, one event per line.
    pub fn read(path: impl AsRef<Path>) -> std::io::Result<Vec<TraceEvent>> {
        let text = std::fs::read_to_string(path)?;
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(std::io::Error::from))
            .collect()
    }
}
