//! Reference device: a CPU implementation of the [`Backend`] protocol.
//!
//! Rendering is synchronous. `render()` snapshots the committed object graph
//! and `wait()` ray-casts it, so a frame always reflects the state committed
//! before `render()` was called.

mod raster;
mod store;
mod validate;

use crate::backend::{Backend, ChannelPixels, MappedChannel};
use crate::error::BackendError;
use crate::library::DeviceConfig;
use crate::object::{ObjectHandle, ObjectKind, ObjectRef};
use crate::param::ParamValue;
use crate::status::{Severity, StatusAction, StatusHandler, StatusMessage};
use crate::trace::{TraceEvent, TraceRecorder};
use framelink_common::Channel;
use glam::{Vec3, Vec4};
use raster::{CameraState, FrameBuffers, RenderJob, SurfaceState};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use store::{ObjectEntry, ObjectStore};
use validate::Validator;

const DEFAULT_BACKGROUND: Vec4 = Vec4::new(0.1, 0.1, 0.1, 1.0);
const DEFAULT_SURFACE_COLOR: Vec3 = Vec3::new(0.8, 0.8, 0.8);

#[derive(Debug, Default)]
struct FrameState {
    /// Snapshot taken by `render()`, consumed by `wait()`.
    pending: Option<RenderJob>,
    buffers: Option<FrameBuffers>,
    mapped: BTreeSet<Channel>,
}

pub struct ReferenceDevice {
    store: ObjectStore,
    frames: BTreeMap<ObjectRef, FrameState>,
    status: Box<dyn StatusHandler>,
    config: DeviceConfig,
    trace: Option<TraceRecorder>,
    /// Set once a FATAL message was raised or the handler asked to abort.
    poisoned: Option<String>,
}

impl ReferenceDevice {
    pub fn new(config: DeviceConfig, status: Box<dyn StatusHandler>) -> Self {
        let mut device = Self {
            store: ObjectStore::default(),
            frames: BTreeMap::new(),
            status,
            config,
            trace: None,
            poisoned: None,
        };
        if let Some(dir) = device.config.trace_dir.clone() {
            match TraceRecorder::create(&dir) {
                Ok(recorder) => {
                    tracing::info!(path = %recorder.path().display(), "tracing device calls");
                    device.trace = Some(recorder);
                }
                Err(e) => {
                    let _ = device.emit(
                        Severity::Warning,
                        None,
                        format!("cannot trace to {}: {e}", dir.display()),
                    );
                }
            }
        }
        device
    }

    /// Objects still held by a handle or reachable from one.
    pub fn live_objects(&self) -> usize {
        self.store.len()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    fn alive(&self) -> Result<(), BackendError> {
        match &self.poisoned {
            Some(reason) => Err(BackendError::Fatal(reason.clone())),
            None => Ok(()),
        }
    }

    /// Send a message to the status handler. Fails if the device is now
    /// poisoned.
    fn emit(
        &mut self,
        severity: Severity,
        source: Option<ObjectRef>,
        message: String,
    ) -> Result<(), BackendError> {
        let msg = StatusMessage {
            severity,
            source,
            message,
        };
        let action = self.status.handle(&msg);
        if severity == Severity::Fatal || action == StatusAction::Abort {
            self.poisoned = Some(msg.to_string());
        }
        self.alive()
    }

    fn record(&mut self, event: TraceEvent) -> Result<(), BackendError> {
        let Some(recorder) = self.trace.as_mut() else {
            return Ok(());
        };
        if let Err(e) = recorder.record(&event) {
            let path = recorder.path().display().to_string();
            self.trace = None;
            self.emit(
                Severity::Warning,
                None,
                format!("trace write to {path} failed, tracing disabled: {e}"),
            )?;
        }
        Ok(())
    }

    fn expect_frame(frame: ObjectRef) -> Result<(), BackendError> {
        if frame.kind == ObjectKind::Frame {
            Ok(())
        } else {
            Err(BackendError::WrongKind {
                object: frame,
                expected: ObjectKind::Frame,
            })
        }
    }

    /// Committed parameters of an object reachable from `from.name`, if it
    /// has ever been committed.
    fn linked(&self, from: &ObjectEntry, name: &str) -> Option<&ObjectEntry> {
        let object = from.committed.get(name)?.as_object()?;
        self.store.get(object).filter(|e| e.commits > 0)
    }

    fn snapshot(&self, frame: ObjectRef, entry: &ObjectEntry) -> (RenderJob, Vec<String>) {
        let mut warnings = Vec::new();
        let committed = &entry.committed;
        let extent = committed
            .get("size")
            .and_then(ParamValue::as_extent)
            .unwrap_or_default();
        let channels = Channel::ALL
            .into_iter()
            .filter(|c| committed.contains_key(c.param_name()))
            .collect();

        let camera = match self.linked(entry, "camera") {
            Some(cam) => camera_state(&cam.committed),
            None => {
                warnings.push(format!("{frame} has no committed camera, using defaults"));
                CameraState::default()
            }
        };

        let (background, ambient_radiance) = match self.linked(entry, "renderer") {
            Some(r) => (
                r.committed
                    .get("background")
                    .and_then(ParamValue::as_vec4)
                    .unwrap_or(DEFAULT_BACKGROUND),
                r.committed
                    .get("ambientRadiance")
                    .and_then(ParamValue::as_float)
                    .unwrap_or(1.0),
            ),
            None => (DEFAULT_BACKGROUND, 1.0),
        };

        let (surfaces, instance_id) = match self.linked(entry, "world") {
            Some(world) => {
                let surfaces = world
                    .committed
                    .get("surface")
                    .map(ParamValue::objects)
                    .unwrap_or_default()
                    .iter()
                    .enumerate()
                    .filter_map(|(i, s)| self.surface_state(*s, i as u32))
                    .collect();
                let id = world
                    .committed
                    .get("id")
                    .and_then(ParamValue::as_uint)
                    .unwrap_or(0);
                (surfaces, id)
            }
            None => {
                warnings.push(format!("{frame} has no committed world, rendering background"));
                (Vec::new(), 0)
            }
        };

        let job = RenderJob {
            extent,
            channels,
            camera,
            background,
            ambient_radiance,
            surfaces,
            instance_id,
        };
        (job, warnings)
    }

    fn surface_state(&self, surface: ObjectRef, index: u32) -> Option<SurfaceState> {
        let entry = self.store.get(surface).filter(|e| e.commits > 0)?;
        let geometry = self.linked(entry, "geometry")?;
        let material = self.linked(entry, "material")?;

        let positions = match geometry.committed.get("vertex.position") {
            Some(ParamValue::Vec3Array(p)) => p.clone(),
            _ => return None,
        };
        let colors = match geometry.committed.get("vertex.color") {
            Some(ParamValue::Vec4Array(c)) => Some(c.clone()),
            _ => None,
        };
        let indices = match geometry.committed.get("primitive.index") {
            Some(ParamValue::UVec3Array(i)) => i.clone(),
            _ => (0..positions.len() as u32 / 3)
                .map(|t| [3 * t, 3 * t + 1, 3 * t + 2])
                .collect(),
        };
        let material_color = match material.committed.get("color") {
            Some(ParamValue::String(s)) if s == "color" => None,
            Some(ParamValue::Vec3(c)) => Some(*c),
            _ => Some(DEFAULT_SURFACE_COLOR),
        };

        Some(SurfaceState {
            id: entry
                .committed
                .get("id")
                .and_then(ParamValue::as_uint)
                .unwrap_or(index),
            positions,
            colors,
            indices,
            material_color,
        })
    }
}

fn camera_state(params: &BTreeMap<String, ParamValue>) -> CameraState {
    let defaults = CameraState::default();
    let vec3 = |name: &str, default: Vec3| {
        params
            .get(name)
            .and_then(ParamValue::as_vec3)
            .unwrap_or(default)
    };
    let float = |name: &str, default: f32| {
        params
            .get(name)
            .and_then(ParamValue::as_float)
            .unwrap_or(default)
    };
    CameraState {
        position: vec3("position", defaults.position),
        direction: vec3("direction", defaults.direction),
        up: vec3("up", defaults.up),
        aspect: float("aspect", defaults.aspect),
        fovy: float("fovy", defaults.fovy),
    }
}

impl Backend for ReferenceDevice {
    fn new_object(
        &mut self,
        kind: ObjectKind,
        subtype: &str,
    ) -> Result<ObjectHandle, BackendError> {
        self.alive()?;
        if !validate::supports_subtype(kind, subtype) {
            return Err(BackendError::UnsupportedSubtype {
                kind,
                subtype: subtype.to_string(),
            });
        }
        let object = self.store.insert(kind);
        self.record(TraceEvent::NewObject {
            object,
            subtype: subtype.to_string(),
        })?;
        Ok(ObjectHandle::from_raw(object))
    }

    fn set_param(
        &mut self,
        object: ObjectRef,
        name: &str,
        value: ParamValue,
    ) -> Result<(), BackendError> {
        self.alive()?;
        self.store
            .owned_mut(object)?
            .staged
            .insert(name.to_string(), Some(value.clone()));
        self.record(TraceEvent::SetParam {
            object,
            name: name.to_string(),
            value,
        })
    }

    fn unset_param(&mut self, object: ObjectRef, name: &str) -> Result<(), BackendError> {
        self.alive()?;
        self.store
            .owned_mut(object)?
            .staged
            .insert(name.to_string(), None);
        self.record(TraceEvent::UnsetParam {
            object,
            name: name.to_string(),
        })
    }

    fn commit(&mut self, object: ObjectRef) -> Result<(), BackendError> {
        self.alive()?;
        let candidate = self.store.owned(object)?.candidate();
        self.record(TraceEvent::Commit { object })?;

        let issues = Validator {
            store: &self.store,
            max_frame_extent: self.config.limits.max_frame_extent,
            strict: self.config.debug,
        }
        .check(object.kind, &candidate);

        let rejected = issues.iter().any(|i| i.blocks_commit());
        for issue in issues {
            self.emit(issue.severity, Some(object), issue.message)?;
        }
        if rejected {
            return Ok(());
        }

        let entry = self.store.owned_mut(object)?;
        entry.committed = candidate;
        entry.staged.clear();
        entry.commits += 1;
        let commits = entry.commits;
        if self.config.debug {
            self.emit(
                Severity::Debug,
                Some(object),
                format!("commit #{commits} applied"),
            )?;
        }
        Ok(())
    }

    fn release(&mut self, handle: ObjectHandle) -> Result<(), BackendError> {
        self.alive()?;
        let object = handle.object();
        self.record(TraceEvent::Release { object })?;
        for freed in self.store.release(object)? {
            self.frames.remove(&freed);
            tracing::trace!(object = %freed, "freed");
        }
        Ok(())
    }

    fn render(&mut self, frame: ObjectRef) -> Result<(), BackendError> {
        self.alive()?;
        Self::expect_frame(frame)?;
        let entry = self.store.owned(frame)?;
        if entry.commits == 0 {
            return Err(BackendError::NotCommitted(frame));
        }
        if let Some(state) = self.frames.get(&frame) {
            if state.pending.is_some() {
                return Err(BackendError::RenderInFlight(frame));
            }
            if !state.mapped.is_empty() {
                return Err(BackendError::FrameMapped(frame));
            }
        }
        let (job, warnings) = self.snapshot(frame, entry);
        self.record(TraceEvent::Render { frame })?;
        for warning in warnings {
            self.emit(Severity::Warning, Some(frame), warning)?;
        }

        let state = self.frames.entry(frame).or_default();
        state.buffers = None;
        state.pending = Some(job);
        Ok(())
    }

    fn wait(&mut self, frame: ObjectRef) -> Result<(), BackendError> {
        self.alive()?;
        Self::expect_frame(frame)?;
        self.store.owned(frame)?;
        self.record(TraceEvent::Wait { frame })?;

        let state = self
            .frames
            .get_mut(&frame)
            .ok_or(BackendError::NotReady(frame))?;
        let Some(job) = state.pending.take() else {
            // Already complete.
            return if state.buffers.is_some() {
                Ok(())
            } else {
                Err(BackendError::NotReady(frame))
            };
        };

        let start = Instant::now();
        state.buffers = Some(job.execute());
        let elapsed = start.elapsed();
        self.emit(
            Severity::Info,
            Some(frame),
            format!(
                "rendered {} in {:.2} ms",
                job.extent,
                elapsed.as_secs_f64() * 1000.0
            ),
        )
    }

    fn map(
        &mut self,
        frame: ObjectRef,
        channel: Channel,
    ) -> Result<MappedChannel<'_>, BackendError> {
        self.alive()?;
        Self::expect_frame(frame)?;
        self.store.owned(frame)?;
        self.record(TraceEvent::Map { frame, channel })?;

        let state = self
            .frames
            .get_mut(&frame)
            .ok_or(BackendError::NotReady(frame))?;
        let buffers = state
            .buffers
            .as_ref()
            .ok_or(BackendError::NotReady(frame))?;
        let pixels = match channel {
            Channel::Color => buffers.color.as_deref().map(ChannelPixels::Rgba8),
            Channel::PrimitiveId => buffers.primitive_id.as_deref().map(ChannelPixels::U32),
            Channel::ObjectId => buffers.object_id.as_deref().map(ChannelPixels::U32),
            Channel::InstanceId => buffers.instance_id.as_deref().map(ChannelPixels::U32),
        }
        .ok_or(BackendError::ChannelNotRequested { frame, channel })?;
        if !state.mapped.insert(channel) {
            return Err(BackendError::AlreadyMapped { frame, channel });
        }
        Ok(MappedChannel::new(channel, buffers.extent, pixels))
    }

    fn unmap(&mut self, frame: ObjectRef, channel: Channel) -> Result<(), BackendError> {
        self.alive()?;
        Self::expect_frame(frame)?;
        self.store.owned(frame)?;
        self.record(TraceEvent::Unmap { frame, channel })?;
        let mapped = self
            .frames
            .get_mut(&frame)
            .is_some_and(|s| s.mapped.remove(&channel));
        if mapped {
            Ok(())
        } else {
            Err(BackendError::NotMapped { frame, channel })
        }
    }

    fn committed(&self, object: ObjectRef, name: &str) -> Option<ParamValue> {
        self.store.get(object)?.committed.get(name).cloned()
    }

    fn commit_count(&self, object: ObjectRef) -> u64 {
        self.store.get(object).map_or(0, |e| e.commits)
    }
}

impl std::fmt::Debug for ReferenceDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceDevice")
            .field("objects", &self.store.len())
            .field("frames", &self.frames.len())
            .field("tracing", &self.trace.is_some())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendExt;
    use crate::library::DeviceLimits;
    use crate::status::CollectingStatusHandler;
    use framelink_common::{PixelFormat, SurfaceExtent};

    fn device(config: DeviceConfig) -> (ReferenceDevice, CollectingStatusHandler) {
        let log = CollectingStatusHandler::new();
        (ReferenceDevice::new(config, Box::new(log.clone())), log)
    }

    /// A committed 4x2 frame with color and objectId, a camera and a world
    /// holding one triangle surface straight ahead.
    fn scene(dev: &mut ReferenceDevice) -> ObjectHandle {
        let mesh = dev.new_object(ObjectKind::Geometry, "triangle").unwrap();
        dev.edit(mesh.object())
            .set(
                "vertex.position",
                vec![
                    Vec3::new(-5.0, -5.0, -1.0),
                    Vec3::new(5.0, -5.0, -1.0),
                    Vec3::new(0.0, 5.0, -1.0),
                ],
            )
            .commit()
            .unwrap();
        let mat = dev.new_object(ObjectKind::Material, "matte").unwrap();
        dev.edit(mat.object())
            .set("color", Vec3::new(0.0, 1.0, 0.0))
            .commit()
            .unwrap();
        let surface = dev.new_object(ObjectKind::Surface, "").unwrap();
        let surface_ref = surface.object();
        dev.edit(surface_ref)
            .set_and_release("geometry", mesh)
            .set_and_release("material", mat)
            .set("id", 7u32)
            .commit()
            .unwrap();
        let world = dev.new_object(ObjectKind::World, "").unwrap();
        dev.edit(world.object())
            .set("surface", vec![surface_ref])
            .commit()
            .unwrap();
        dev.release(surface).unwrap();

        let camera = dev.new_object(ObjectKind::Camera, "perspective").unwrap();
        dev.edit(camera.object())
            .set("aspect", 2.0f32)
            .commit()
            .unwrap();
        let frame = dev.new_object(ObjectKind::Frame, "").unwrap();
        dev.edit(frame.object())
            .set("size", SurfaceExtent::new(4, 2))
            .set("channel.color", PixelFormat::Rgba8Srgb)
            .set("channel.objectId", PixelFormat::U32)
            .set_and_release("camera", camera)
            .set_and_release("world", world)
            .commit()
            .unwrap();
        frame
    }

    #[test]
    fn render_wait_map_unmap() {
        let (mut dev, log) = device(DeviceConfig::default());
        let frame = scene(&mut dev).object();
        dev.render(frame).unwrap();
        dev.wait(frame).unwrap();
        {
            let ids = dev.map(frame, Channel::ObjectId).unwrap();
            assert_eq!(ids.extent, SurfaceExtent::new(4, 2));
            assert!(ids.u32s().unwrap().iter().all(|&id| id == 7));
        }
        dev.unmap(frame, Channel::ObjectId).unwrap();
        assert!(log.at_least(Severity::Warning).is_empty());
    }

    #[test]
    fn map_before_wait_is_not_ready() {
        let (mut dev, _) = device(DeviceConfig::default());
        let frame = scene(&mut dev).object();
        assert!(matches!(
            dev.map(frame, Channel::Color),
            Err(BackendError::NotReady(_))
        ));
        dev.render(frame).unwrap();
        assert!(matches!(
            dev.render(frame),
            Err(BackendError::RenderInFlight(_))
        ));
        assert!(matches!(
            dev.map(frame, Channel::Color),
            Err(BackendError::NotReady(_))
        ));
    }

    #[test]
    fn mapping_is_paired() {
        let (mut dev, _) = device(DeviceConfig::default());
        let frame = scene(&mut dev).object();
        dev.render(frame).unwrap();
        dev.wait(frame).unwrap();
        dev.map(frame, Channel::Color).unwrap();
        assert!(matches!(
            dev.map(frame, Channel::Color),
            Err(BackendError::AlreadyMapped { .. })
        ));
        assert!(matches!(dev.render(frame), Err(BackendError::FrameMapped(_))));
        dev.unmap(frame, Channel::Color).unwrap();
        assert!(matches!(
            dev.unmap(frame, Channel::Color),
            Err(BackendError::NotMapped { .. })
        ));
        assert!(matches!(
            dev.map(frame, Channel::InstanceId),
            Err(BackendError::ChannelNotRequested { .. })
        ));
    }

    #[test]
    fn failed_commit_keeps_previous_state() {
        let (mut dev, log) = device(DeviceConfig::default());
        let cam = dev.new_object(ObjectKind::Camera, "perspective").unwrap();
        dev.edit(cam.object()).set("aspect", 1.5f32).commit().unwrap();
        dev.edit(cam.object()).set("aspect", "wide").commit().unwrap();

        assert_eq!(
            dev.committed(cam.object(), "aspect"),
            Some(ParamValue::Float(1.5))
        );
        assert_eq!(dev.commit_count(cam.object()), 1);
        assert_eq!(log.at_least(Severity::Error).len(), 1);

        // The bad write is still staged; fixing it lets the next commit through.
        dev.edit(cam.object()).set("aspect", 2.0f32).commit().unwrap();
        assert_eq!(dev.commit_count(cam.object()), 2);
    }

    #[test]
    fn staged_values_are_invisible_until_commit() {
        let (mut dev, _) = device(DeviceConfig::default());
        let cam = dev.new_object(ObjectKind::Camera, "perspective").unwrap();
        dev.set_param(cam.object(), "fovy", ParamValue::Float(1.0))
            .unwrap();
        assert_eq!(dev.committed(cam.object(), "fovy"), None);
        dev.commit(cam.object()).unwrap();
        assert_eq!(
            dev.committed(cam.object(), "fovy"),
            Some(ParamValue::Float(1.0))
        );
    }

    #[test]
    fn released_child_is_not_usable() {
        let (mut dev, _) = device(DeviceConfig::default());
        let surface = dev.new_object(ObjectKind::Surface, "").unwrap();
        let mat = dev.new_object(ObjectKind::Material, "matte").unwrap();
        let mat_ref = mat.object();
        dev.set_and_release(surface.object(), "material", mat).unwrap();
        assert!(matches!(
            dev.set_param(mat_ref, "opacity", ParamValue::Float(0.5)),
            Err(BackendError::Released(_))
        ));
        assert_eq!(dev.live_objects(), 2);
        dev.release(surface).unwrap();
        assert_eq!(dev.live_objects(), 0);
    }

    #[test]
    fn oversized_frame_poisons_device() {
        let (mut dev, log) = device(DeviceConfig {
            limits: DeviceLimits {
                max_frame_extent: SurfaceExtent::new(64, 64),
            },
            ..DeviceConfig::default()
        });
        let frame = scene(&mut dev).object();
        let err = dev
            .edit(frame)
            .set("size", SurfaceExtent::new(65, 10))
            .commit()
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(dev.is_poisoned());
        assert_eq!(log.at_least(Severity::Fatal).len(), 1);
        assert!(dev.render(frame).unwrap_err().is_fatal());
    }

    #[test]
    fn debug_mode_reports_commits_and_unknown_params() {
        let (mut dev, log) = device(DeviceConfig {
            debug: true,
            ..DeviceConfig::default()
        });
        let cam = dev.new_object(ObjectKind::Camera, "perspective").unwrap();
        dev.edit(cam.object()).set("zoom", 2.0f32).commit().unwrap();
        let messages = log.messages();
        assert!(messages.iter().any(|m| m.severity == Severity::Warning));
        assert!(messages.iter().any(|m| m.severity == Severity::Debug));
    }

    #[test]
    fn missing_world_warns_and_renders_background() {
        let (mut dev, log) = device(DeviceConfig::default());
        let frame = dev.new_object(ObjectKind::Frame, "").unwrap();
        dev.edit(frame.object())
            .set("size", SurfaceExtent::new(2, 2))
            .set("channel.color", PixelFormat::Rgba8Srgb)
            .commit()
            .unwrap();
        dev.render(frame.object()).unwrap();
        dev.wait(frame.object()).unwrap();
        let px = dev.map(frame.object(), Channel::Color).unwrap();
        assert_eq!(px.rgba8().unwrap().len(), 4);
        assert_eq!(log.at_least(Severity::Warning).len(), 2);
    }

    #[test]
    fn trace_records_calls() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut dev, _) = device(DeviceConfig {
            trace_dir: Some(tmp.path().to_path_buf()),
            ..DeviceConfig::default()
        });
        let cam = dev.new_object(ObjectKind::Camera, "perspective").unwrap();
        dev.edit(cam.object()).set("aspect", 1.0f32).commit().unwrap();
        dev.release(cam).unwrap();

        let events = TraceRecorder::read(tmp.path().join(crate::trace::TRACE_FILE_NAME)).unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], TraceEvent::NewObject { .. }));
        assert!(matches!(events[3], TraceEvent::Release { .. }));
    }

    #[test]
    fn unsupported_subtype_is_rejected() {
        let (mut dev, _) = device(DeviceConfig::default());
        assert!(matches!(
            dev.new_object(ObjectKind::Camera, "orthographic"),
            Err(BackendError::UnsupportedSubtype { .. })
        ));
    }
}
