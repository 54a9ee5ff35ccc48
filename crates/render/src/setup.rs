//! Startup objects owned by the viewer: camera, renderer and frame target.

use framelink_backend::{Backend, BackendError, BackendExt, ObjectHandle, ObjectKind, ObjectRef};
use framelink_common::{Channel, SurfaceExtent};
use glam::{Vec3, Vec4};

#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians. `None` keeps the device default.
    pub fovy: Option<f32>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::new(0.1, 0.0, 1.0),
            up: Vec3::Y,
            fovy: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    pub subtype: String,
    /// Shown in device diagnostics.
    pub name: String,
    pub ambient_radiance: f32,
    pub background: Option<Vec4>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            subtype: "default".into(),
            name: "MainRenderer".into(),
            ambient_radiance: 1.0,
            background: None,
        }
    }
}

/// Perspective camera with its aspect taken from `extent`.
pub fn create_camera(
    backend: &mut dyn Backend,
    config: &CameraConfig,
    extent: SurfaceExtent,
) -> Result<ObjectHandle, BackendError> {
    let camera = backend.new_object(ObjectKind::Camera, "perspective")?;
    let mut edit = backend
        .edit(camera.object())
        .set("aspect", extent.aspect().unwrap_or(1.0))
        .set("position", config.position)
        .set("direction", config.direction)
        .set("up", config.up);
    if let Some(fovy) = config.fovy {
        edit = edit.set("fovy", fovy);
    }
    edit.commit()?;
    Ok(camera)
}

pub fn create_renderer(
    backend: &mut dyn Backend,
    config: &RendererConfig,
) -> Result<ObjectHandle, BackendError> {
    let renderer = backend.new_object(ObjectKind::Renderer, &config.subtype)?;
    let mut edit = backend
        .edit(renderer.object())
        .set("name", config.name.as_str())
        .set("ambientRadiance", config.ambient_radiance);
    if let Some(bg) = config.background {
        edit = edit.set("background", bg);
    }
    edit.commit()?;
    Ok(renderer)
}

/// Frame target requesting every channel. Takes ownership of `renderer` and
/// `world`; the camera stays with the caller, who mutates it on resize.
pub fn create_frame(
    backend: &mut dyn Backend,
    extent: SurfaceExtent,
    camera: ObjectRef,
    renderer: ObjectHandle,
    world: ObjectHandle,
) -> Result<ObjectHandle, BackendError> {
    let frame = backend.new_object(ObjectKind::Frame, "")?;
    let mut edit = backend.edit(frame.object()).set("size", extent);
    for channel in Channel::ALL {
        edit = edit.set(channel.param_name(), channel.format());
    }
    edit.set("camera", camera)
        .set_and_release("renderer", renderer)
        .set_and_release("world", world)
        .commit()?;
    Ok(frame)
}
