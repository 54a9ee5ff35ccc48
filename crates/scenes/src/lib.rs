//! Demo worlds.
//!
//! Each builder creates its objects on the given backend, commits them, and
//! returns the world handle. Everything below the world is owned by the world
//! once the builder returns.

use framelink_backend::{Backend, BackendError, BackendExt, ObjectHandle, ObjectKind};
use glam::{Vec3, Vec4};

/// Object id written to the objectId channel for the demo surface.
pub const DEMO_SURFACE_ID: u32 = 2;
/// Instance id of the demo world.
pub const DEMO_WORLD_ID: u32 = 3;

/// Two vertex-colored triangles sharing an edge, three units in front of a
/// camera at the origin looking down +Z.
pub fn triangle_pair<B: Backend + ?Sized>(backend: &mut B) -> Result<ObjectHandle, BackendError> {
    let positions = vec![
        Vec3::new(-1.0, -1.0, 3.0),
        Vec3::new(-1.0, 1.0, 3.0),
        Vec3::new(1.0, -1.0, 3.0),
        Vec3::new(0.1, 0.1, 0.3),
    ];
    let colors = vec![
        Vec4::new(0.9, 0.5, 0.5, 1.0),
        Vec4::new(0.8, 0.8, 0.8, 1.0),
        Vec4::new(0.8, 0.8, 0.8, 1.0),
        Vec4::new(0.5, 0.9, 0.5, 1.0),
    ];
    let indices: Vec<[u32; 3]> = vec![[0, 1, 2], [1, 2, 3]];

    let mesh = backend.new_object(ObjectKind::Geometry, "triangle")?;
    backend
        .edit(mesh.object())
        .set("vertex.position", positions)
        .set("vertex.color", colors)
        .set("primitive.index", indices)
        .commit()?;

    let material = backend.new_object(ObjectKind::Material, "matte")?;
    backend
        .edit(material.object())
        .set("color", "color")
        .commit()?;

    let surface = backend.new_object(ObjectKind::Surface, "")?;
    backend
        .edit(surface.object())
        .set_and_release("geometry", mesh)
        .set_and_release("material", material)
        .set("id", DEMO_SURFACE_ID)
        .commit()?;

    let world = backend.new_object(ObjectKind::World, "")?;
    backend
        .edit(world.object())
        .set("surface", vec![surface.object()])
        .set("id", DEMO_WORLD_ID)
        .commit()?;
    backend.release(surface)?;

    tracing::debug!(world = %world, "demo world committed");
    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use framelink_backend::{CollectingStatusHandler, DeviceConfig, ReferenceDevice, Severity};

    #[test]
    fn demo_world_commits_cleanly() {
        let log = CollectingStatusHandler::new();
        let mut dev = ReferenceDevice::new(DeviceConfig::default(), Box::new(log.clone()));
        let world = triangle_pair(&mut dev).unwrap();

        assert_eq!(dev.commit_count(world.object()), 1);
        assert!(log.at_least(Severity::Warning).is_empty());
        // world, surface, geometry, material
        assert_eq!(dev.live_objects(), 4);

        dev.release(world).unwrap();
        assert_eq!(dev.live_objects(), 0);
    }
}
