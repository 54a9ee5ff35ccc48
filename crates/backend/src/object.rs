use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of object in the renderer graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Camera,
    Renderer,
    World,
    Surface,
    Geometry,
    Material,
    Frame,
}

impl ObjectKind {
    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Camera => "camera",
            ObjectKind::Renderer => "renderer",
            ObjectKind::World => "world",
            ObjectKind::Surface => "surface",
            ObjectKind::Geometry => "geometry",
            ObjectKind::Material => "material",
            ObjectKind::Frame => "frame",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Non-owning reference to a backend object.
///
/// Copies are cheap and carry no ownership. A backend rejects a reference once
/// its owner has released or transferred the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: u64,
    pub kind: ObjectKind,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Owning handle to a backend object.
///
/// Not `Clone`: the holder owns exactly one reference. Giving the handle to
/// [`Backend::release`](crate::Backend::release) or
/// [`Backend::set_and_release`](crate::Backend::set_and_release) consumes it,
/// so the creator cannot name the object through it afterwards.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "dropping an ObjectHandle without releasing it leaks the object"]
pub struct ObjectHandle(ObjectRef);

impl ObjectHandle {
    /// Wraps a freshly created object. Only backend implementations call this.
    pub fn from_raw(object: ObjectRef) -> Self {
        Self(object)
    }

    pub fn object(&self) -> ObjectRef {
        self.0
    }

    pub fn kind(&self) -> ObjectKind {
        self.0.kind
    }
}

impl From<&ObjectHandle> for ObjectRef {
    fn from(handle: &ObjectHandle) -> Self {
        handle.0
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_kind_and_id() {
        let r = ObjectRef {
            id: 7,
            kind: ObjectKind::Frame,
        };
        assert_eq!(r.to_string(), "frame#7");
    }

    #[test]
    fn handle_exposes_its_reference() {
        let r = ObjectRef {
            id: 1,
            kind: ObjectKind::Camera,
        };
        let h = ObjectHandle::from_raw(r);
        assert_eq!(ObjectRef::from(&h), r);
        assert_eq!(h.kind(), ObjectKind::Camera);
    }
}
