use crate::object::{ObjectHandle, ObjectRef};
use framelink_common::{PixelFormat, SurfaceExtent};
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// A value that can be staged on an object parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    UInt(u32),
    Float(f32),
    Vec3(Vec3),
    Vec4(Vec4),
    UVec2([u32; 2]),
    String(String),
    Format(PixelFormat),
    Object(ObjectRef),
    ObjectArray(Vec<ObjectRef>),
    Vec3Array(Vec<Vec3>),
    Vec4Array(Vec<Vec4>),
    UVec3Array(Vec<[u32; 3]>),
}

impl ParamValue {
    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::UInt(_) => "uint",
            ParamValue::Float(_) => "float",
            ParamValue::Vec3(_) => "vec3",
            ParamValue::Vec4(_) => "vec4",
            ParamValue::UVec2(_) => "uvec2",
            ParamValue::String(_) => "string",
            ParamValue::Format(_) => "format",
            ParamValue::Object(_) => "object",
            ParamValue::ObjectArray(_) => "object[]",
            ParamValue::Vec3Array(_) => "vec3[]",
            ParamValue::Vec4Array(_) => "vec4[]",
            ParamValue::UVec3Array(_) => "uvec3[]",
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u32> {
        match self {
            ParamValue::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            ParamValue::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec4(&self) -> Option<Vec4> {
        match self {
            ParamValue::Vec4(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_extent(&self) -> Option<SurfaceExtent> {
        match self {
            ParamValue::UVec2(v) => Some(SurfaceExtent::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            ParamValue::Object(o) => Some(*o),
            _ => None,
        }
    }

    /// Every object this value refers to.
    pub fn objects(&self) -> &[ObjectRef] {
        match self {
            ParamValue::Object(o) => std::slice::from_ref(o),
            ParamValue::ObjectArray(objs) => objs,
            _ => &[],
        }
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::UInt(v)
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v)
    }
}

impl From<Vec3> for ParamValue {
    fn from(v: Vec3) -> Self {
        ParamValue::Vec3(v)
    }
}

impl From<Vec4> for ParamValue {
    fn from(v: Vec4) -> Self {
        ParamValue::Vec4(v)
    }
}

impl From<[u32; 2]> for ParamValue {
    fn from(v: [u32; 2]) -> Self {
        ParamValue::UVec2(v)
    }
}

impl From<SurfaceExtent> for ParamValue {
    fn from(v: SurfaceExtent) -> Self {
        ParamValue::UVec2(v.to_array())
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::String(v)
    }
}

impl From<PixelFormat> for ParamValue {
    fn from(v: PixelFormat) -> Self {
        ParamValue::Format(v)
    }
}

impl From<ObjectRef> for ParamValue {
    fn from(v: ObjectRef) -> Self {
        ParamValue::Object(v)
    }
}

impl From<&ObjectHandle> for ParamValue {
    fn from(v: &ObjectHandle) -> Self {
        ParamValue::Object(v.object())
    }
}

impl From<Vec<ObjectRef>> for ParamValue {
    fn from(v: Vec<ObjectRef>) -> Self {
        ParamValue::ObjectArray(v)
    }
}

impl From<Vec<Vec3>> for ParamValue {
    fn from(v: Vec<Vec3>) -> Self {
        ParamValue::Vec3Array(v)
    }
}

impl From<Vec<Vec4>> for ParamValue {
    fn from(v: Vec<Vec4>) -> Self {
        ParamValue::Vec4Array(v)
    }
}

impl From<Vec<[u32; 3]>> for ParamValue {
    fn from(v: Vec<[u32; 3]>) -> Self {
        ParamValue::UVec3Array(v)
    }
}
