//! Commit-time parameter validation for the reference device.

use crate::object::ObjectKind;
use crate::param::ParamValue;
use crate::reference::store::ObjectStore;
use crate::status::Severity;
use framelink_common::{Channel, SurfaceExtent};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamType {
    UInt,
    Float,
    Vec3,
    Vec4,
    UVec2,
    Format,
    Object(ObjectKind),
    ObjectArray(ObjectKind),
    Vec3Array,
    Vec4Array,
    UVec3Array,
    /// A vec3 color, or the string "color" for per-vertex color.
    ColorSource,
}

impl ParamType {
    fn describe(self) -> &'static str {
        match self {
            ParamType::UInt => "uint",
            ParamType::Float => "float",
            ParamType::Vec3 => "vec3",
            ParamType::Vec4 => "vec4",
            ParamType::UVec2 => "uvec2",
            ParamType::Format => "format",
            ParamType::Object(_) => "object",
            ParamType::ObjectArray(_) => "object[]",
            ParamType::Vec3Array => "vec3[]",
            ParamType::Vec4Array => "vec4[]",
            ParamType::UVec3Array => "uvec3[]",
            ParamType::ColorSource => "vec3 or \"color\"",
        }
    }

    fn accepts(self, value: &ParamValue) -> bool {
        match (self, value) {
            (ParamType::UInt, ParamValue::UInt(_))
            | (ParamType::Float, ParamValue::Float(_))
            | (ParamType::Vec3, ParamValue::Vec3(_))
            | (ParamType::Vec4, ParamValue::Vec4(_))
            | (ParamType::UVec2, ParamValue::UVec2(_))
            | (ParamType::Format, ParamValue::Format(_))
            | (ParamType::Vec3Array, ParamValue::Vec3Array(_))
            | (ParamType::Vec4Array, ParamValue::Vec4Array(_))
            | (ParamType::UVec3Array, ParamValue::UVec3Array(_))
            | (ParamType::ColorSource, ParamValue::Vec3(_)) => true,
            (ParamType::ColorSource, ParamValue::String(s)) => s == "color",
            (ParamType::Object(kind), ParamValue::Object(o)) => o.kind == kind,
            (ParamType::ObjectArray(kind), ParamValue::ObjectArray(objs)) => {
                objs.iter().all(|o| o.kind == kind)
            }
            _ => false,
        }
    }
}

struct ParamRule {
    name: &'static str,
    ty: ParamType,
    required: bool,
}

const fn opt(name: &'static str, ty: ParamType) -> ParamRule {
    ParamRule {
        name,
        ty,
        required: false,
    }
}

const fn req(name: &'static str, ty: ParamType) -> ParamRule {
    ParamRule {
        name,
        ty,
        required: true,
    }
}

const CAMERA: &[ParamRule] = &[
    opt("position", ParamType::Vec3),
    opt("direction", ParamType::Vec3),
    opt("up", ParamType::Vec3),
    opt("aspect", ParamType::Float),
    opt("fovy", ParamType::Float),
];

const RENDERER: &[ParamRule] = &[
    opt("ambientRadiance", ParamType::Float),
    opt("background", ParamType::Vec4),
];

const WORLD: &[ParamRule] = &[
    opt("surface", ParamType::ObjectArray(ObjectKind::Surface)),
    opt("id", ParamType::UInt),
];

const SURFACE: &[ParamRule] = &[
    req("geometry", ParamType::Object(ObjectKind::Geometry)),
    req("material", ParamType::Object(ObjectKind::Material)),
    opt("id", ParamType::UInt),
];

const TRIANGLE: &[ParamRule] = &[
    req("vertex.position", ParamType::Vec3Array),
    opt("vertex.color", ParamType::Vec4Array),
    opt("primitive.index", ParamType::UVec3Array),
];

const MATTE: &[ParamRule] = &[
    opt("color", ParamType::ColorSource),
    opt("opacity", ParamType::Float),
];

const FRAME: &[ParamRule] = &[
    req("size", ParamType::UVec2),
    opt("channel.color", ParamType::Format),
    opt("channel.primitiveId", ParamType::Format),
    opt("channel.objectId", ParamType::Format),
    opt("channel.instanceId", ParamType::Format),
    opt("camera", ParamType::Object(ObjectKind::Camera)),
    opt("renderer", ParamType::Object(ObjectKind::Renderer)),
    opt("world", ParamType::Object(ObjectKind::World)),
];

/// Subtypes each kind accepts. An empty string means "no subtype".
pub(crate) fn supports_subtype(kind: ObjectKind, subtype: &str) -> bool {
    match kind {
        ObjectKind::Camera => subtype == "perspective",
        ObjectKind::Renderer => subtype == "default",
        ObjectKind::Geometry => subtype == "triangle",
        ObjectKind::Material => subtype == "matte",
        ObjectKind::World | ObjectKind::Surface | ObjectKind::Frame => subtype.is_empty(),
    }
}

fn schema(kind: ObjectKind) -> &'static [ParamRule] {
    match kind {
        ObjectKind::Camera => CAMERA,
        ObjectKind::Renderer => RENDERER,
        ObjectKind::World => WORLD,
        ObjectKind::Surface => SURFACE,
        ObjectKind::Geometry => TRIANGLE,
        ObjectKind::Material => MATTE,
        ObjectKind::Frame => FRAME,
    }
}

/// One problem found while validating a commit.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Issue {
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    pub fn blocks_commit(&self) -> bool {
        self.severity <= Severity::Error
    }
}

pub(crate) struct Validator<'a> {
    pub store: &'a ObjectStore,
    pub max_frame_extent: SurfaceExtent,
    /// Report parameter names the kind does not know.
    pub strict: bool,
}

impl Validator<'_> {
    pub fn check(&self, kind: ObjectKind, params: &BTreeMap<String, ParamValue>) -> Vec<Issue> {
        let known = schema(kind);
        let mut issues = Vec::new();

        for param in known {
            match params.get(param.name) {
                None if param.required => issues.push(Issue::new(
                    Severity::Error,
                    format!("missing required parameter '{}'", param.name),
                )),
                Some(v) if !param.ty.accepts(v) => issues.push(Issue::new(
                    Severity::Error,
                    format!(
                        "parameter '{}' expects {}, got {}",
                        param.name,
                        param.ty.describe(),
                        v.type_name()
                    ),
                )),
                _ => {}
            }
        }

        for (name, value) in params {
            if name == "name" {
                continue;
            }
            if !known.iter().any(|s| s.name == name) {
                if self.strict {
                    issues.push(Issue::new(
                        Severity::Warning,
                        format!("unknown parameter '{name}' ignored"),
                    ));
                }
                continue;
            }
            for child in value.objects() {
                if self.store.get(*child).is_none() {
                    issues.push(Issue::new(
                        Severity::Error,
                        format!("parameter '{name}' refers to unknown object {child}"),
                    ));
                }
            }
        }

        if issues.iter().any(Issue::blocks_commit) {
            return issues;
        }

        match kind {
            ObjectKind::Geometry => check_triangles(params, &mut issues),
            ObjectKind::Frame => self.check_frame(params, &mut issues),
            _ => {}
        }
        issues
    }

    fn check_frame(&self, params: &BTreeMap<String, ParamValue>, issues: &mut Vec<Issue>) {
        if let Some(size) = params.get("size").and_then(ParamValue::as_extent) {
            if size.is_empty() {
                issues.push(Issue::new(
                    Severity::Error,
                    format!("frame size {size} has zero area"),
                ));
            } else if size.width > self.max_frame_extent.width
                || size.height > self.max_frame_extent.height
            {
                issues.push(Issue::new(
                    Severity::Fatal,
                    format!(
                        "cannot allocate {size} frame: device limit is {}",
                        self.max_frame_extent
                    ),
                ));
            }
        }

        for channel in Channel::ALL {
            if let Some(ParamValue::Format(format)) = params.get(channel.param_name()) {
                if *format != channel.format() {
                    issues.push(Issue::new(
                        Severity::Error,
                        format!("{channel} only supports {:?}, got {format:?}", channel.format()),
                    ));
                }
            }
        }
    }
}

fn check_triangles(params: &BTreeMap<String, ParamValue>, issues: &mut Vec<Issue>) {
    let Some(ParamValue::Vec3Array(positions)) = params.get("vertex.position") else {
        return;
    };
    if let Some(ParamValue::Vec4Array(colors)) = params.get("vertex.color") {
        if colors.len() != positions.len() {
            issues.push(Issue::new(
                Severity::Error,
                format!(
                    "'vertex.color' has {} entries, 'vertex.position' has {}",
                    colors.len(),
                    positions.len()
                ),
            ));
        }
    }
    match params.get("primitive.index") {
        Some(ParamValue::UVec3Array(indices)) => {
            let n = positions.len() as u32;
            if indices.iter().flatten().any(|&i| i >= n) {
                issues.push(Issue::new(
                    Severity::Error,
                    format!("'primitive.index' refers past the {n} vertices"),
                ));
            }
        }
        _ if positions.len() % 3 != 0 => issues.push(Issue::new(
            Severity::Error,
            "unindexed triangles need a multiple of 3 vertices",
        )),
        _ => {}
    }
    if positions.len() > 1024 * 1024 {
        issues.push(Issue::new(
            Severity::PerformanceWarning,
            format!("{} vertices is slow on the reference device", positions.len()),
        ));
    }
}
