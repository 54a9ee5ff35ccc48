//! CPU ray caster behind the reference device.
//!
//! Rows are produced bottom to top: row 0 of every channel is the bottom of
//! the image.

use framelink_common::{Channel, SurfaceExtent};
use glam::{Vec3, Vec4};
use std::collections::BTreeSet;

/// Id written where no surface was hit.
pub(crate) const NO_HIT: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CameraState {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    pub aspect: f32,
    /// Vertical field of view in radians.
    pub fovy: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            aspect: 1.0,
            fovy: 60.0_f32.to_radians(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SurfaceState {
    pub id: u32,
    pub positions: Vec<Vec3>,
    pub colors: Option<Vec<Vec4>>,
    pub indices: Vec<[u32; 3]>,
    /// `None` means per-vertex color.
    pub material_color: Option<Vec3>,
}

impl SurfaceState {
    fn color_at(&self, tri: [u32; 3], u: f32, v: f32) -> Vec4 {
        if let Some(c) = self.material_color {
            return c.extend(1.0);
        }
        match &self.colors {
            Some(colors) => {
                let [a, b, c] = tri.map(|i| colors[i as usize]);
                a * (1.0 - u - v) + b * u + c * v
            }
            None => Vec4::new(0.8, 0.8, 0.8, 1.0),
        }
    }
}

/// Committed state a render reads, captured when `render()` is called.
#[derive(Debug, Clone)]
pub(crate) struct RenderJob {
    pub extent: SurfaceExtent,
    pub channels: BTreeSet<Channel>,
    pub camera: CameraState,
    pub background: Vec4,
    pub ambient_radiance: f32,
    pub surfaces: Vec<SurfaceState>,
    pub instance_id: u32,
}

/// Completed channel storage of one frame.
#[derive(Debug, Clone, Default)]
pub(crate) struct FrameBuffers {
    pub extent: SurfaceExtent,
    pub color: Option<Vec<[u8; 4]>>,
    pub primitive_id: Option<Vec<u32>>,
    pub object_id: Option<Vec<u32>>,
    pub instance_id: Option<Vec<u32>>,
}

struct Hit {
    t: f32,
    surface: usize,
    primitive: u32,
    u: f32,
    v: f32,
}

impl RenderJob {
    pub fn execute(&self) -> FrameBuffers {
        let SurfaceExtent { width, height } = self.extent;
        let n = self.extent.pixel_count();
        let wants = |c: Channel| self.channels.contains(&c);

        let mut color = wants(Channel::Color).then(|| Vec::with_capacity(n));
        let mut primitive_id = wants(Channel::PrimitiveId).then(|| Vec::with_capacity(n));
        let mut object_id = wants(Channel::ObjectId).then(|| Vec::with_capacity(n));
        let mut instance_id = wants(Channel::InstanceId).then(|| Vec::with_capacity(n));

        let forward = self.camera.direction.normalize_or(Vec3::NEG_Z);
        let right = forward.cross(self.camera.up).normalize_or(Vec3::X);
        let up = right.cross(forward);
        let half_h = (self.camera.fovy * 0.5).tan();
        let half_w = half_h * self.camera.aspect;

        for y in 0..height {
            let sy = ((y as f32 + 0.5) / height as f32) * 2.0 - 1.0;
            for x in 0..width {
                let sx = ((x as f32 + 0.5) / width as f32) * 2.0 - 1.0;
                let dir = (forward + right * (sx * half_w) + up * (sy * half_h)).normalize();
                let hit = self.trace(self.camera.position, dir);

                if let Some(buf) = color.as_mut() {
                    let rgba = match &hit {
                        Some(h) => {
                            let surface = &self.surfaces[h.surface];
                            let tri = surface.indices[h.primitive as usize];
                            let c = surface.color_at(tri, h.u, h.v);
                            (c.truncate() * self.ambient_radiance).extend(c.w)
                        }
                        None => self.background,
                    };
                    buf.push(encode_srgb(rgba));
                }
                if let Some(buf) = primitive_id.as_mut() {
                    buf.push(hit.as_ref().map_or(NO_HIT, |h| h.primitive));
                }
                if let Some(buf) = object_id.as_mut() {
                    buf.push(hit.as_ref().map_or(NO_HIT, |h| self.surfaces[h.surface].id));
                }
                if let Some(buf) = instance_id.as_mut() {
                    buf.push(if hit.is_some() { self.instance_id } else { NO_HIT });
                }
            }
        }

        FrameBuffers {
            extent: self.extent,
            color,
            primitive_id,
            object_id,
            instance_id,
        }
    }

    fn trace(&self, origin: Vec3, dir: Vec3) -> Option<Hit> {
        let mut best: Option<Hit> = None;
        for (si, surface) in self.surfaces.iter().enumerate() {
            for (pi, tri) in surface.indices.iter().enumerate() {
                let [a, b, c] = tri.map(|i| surface.positions[i as usize]);
                if let Some((t, u, v)) = intersect(origin, dir, a, b, c) {
                    if best.as_ref().is_none_or(|h| t < h.t) {
                        best = Some(Hit {
                            t,
                            surface: si,
                            primitive: pi as u32,
                            u,
                            v,
                        });
                    }
                }
            }
        }
        best
    }
}

/// Möller–Trumbore ray/triangle test, two-sided. Returns (t, u, v).
fn intersect(origin: Vec3, dir: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<(f32, f32, f32)> {
    const EPS: f32 = 1e-7;
    let e1 = b - a;
    let e2 = c - a;
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < EPS {
        return None;
    }
    let inv = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = dir.dot(q) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv;
    (t > EPS).then_some((t, u, v))
}

fn encode_srgb(linear: Vec4) -> [u8; 4] {
    let enc = |c: f32| {
        let c = c.clamp(0.0, 1.0);
        let s = if c <= 0.003_130_8 {
            c * 12.92
        } else {
            1.055 * c.powf(1.0 / 2.4) - 0.055
        };
        (s * 255.0).round() as u8
    };
    [
        enc(linear.x),
        enc(linear.y),
        enc(linear.z),
        (linear.w.clamp(0.0, 1.0) * 255.0).round() as u8,
    ]
}
