/// WGSL shader drawing the display texture on a full-surface quad.
///
/// Texture row 0 holds the bottom image row, so the quad maps v = 0 to the
/// bottom edge of the surface.
pub const BLIT_SHADER: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    out.uv = in.uv;
    return out;
}

@group(0) @binding(0)
var display_texture: texture_2d<f32>;
@group(0) @binding(1)
var display_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(display_texture, display_sampler, in.uv);
}
"#;
