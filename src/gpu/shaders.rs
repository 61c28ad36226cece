//! WGSL compute shader for the force step
//!
//! One invocation per point, one work-group per tile. The work-group size is
//! baked into the source because it also sizes the `var<workgroup>` tile
//! cache. The tile loop only depends on uniforms and `num_workgroups`, so both
//! `workgroupBarrier()` calls sit in uniform control flow; invocations past
//! the last point still join every barrier and just skip the final write.

/// Entry point name of the force step kernel
pub const FORCE_STEP_ENTRY_POINT: &str = "force_step";

/// Uniform flag: clamp positions to the canvas
pub const FLAG_CLAMP_TO_BOUNDS: u32 = 1;
/// Uniform flag: add wall repulsion
pub const FLAG_WALL_REPULSION: u32 = 2;
/// Uniform flag: divide gravity by the tile modulus
pub const FLAG_BALANCED_GRAVITY: u32 = 4;

const TILE_SIZE_MARKER: &str = "{{TILE_SIZE}}";

/// Bindings, constants and helpers
pub const TYPES: &str = r#"
const RAND_LENGTH: u32 = 73u;
const FLT_EPSILON: f32 = 1.1920929e-7;

const FLAG_CLAMP_TO_BOUNDS: u32 = 1u;
const FLAG_WALL_REPULSION: u32 = 2u;
const FLAG_BALANCED_GRAVITY: u32 = 4u;

struct Uniforms {
    num_points: u32,
    step_number: u32,
    width: f32,
    height: f32,
    tiles_per_iteration: u32,
    point_repulsion: f32,
    gravity_from_center: f32,
    wall_repulsion: f32,
    flags: u32,
    _padding0: u32,
    _padding1: u32,
    _padding2: u32,
}

@group(0) @binding(0) var<storage, read> input_positions: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read_write> output_positions: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read> rand_values: array<vec2<f32>>;
@group(0) @binding(3) var<uniform> uniforms: Uniforms;
"#;

/// Pairwise force: displacement of `a` caused by `b`
pub const POINT_FORCE: &str = r#"
fn point_force(a: vec2<f32>, b_in: vec2<f32>, force: f32, point_id: u32, rand_offset: u32) -> vec2<f32> {
    var b = b_in;
    var d = b - a;
    var r = (d.x * d.x) + (d.y * d.y);

    // Coincident points: fall back to a pseudo-random stand-in
    if (r < FLT_EPSILON * FLT_EPSILON) {
        b = rand_values[(point_id * rand_offset) % RAND_LENGTH];
        d = b - a;
        r = (d.x * d.x) + (d.y * d.y);
    }

    let k = force / r;
    return d * k;
}
"#;

/// Tiled repulsion, gravity and the optional wall/clamp terms
pub const FORCE_STEP: &str = r#"
var<workgroup> tile_points: array<vec2<f32>, {{TILE_SIZE}}>;

@compute @workgroup_size({{TILE_SIZE}})
fn force_step(
    @builtin(global_invocation_id) global_id: vec3<u32>,
    @builtin(local_invocation_id) local_id: vec3<u32>,
    @builtin(num_workgroups) num_groups: vec3<u32>,
) {
    let tile_size = {{TILE_SIZE}}u;
    let point_id = global_id.x;
    let thread_local_id = local_id.x;
    let num_points = uniforms.num_points;
    let step_number = uniforms.step_number;
    let in_range = point_id < num_points;

    let alpha = 1.0 / clamp(f32(step_number) / 2.0, 1.0, 30.0);
    let repulsion = uniforms.point_repulsion * alpha;

    var my_pos = vec2<f32>(0.0, 0.0);
    if (in_range) {
        my_pos = input_positions[point_id];
    }

    let num_tiles = num_groups.x;
    let modulus = max(num_tiles / max(uniforms.tiles_per_iteration, 1u), 1u);

    var pos_delta = vec2<f32>(0.0, 0.0);

    for (var tile = step_number % modulus; tile < num_tiles; tile += modulus) {
        let tile_start = tile * tile_size;
        let this_tile_size = min(tile_size, num_points - min(tile_start, num_points));

        if (thread_local_id < this_tile_size) {
            tile_points[thread_local_id] = input_positions[tile_start + thread_local_id];
        }

        workgroupBarrier();

        for (var j = 0u; j < this_tile_size; j++) {
            if (tile_start + j != point_id) {
                pos_delta += point_force(my_pos, tile_points[j], repulsion, point_id, step_number);
            }
        }

        workgroupBarrier();
    }

    if (!in_range) {
        return;
    }

    let dimensions = vec2<f32>(uniforms.width, uniforms.height);
    let center = dimensions / 2.0;
    var gravity = uniforms.gravity_from_center * alpha;
    if ((uniforms.flags & FLAG_BALANCED_GRAVITY) != 0u) {
        gravity = gravity / f32(modulus);
    }
    pos_delta += (center - my_pos) * gravity;

    if ((uniforms.flags & FLAG_WALL_REPULSION) != 0u) {
        let wall = uniforms.wall_repulsion * alpha;
        let wall_buffer = dimensions / 100.0;
        pos_delta += point_force(my_pos, vec2<f32>(0.0 - wall_buffer.x, my_pos.y), wall, point_id, step_number);
        pos_delta += point_force(my_pos, vec2<f32>(dimensions.x + wall_buffer.x, my_pos.y), wall, point_id, step_number);
        pos_delta += point_force(my_pos, vec2<f32>(my_pos.x, 0.0 - wall_buffer.y), wall, point_id, step_number);
        pos_delta += point_force(my_pos, vec2<f32>(my_pos.x, dimensions.y + wall_buffer.y), wall, point_id, step_number);
    }

    var new_pos = my_pos + pos_delta;
    if ((uniforms.flags & FLAG_CLAMP_TO_BOUNDS) != 0u) {
        new_pos = clamp(new_pos, vec2<f32>(0.0, 0.0), dimensions);
    }

    output_positions[point_id] = new_pos;
}
"#;

/// Full shader source for the given work-group (tile) size
pub fn force_step_shader(tile_size: u32) -> String {
    format!("{}\n{}\n{}", TYPES, POINT_FORCE, FORCE_STEP)
        .replace(TILE_SIZE_MARKER, &tile_size.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates WGSL code using naga.
    fn validate_wgsl(code: &str) -> Result<(), String> {
        let module = naga::front::wgsl::parse_str(code)
            .map_err(|e| format!("WGSL parse error: {:?}", e))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| format!("WGSL validation error: {:?}", e))?;

        Ok(())
    }

    #[test]
    fn shader_validates_for_common_tile_sizes() {
        for tile_size in [1, 32, 64, 128, 256] {
            let source = force_step_shader(tile_size);
            if let Err(e) = validate_wgsl(&source) {
                panic!("tile size {tile_size}: {e}");
            }
        }
    }

    #[test]
    fn tile_size_is_baked_in() {
        let source = force_step_shader(128);
        assert!(source.contains("@workgroup_size(128)"));
        assert!(source.contains("array<vec2<f32>, 128>"));
        assert!(!source.contains(TILE_SIZE_MARKER));
    }

    #[test]
    fn shader_exposes_entry_point() {
        let source = force_step_shader(64);
        assert!(source.contains(&format!("fn {}(", FORCE_STEP_ENTRY_POINT)));
    }

    #[test]
    fn rust_and_wgsl_flags_agree() {
        assert!(TYPES.contains(&format!(
            "FLAG_CLAMP_TO_BOUNDS: u32 = {}u;",
            FLAG_CLAMP_TO_BOUNDS
        )));
        assert!(TYPES.contains(&format!(
            "FLAG_WALL_REPULSION: u32 = {}u;",
            FLAG_WALL_REPULSION
        )));
        assert!(TYPES.contains(&format!(
            "FLAG_BALANCED_GRAVITY: u32 = {}u;",
            FLAG_BALANCED_GRAVITY
        )));
    }
}
