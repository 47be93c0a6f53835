// WGSL program text for the "fullbatch_loader" kernel family.
//
// WGSL has no preprocessor, so the definition set is spliced directly into
// the generated source: element type names become array element types,
// SAMPLE_SIZE / TARGET_SIZE become module constants, and the label section
// is only emitted when a label buffer is bound.

use stoat_core::{Error, FillDefs, Result};

/// Rows per workgroup (x) and columns per workgroup (y).
pub const WORKGROUP: (u32, u32) = (8, 32);

/// Generate the WGSL module for a definition set.
///
/// The module always contains `fill_minibatch_data_labels`; it additionally
/// contains `fill_minibatch_target` when the definition set carries a
/// target size. Binding slots: 0 params, 1 samples, 2 minibatch data,
/// 3 permutation, 4 minibatch indices, 5/6 labels, 7/8 targets.
pub fn loader_source(defs: &FillDefs) -> Result<String> {
    let src = wgsl_name(defs.src_dtype)?;
    let dst = wgsl_name(defs.dst_dtype)?;
    let (wx, wy) = WORKGROUP;

    let mut text = format!(
        "\
struct FillParams {{
    start_offset: u32,
    count: u32,
}}

@group(0) @binding(0) var<uniform> params: FillParams;
@group(0) @binding(1) var<storage, read> samples: array<{src}>;
@group(0) @binding(2) var<storage, read_write> minibatch_data: array<{dst}>;
@group(0) @binding(3) var<storage, read> permutation: array<u32>;
@group(0) @binding(4) var<storage, read_write> minibatch_indices: array<u32>;
"
    );

    if defs.labels {
        text.push_str(
            "@group(0) @binding(5) var<storage, read> labels: array<i32>;\n\
             @group(0) @binding(6) var<storage, read_write> minibatch_labels: array<i32>;\n",
        );
    }

    text.push_str(&format!(
        "\

const SAMPLE_SIZE: u32 = {sample_size}u;

@compute @workgroup_size({wx}, {wy}, 1)
fn fill_minibatch_data_labels(@builtin(global_invocation_id) gid: vec3<u32>) {{
    let row = gid.x;
    let col = gid.y;
    if (row >= params.count || col >= SAMPLE_SIZE) {{
        return;
    }}
    let src = permutation[params.start_offset + row];
    minibatch_data[row * SAMPLE_SIZE + col] = {dst}(samples[src * SAMPLE_SIZE + col]);
    if (col == 0u) {{
        minibatch_indices[row] = src;
",
        sample_size = defs.sample_size,
    ));
    if defs.labels {
        text.push_str("        minibatch_labels[row] = labels[src];\n");
    }
    text.push_str("    }\n}\n");

    if let Some(target_size) = defs.target_size {
        text.push_str(&format!(
            "\
@group(0) @binding(7) var<storage, read> targets: array<{src}>;
@group(0) @binding(8) var<storage, read_write> minibatch_targets: array<{dst}>;

const TARGET_SIZE: u32 = {target_size}u;

@compute @workgroup_size({wx}, {wy}, 1)
fn fill_minibatch_target(@builtin(global_invocation_id) gid: vec3<u32>) {{
    let row = gid.x;
    let col = gid.y;
    if (row >= params.count || col >= TARGET_SIZE) {{
        return;
    }}
    let src = permutation[params.start_offset + row];
    minibatch_targets[row * TARGET_SIZE + col] = {dst}(targets[src * TARGET_SIZE + col]);
}}
",
        ));
    }

    Ok(text)
}

fn wgsl_name(dtype: stoat_core::DType) -> Result<&'static str> {
    dtype
        .wgsl_name()
        .ok_or_else(|| Error::backend(format!("dtype {dtype} is not representable in WGSL")))
}

/// Workgroup counts covering a `rows x cols` grid.
pub fn workgroups(rows: usize, cols: usize) -> (u32, u32) {
    let (wx, wy) = WORKGROUP;
    (
        (rows as u32).div_ceil(wx).max(1),
        (cols as u32).div_ceil(wy).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use stoat_core::DType;

    fn defs() -> FillDefs {
        FillDefs {
            labels: true,
            sample_size: 16,
            target_size: None,
            max_minibatch_size: 4,
            src_dtype: DType::F32,
            dst_dtype: DType::F32,
        }
    }

    #[test]
    fn test_labeled_source_has_label_bindings() {
        let text = loader_source(&defs()).unwrap();
        assert!(text.contains("minibatch_labels[row] = labels[src];"));
        assert!(text.contains("const SAMPLE_SIZE: u32 = 16u;"));
        assert!(!text.contains("fill_minibatch_target"));
    }

    #[test]
    fn test_target_entry_emitted_with_target_size() {
        let mut d = defs();
        d.target_size = Some(3);
        let text = loader_source(&d).unwrap();
        assert!(text.contains("fill_minibatch_target"));
        assert!(text.contains("const TARGET_SIZE: u32 = 3u;"));
    }

    #[test]
    fn test_f64_is_rejected() {
        let mut d = defs();
        d.src_dtype = DType::F64;
        assert!(loader_source(&d).is_err());
    }

    #[test]
    fn test_workgroup_cover() {
        let (gx, gy) = workgroups(4, 16);
        assert_eq!((gx, gy), (1, 1));
        let (gx, gy) = workgroups(9, 33);
        assert_eq!((gx, gy), (2, 2));
    }
}
