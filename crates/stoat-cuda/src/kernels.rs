// CUDA source for the "fullbatch_loader" kernel family.
//
// The kernel text is a single template; a `#define` prelude built from the
// definition set specializes it before NVRTC compilation, so the compiled
// program matches the bound dataset exactly (element types, sample size,
// whether labels and targets exist).

use std::collections::BTreeMap;
use std::fmt::Write;

use stoat_core::FillDefs;

/// Name the compiled module is registered under.
pub const MODULE_NAME: &str = FillDefs::KERNEL_FAMILY;

/// One work item per element of the minibatch window; work items whose row
/// falls past the current fill count exit immediately, so the 1-D geometry
/// can stay fixed at the window capacity.
pub const KERNEL_TEMPLATE: &str = r#"
extern "C" __global__ void fill_minibatch_data_labels(
    const src_dtype *samples, dst_dtype *minibatch_data,
    int start_offset, int count,
#if LABELS
    const int *labels, int *minibatch_labels,
#endif
    const unsigned int *permutation, unsigned int *minibatch_indices)
{
    unsigned int idx = blockIdx.x * blockDim.x + threadIdx.x;
    unsigned int row = idx / SAMPLE_SIZE;
    unsigned int col = idx % SAMPLE_SIZE;
    if (row >= (unsigned int)count) {
        return;
    }
    unsigned int src = permutation[start_offset + row];
    minibatch_data[row * SAMPLE_SIZE + col] = (dst_dtype)samples[src * SAMPLE_SIZE + col];
    if (col == 0) {
        minibatch_indices[row] = src;
#if LABELS
        minibatch_labels[row] = labels[src];
#endif
    }
}

#if TARGET
extern "C" __global__ void fill_minibatch_target(
    const src_dtype *targets, dst_dtype *minibatch_targets,
    int start_offset, int count,
    const unsigned int *permutation)
{
    unsigned int idx = blockIdx.x * blockDim.x + threadIdx.x;
    unsigned int row = idx / TARGET_SIZE;
    unsigned int col = idx % TARGET_SIZE;
    if (row >= (unsigned int)count) {
        return;
    }
    unsigned int src = permutation[start_offset + row];
    minibatch_targets[row * TARGET_SIZE + col] = (dst_dtype)targets[src * TARGET_SIZE + col];
}
#endif
"#;

/// The `#define` map for a definition set.
pub fn defines(defs: &FillDefs) -> BTreeMap<&'static str, String> {
    let mut map = BTreeMap::new();
    map.insert("LABELS", (defs.labels as u32).to_string());
    map.insert("SAMPLE_SIZE", defs.sample_size.to_string());
    map.insert("MAX_MINIBATCH_SIZE", defs.max_minibatch_size.to_string());
    map.insert("TARGET", (defs.target_size.is_some() as u32).to_string());
    map.insert("TARGET_SIZE", defs.target_size.unwrap_or(1).to_string());
    map.insert("src_dtype", defs.src_dtype.cuda_name().to_string());
    map.insert("dst_dtype", defs.dst_dtype.cuda_name().to_string());
    map
}

/// The full program text: `#define` prelude plus the kernel template.
pub fn loader_source(defs: &FillDefs) -> String {
    let mut src = String::new();
    for (key, value) in defines(defs) {
        writeln!(src, "#define {} {}", key, value).expect("write to String");
    }
    src.push_str(KERNEL_TEMPLATE);
    src
}

/// Entry point names present in a program compiled for `defs`.
pub fn entry_names(defs: &FillDefs) -> Vec<&'static str> {
    let mut names = vec![FillDefs::ENTRY_DATA];
    if defs.target_size.is_some() {
        names.push(FillDefs::ENTRY_TARGET);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use stoat_core::DType;

    #[test]
    fn test_prelude_specializes_template() {
        let defs = FillDefs {
            labels: true,
            sample_size: 784,
            target_size: Some(10),
            max_minibatch_size: 64,
            src_dtype: DType::U8,
            dst_dtype: DType::F32,
        };
        let src = loader_source(&defs);
        assert!(src.contains("#define LABELS 1"));
        assert!(src.contains("#define SAMPLE_SIZE 784"));
        assert!(src.contains("#define TARGET 1"));
        assert!(src.contains("#define src_dtype unsigned char"));
        assert!(src.contains("#define dst_dtype float"));
        assert_eq!(entry_names(&defs), vec![
            "fill_minibatch_data_labels",
            "fill_minibatch_target",
        ]);
    }

    #[test]
    fn test_no_target_entry_without_targets() {
        let defs = FillDefs {
            labels: false,
            sample_size: 4,
            target_size: None,
            max_minibatch_size: 2,
            src_dtype: DType::F32,
            dst_dtype: DType::F32,
        };
        let src = loader_source(&defs);
        assert!(src.contains("#define TARGET 0"));
        assert_eq!(entry_names(&defs), vec!["fill_minibatch_data_labels"]);
    }
}
