use crate::dtype::DType;

// The fill-kernel definition set.
//
// Accelerator backends compile the "fullbatch_loader" kernel family once per
// binding, specialized by the values below. Both backends derive their
// program text from this one struct, so the host and device views of a
// bound dataset cannot drift apart.

/// Compile-time parameters of the minibatch fill kernels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillDefs {
    /// Whether a label buffer is bound alongside the sample buffer.
    pub labels: bool,
    /// Elements per sample row.
    pub sample_size: usize,
    /// Elements per target row; `None` when no regression pipeline is bound.
    pub target_size: Option<usize>,
    /// Capacity of the minibatch window (rows).
    pub max_minibatch_size: usize,
    /// Element type of the stored dataset.
    pub src_dtype: DType,
    /// Element type of the minibatch buffers.
    pub dst_dtype: DType,
}

impl FillDefs {
    /// Kernel family compiled by every accelerator binding.
    pub const KERNEL_FAMILY: &'static str = "fullbatch_loader";
    /// Entry point that fills the data window (and labels, when bound).
    pub const ENTRY_DATA: &'static str = "fill_minibatch_data_labels";
    /// Entry point of the regression pipeline's target fill.
    pub const ENTRY_TARGET: &'static str = "fill_minibatch_target";

    /// Total element count of the data window, for 1-D dispatch geometry.
    pub fn data_elems(&self) -> usize {
        self.max_minibatch_size * self.sample_size
    }

    /// Total element count of the target window, for 1-D dispatch geometry.
    pub fn target_elems(&self) -> usize {
        self.max_minibatch_size * self.target_size.unwrap_or(0)
    }
}
