// Minibatch — fixed-capacity window buffers

use stoat_core::{Element, LabelCode, PermIndex};

/// The minibatch window: buffers sized for `max_size` rows, allocated once
/// at initialization and repopulated every step. `size` is the current fill
/// (the last window of a subset is usually short); capacity never changes
/// at steady state.
#[derive(Debug, Clone)]
pub struct Minibatch<T: Element> {
    max_size: usize,
    sample_size: usize,
    target_size: usize,
    pub(crate) size: usize,
    pub(crate) data: Vec<T>,
    pub(crate) labels: Option<Vec<LabelCode>>,
    pub(crate) targets: Option<Vec<T>>,
    pub(crate) indices: Vec<PermIndex>,
}

impl<T: Element> Minibatch<T> {
    /// Allocate all window buffers for `max_size` rows.
    pub(crate) fn allocate(
        max_size: usize,
        sample_size: usize,
        has_labels: bool,
        target_size: Option<usize>,
    ) -> Self {
        Self {
            max_size,
            sample_size,
            target_size: target_size.unwrap_or(0),
            size: 0,
            data: vec![T::default(); max_size * sample_size],
            labels: has_labels.then(|| vec![0; max_size]),
            targets: target_size.map(|ts| vec![T::default(); max_size * ts]),
            indices: vec![0; max_size],
        }
    }

    /// Window capacity in rows.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Rows filled by the last `fill_indices` call.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The filled rows of the data buffer.
    pub fn data(&self) -> &[T] {
        &self.data[..self.size * self.sample_size]
    }

    /// The filled rows of the label buffer, when labels are present.
    pub fn labels(&self) -> Option<&[LabelCode]> {
        self.labels.as_deref().map(|l| &l[..self.size])
    }

    /// The filled rows of the target buffer, when targets are present.
    pub fn targets(&self) -> Option<&[T]> {
        self.targets.as_deref().map(|t| &t[..self.size * self.target_size])
    }

    /// The global sample indices populating this window.
    pub fn indices(&self) -> &[PermIndex] {
        &self.indices[..self.size]
    }
}
