// SampleStore — host-resident dataset arrays

use stoat_core::{Element, Error, LabelCode, Result};

use crate::labels::RawLabel;

/// Owns the host-resident arrays of a fully loaded dataset: samples, raw
/// labels, mapped label codes, and (for regression workloads) targets.
///
/// Samples are stored flattened: element `i` occupies
/// `samples[i * sample_size .. (i + 1) * sample_size]`. The raw label
/// sequence is either empty (unlabeled dataset) or exactly one label per
/// sample; `mapped_labels` is populated by the loader iff raw labels are
/// present.
///
/// Device-resident mirrors of these arrays are owned by the backend binding,
/// not by the store, and live for one backend binding.
#[derive(Debug, Clone)]
pub struct SampleStore<T: Element, L: RawLabel = LabelCode> {
    samples: Vec<T>,
    sample_shape: Vec<usize>,
    raw_labels: Vec<L>,
    mapped_labels: Vec<LabelCode>,
    targets: Vec<T>,
    target_shape: Vec<usize>,
}

impl<T: Element, L: RawLabel> SampleStore<T, L> {
    /// Create a store over an unlabeled dataset.
    ///
    /// `samples.len()` must be a whole multiple of the sample element count.
    pub fn unlabeled(samples: Vec<T>, sample_shape: Vec<usize>) -> Result<Self> {
        let sample_size: usize = sample_shape.iter().product();
        if sample_shape.is_empty() || sample_size == 0 {
            return Err(Error::msg("sample shape must have at least one non-zero dimension"));
        }
        if samples.len() % sample_size != 0 {
            return Err(Error::msg(format!(
                "sample buffer length {} is not a multiple of the sample size {}",
                samples.len(),
                sample_size
            )));
        }
        Ok(Self {
            samples,
            sample_shape,
            raw_labels: Vec::new(),
            mapped_labels: Vec::new(),
            targets: Vec::new(),
            target_shape: Vec::new(),
        })
    }

    /// Create a store over a labeled dataset: one raw label per sample.
    pub fn labeled(samples: Vec<T>, sample_shape: Vec<usize>, raw_labels: Vec<L>) -> Result<Self> {
        let store = Self::unlabeled(samples, sample_shape)?;
        if raw_labels.len() != store.len() {
            return Err(Error::LabelCountMismatch {
                labels: raw_labels.len(),
                samples: store.len(),
            });
        }
        Ok(Self {
            raw_labels,
            ..store
        })
    }

    /// Attach a target row per sample, enabling the regression pipeline.
    pub fn with_targets(mut self, targets: Vec<T>, target_shape: Vec<usize>) -> Result<Self> {
        let target_size: usize = target_shape.iter().product();
        if target_shape.is_empty() || target_size == 0 {
            return Err(Error::msg("target shape must have at least one non-zero dimension"));
        }
        if targets.len() != self.len() * target_size {
            return Err(Error::msg(format!(
                "target buffer length {} does not match {} samples of target size {}",
                targets.len(),
                self.len(),
                target_size
            )));
        }
        self.targets = targets;
        self.target_shape = target_shape;
        Ok(self)
    }

    /// Number of samples in the store.
    pub fn len(&self) -> usize {
        let sample_size: usize = self.sample_shape.iter().product();
        if sample_size == 0 {
            0
        } else {
            self.samples.len() / sample_size
        }
    }

    /// Whether the store holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The shape of one sample.
    ///
    /// Fails with [`Error::ShapeNotReady`] until data has been loaded.
    pub fn shape(&self) -> Result<&[usize]> {
        if self.samples.is_empty() {
            return Err(Error::ShapeNotReady);
        }
        Ok(&self.sample_shape)
    }

    /// Elements per sample row.
    pub fn sample_size(&self) -> usize {
        self.sample_shape.iter().product()
    }

    /// The flattened sample buffer.
    pub fn samples(&self) -> &[T] {
        &self.samples
    }

    pub(crate) fn samples_mut(&mut self) -> &mut [T] {
        &mut self.samples
    }

    /// Whether the dataset carries labels.
    pub fn has_labels(&self) -> bool {
        !self.raw_labels.is_empty()
    }

    /// The raw label sequence (empty for an unlabeled dataset).
    pub fn raw_labels(&self) -> &[L] {
        &self.raw_labels
    }

    /// Dense label codes, one per sample; empty until the loader has built
    /// the label mapping.
    pub fn mapped_labels(&self) -> &[LabelCode] {
        &self.mapped_labels
    }

    pub(crate) fn set_mapped_labels(&mut self, mapped: Vec<LabelCode>) {
        debug_assert_eq!(mapped.len(), self.len());
        self.mapped_labels = mapped;
    }

    /// Whether a target row per sample is present.
    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }

    /// The flattened target buffer (empty when no targets are attached).
    pub fn targets(&self) -> &[T] {
        &self.targets
    }

    pub(crate) fn targets_mut(&mut self) -> &mut [T] {
        &mut self.targets
    }

    /// The shape of one target row.
    pub fn target_shape(&self) -> Result<&[usize]> {
        if self.targets.is_empty() {
            return Err(Error::ShapeNotReady);
        }
        Ok(&self.target_shape)
    }

    /// Elements per target row (0 when no targets are attached).
    pub fn target_size(&self) -> usize {
        if self.targets.is_empty() {
            0
        } else {
            self.target_shape.iter().product()
        }
    }

    /// One sample row.
    pub fn sample_row(&self, index: usize) -> &[T] {
        let ss = self.sample_size();
        &self.samples[index * ss..(index + 1) * ss]
    }

    /// One target row.
    pub fn target_row(&self, index: usize) -> &[T] {
        let ts = self.target_shape.iter().product::<usize>();
        &self.targets[index * ts..(index + 1) * ts]
    }

    /// The smallest and largest element currently stored, if any.
    pub fn data_range(&self) -> Option<(T, T)> {
        range_of(&self.samples)
    }

    /// The smallest and largest target element currently stored, if any.
    pub fn target_range(&self) -> Option<(T, T)> {
        range_of(&self.targets)
    }
}

fn range_of<T: Element>(buf: &[T]) -> Option<(T, T)> {
    let first = *buf.first()?;
    let mut lo = first;
    let mut hi = first;
    for &v in &buf[1..] {
        if v < lo {
            lo = v;
        }
        if v > hi {
            hi = v;
        }
    }
    Some((lo, hi))
}
