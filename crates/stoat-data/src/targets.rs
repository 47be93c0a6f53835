// TargetPipeline — the regression (MSE) extension

use log::debug;

use stoat_core::Element;

use crate::normalize::{NoNormalizer, Normalizer};

/// The per-target half of a regression workload, composed onto the loader
/// as an explicit optional component.
///
/// It owns its own normalizer instance and repeats the sample pipeline's
/// shape for the target buffer: analyze, normalize in place, and copy one
/// target row per minibatch row. On an accelerator it additionally gets its
/// own device mirrors, kernel entry point, and dispatch geometry (owned by
/// the backend binding); both pipelines run inside the same `fill_indices`
/// call and fail together.
pub struct TargetPipeline<T: Element> {
    normalizer: Box<dyn Normalizer<T>>,
}

impl<T: Element> TargetPipeline<T> {
    pub(crate) fn new() -> Self {
        Self {
            normalizer: Box::new(NoNormalizer),
        }
    }

    pub(crate) fn set_normalizer(&mut self, normalizer: Box<dyn Normalizer<T>>) {
        self.normalizer = normalizer;
    }

    /// Fit on the whole target buffer and rescale it in place. Targets have
    /// no held-out prefix; the asymmetric fit range only applies to samples.
    pub(crate) fn analyze_and_normalize(&mut self, targets: &mut [T]) {
        self.normalizer.analyze(targets);
        self.normalizer.normalize(targets);
        debug!("normalized {} target elements", targets.len());
    }

    /// Host fill path: copy one target row per filled minibatch row.
    pub(crate) fn fill_rows(
        &self,
        targets: &[T],
        target_size: usize,
        indices: &[u32],
        out: &mut [T],
    ) {
        for (row, &src) in indices.iter().enumerate() {
            let src = src as usize * target_size;
            out[row * target_size..(row + 1) * target_size]
                .copy_from_slice(&targets[src..src + target_size]);
        }
    }
}

impl<T: Element> std::fmt::Debug for TargetPipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetPipeline").finish_non_exhaustive()
    }
}
