// LoaderConfig — configuration surface of the root loader

use stoat_core::{Error, Result};

/// Configuration for [`crate::FullBatchLoader`].
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Fraction of the validation+train pool to (re)extract into the
    /// validation subset during initialization. `None` leaves the partition
    /// untouched; values `<= 0` dissolve the validation set.
    pub validation_ratio: Option<f64>,
    /// Capacity of the minibatch window, in rows.
    pub max_minibatch_size: usize,
    /// Seed for the partitioner's random generator; `None` seeds from
    /// entropy (reproducible runs want a fixed seed).
    pub seed: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            validation_ratio: None,
            max_minibatch_size: 100,
            seed: None,
        }
    }
}

impl LoaderConfig {
    pub fn validation_ratio(mut self, ratio: f64) -> Self {
        self.validation_ratio = Some(ratio);
        self
    }

    pub fn max_minibatch_size(mut self, size: usize) -> Self {
        self.max_minibatch_size = size;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check the configuration eagerly, before any state exists.
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(ratio) = self.validation_ratio {
            if !ratio.is_finite() || ratio >= 1.0 {
                return Err(Error::InvalidRatio(ratio));
            }
        }
        if self.max_minibatch_size == 0 {
            return Err(Error::msg("max_minibatch_size must be positive"));
        }
        Ok(())
    }
}
