// Partition — test/validation/train split as one index permutation

use std::collections::BTreeMap;
use std::ops::Range;

use rand::seq::SliceRandom;
use rand::Rng;

use stoat_core::{Error, LabelCode, PermIndex, Result};

/// The three dataset subsets, in their fixed storage order.
///
/// The variants index [`Partition::class_lengths`]; the subsets occupy
/// consecutive ranges of the permutation in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsetKind {
    Test = 0,
    Valid = 1,
    Train = 2,
}

impl SubsetKind {
    /// All subsets in storage order.
    pub const ALL: [SubsetKind; 3] = [SubsetKind::Test, SubsetKind::Valid, SubsetKind::Train];
}

/// Test/validation/train partition state: three subset lengths plus one
/// permutation of `[0, N)` whose prefix ranges realize the subsets.
///
/// Repartitioning moves indices only; sample data never moves. The
/// permutation is a bijection on `[0, N)` at all times, and the three
/// lengths always sum to `N`.
#[derive(Debug, Clone)]
pub struct Partition {
    class_lengths: [usize; 3],
    permutation: Vec<PermIndex>,
}

impl Partition {
    /// Build a partition with the identity permutation.
    pub fn new(class_lengths: [usize; 3]) -> Self {
        let total: usize = class_lengths.iter().sum();
        Self {
            class_lengths,
            permutation: (0..total as PermIndex).collect(),
        }
    }

    /// Total number of samples covered.
    pub fn total(&self) -> usize {
        self.permutation.len()
    }

    /// Length of one subset.
    pub fn len(&self, kind: SubsetKind) -> usize {
        self.class_lengths[kind as usize]
    }

    /// Whether the partition covers no samples.
    pub fn is_empty(&self) -> bool {
        self.permutation.is_empty()
    }

    /// Offset of a subset's first permutation slot.
    pub fn offset(&self, kind: SubsetKind) -> usize {
        self.class_lengths[..kind as usize].iter().sum()
    }

    /// The permutation range a subset occupies.
    pub fn range(&self, kind: SubsetKind) -> Range<usize> {
        let start = self.offset(kind);
        start..start + self.len(kind)
    }

    /// The subset lengths as `(test, valid, train)`.
    pub fn class_lengths(&self) -> [usize; 3] {
        self.class_lengths
    }

    /// The current permutation.
    pub fn permutation(&self) -> &[PermIndex] {
        &self.permutation
    }

    /// Repartition the validation+train pool into a new validation/train
    /// split by permuting indices; the test prefix is never touched.
    ///
    /// * `ratio <= 0` dissolves the validation set into train.
    /// * `0 < ratio < 1` extracts `round(ratio * pool)` samples into the
    ///   validation range: per class when `labels` are given (stratified),
    ///   uniformly otherwise.
    /// * `ratio >= 1` (or a non-finite value) is a configuration error.
    ///
    /// The caller supplies the random generator; an identical seed over
    /// identical inputs yields an identical permutation. All preconditions
    /// are checked before any state is mutated.
    pub fn resize_validation<R: Rng>(
        &mut self,
        labels: Option<&[LabelCode]>,
        ratio: f64,
        rng: &mut R,
    ) -> Result<()> {
        if !ratio.is_finite() || ratio >= 1.0 {
            return Err(Error::InvalidRatio(ratio));
        }
        if ratio <= 0.0 {
            self.class_lengths[SubsetKind::Train as usize] +=
                self.class_lengths[SubsetKind::Valid as usize];
            self.class_lengths[SubsetKind::Valid as usize] = 0;
            return Ok(());
        }

        let pool_start = self.len(SubsetKind::Test);
        let pool_end = self.total();
        let pool_size = pool_end - pool_start;

        match labels {
            None => self.resize_uniform(ratio, pool_start, pool_end, rng),
            Some(labels) => self.resize_stratified(labels, ratio, pool_start, pool_end, rng)?,
        }

        let valid = self.class_lengths[SubsetKind::Valid as usize];
        self.class_lengths[SubsetKind::Train as usize] = pool_size - valid;
        Ok(())
    }

    /// Partial Fisher-Yates: the first `n` slots drawn into the validation
    /// prefix are a uniform subset of the pool, without replacement.
    fn resize_uniform<R: Rng>(
        &mut self,
        ratio: f64,
        pool_start: usize,
        pool_end: usize,
        rng: &mut R,
    ) {
        let pool_size = pool_end - pool_start;
        let n = (ratio * pool_size as f64).round() as usize;
        let mut offs = pool_start;
        for _ in 0..n {
            let i = rng.gen_range(offs..pool_end);
            self.permutation.swap(offs, i);
            offs += 1;
        }
        self.class_lengths[SubsetKind::Valid as usize] = offs - pool_start;
    }

    /// Quota-constrained partial shuffle. Draws whose label quota is already
    /// exhausted are swapped to the logical end of the active pool, which
    /// shrinks by one per rejection; `offs` only advances on acceptance.
    fn resize_stratified<R: Rng>(
        &mut self,
        labels: &[LabelCode],
        ratio: f64,
        pool_start: usize,
        pool_end: usize,
        rng: &mut R,
    ) -> Result<()> {
        let mut quotas: BTreeMap<LabelCode, usize> = BTreeMap::new();
        for &slot in &self.permutation[pool_start..pool_end] {
            *quotas.entry(labels[slot as usize]).or_insert(0) += 1;
        }
        let mut remaining = 0usize;
        for (&label, count) in quotas.iter_mut() {
            let available = *count;
            let quota = ((ratio * available as f64).round() as usize).max(1);
            if quota >= available {
                return Err(Error::InsufficientClass {
                    label,
                    quota,
                    available,
                });
            }
            *count = quota;
            remaining += quota;
        }

        let mut offs = pool_start;
        let mut end = pool_end;
        while remaining > 0 {
            let i = rng.gen_range(offs..end);
            let label = labels[self.permutation[i] as usize];
            let quota = quotas
                .get_mut(&label)
                .expect("drawn label was counted over the same pool");
            if *quota == 0 {
                end -= 1;
                self.permutation.swap(i, end);
                continue;
            }
            self.permutation.swap(offs, i);
            *quota -= 1;
            remaining -= 1;
            offs += 1;
        }
        self.class_lengths[SubsetKind::Valid as usize] = offs - pool_start;
        Ok(())
    }

    /// Reshuffle the train range in place (per-epoch reshuffling).
    pub fn shuffle_train<R: Rng>(&mut self, rng: &mut R) {
        let range = self.range(SubsetKind::Train);
        self.permutation[range].shuffle(rng);
    }
}
