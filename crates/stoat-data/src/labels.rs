// LabelMapper — raw label values to dense integer codes

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use log::warn;

use stoat_core::LabelCode;

/// Raw label values as they arrive from a dataset decoder: class names,
/// integer ids, whatever the source format uses.
pub trait RawLabel: Ord + Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<L> RawLabel for L where L: Ord + Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

/// Converts arbitrary raw label values into a dense contiguous code space
/// `0..num_classes`, consistent across the test/validation/train subsets.
///
/// Codes are assigned to the union of all labels seen anywhere in the
/// dataset, in sorted raw-label order. The mapping is built once per dataset
/// instance and is stable for its lifetime: no two raw labels share a code
/// and there are no gaps.
#[derive(Debug, Clone)]
pub struct LabelMapper<L: RawLabel> {
    code_of: BTreeMap<L, LabelCode>,
    raw_of: Vec<L>,
}

impl<L: RawLabel> LabelMapper<L> {
    /// Build the mapping from a raw label sequence, where the train subset
    /// occupies `raw[train_offset..]` and test+validation the prefix.
    ///
    /// Labels that only occur outside the train range are still mapped, but
    /// logged: a class the trainer never sees is usually a dataset bug.
    pub fn build(raw: &[L], train_offset: usize) -> Self {
        let mut train_counts: BTreeMap<&L, usize> = BTreeMap::new();
        for l in &raw[train_offset..] {
            *train_counts.entry(l).or_insert(0) += 1;
        }
        let mut other_counts: BTreeMap<&L, usize> = BTreeMap::new();
        for l in &raw[..train_offset] {
            *other_counts.entry(l).or_insert(0) += 1;
        }

        for (l, n) in &other_counts {
            if !train_counts.contains_key(*l) {
                warn!("label {:?} occurs {} times outside the train set but never inside it", l, n);
            }
        }

        let mut code_of = BTreeMap::new();
        let mut raw_of = Vec::new();
        for l in train_counts.keys().chain(other_counts.keys()) {
            if !code_of.contains_key(*l) {
                code_of.insert((*l).clone(), 0);
            }
        }
        // BTreeMap iteration is sorted, so codes follow raw-label order.
        for (code, (l, slot)) in code_of.iter_mut().enumerate() {
            *slot = code as LabelCode;
            raw_of.push(l.clone());
        }

        Self { code_of, raw_of }
    }

    /// Number of distinct classes.
    pub fn num_classes(&self) -> usize {
        self.raw_of.len()
    }

    /// The dense code of a raw label, if it was seen when building.
    pub fn code_of(&self, raw: &L) -> Option<LabelCode> {
        self.code_of.get(raw).copied()
    }

    /// The raw label a dense code was assigned to.
    pub fn raw_of(&self, code: LabelCode) -> Option<&L> {
        self.raw_of.get(code as usize)
    }

    /// Map every raw label to its dense code.
    ///
    /// Only labels seen by [`LabelMapper::build`] may appear; the loader
    /// builds the mapper from the same sequence it maps.
    pub fn map(&self, raw: &[L]) -> Vec<LabelCode> {
        raw.iter()
            .map(|l| self.code_of[l])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_dense_and_sorted() {
        let raw = vec![7i32, 3, 7, 5, 3, 7];
        let mapper = LabelMapper::build(&raw, 0);
        assert_eq!(mapper.num_classes(), 3);
        assert_eq!(mapper.code_of(&3), Some(0));
        assert_eq!(mapper.code_of(&5), Some(1));
        assert_eq!(mapper.code_of(&7), Some(2));
        assert_eq!(mapper.map(&raw), vec![2, 0, 2, 1, 0, 2]);
    }

    #[test]
    fn test_union_covers_non_train_labels() {
        // "9" only occurs in the test+validation prefix.
        let raw = vec![9i32, 1, 1, 2, 2, 2];
        let mapper = LabelMapper::build(&raw, 1);
        assert_eq!(mapper.num_classes(), 3);
        assert_eq!(mapper.code_of(&9), Some(2));
        assert_eq!(mapper.raw_of(0), Some(&1));
    }

    #[test]
    fn test_string_labels() {
        let raw: Vec<String> = ["dog", "cat", "dog", "emu"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mapper = LabelMapper::build(&raw, 0);
        assert_eq!(mapper.num_classes(), 3);
        assert_eq!(mapper.code_of(&"cat".to_string()), Some(0));
        assert_eq!(mapper.map(&raw), vec![1, 0, 1, 2]);
    }
}
