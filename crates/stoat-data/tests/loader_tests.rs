// Tests for the host-path loader lifecycle: stores, label mapping,
// normalization, minibatch windows, and the regression pipeline.

use stoat_data::partition::SubsetKind;
use stoat_data::{
    Device, Error, FullBatchLoader, LabelCode, LinearNormalizer, LoaderConfig,
    MeanDispersionNormalizer, SampleStore,
};

fn toy_store(n: usize, sample_size: usize) -> SampleStore<f32> {
    let samples: Vec<f32> = (0..n * sample_size).map(|i| i as f32).collect();
    SampleStore::unlabeled(samples, vec![sample_size]).unwrap()
}

// SampleStore

#[test]
fn test_shape_not_ready_on_empty_store() {
    let store: SampleStore<f32> = SampleStore::unlabeled(vec![], vec![3]).unwrap();
    assert!(matches!(store.shape(), Err(Error::ShapeNotReady)));
    assert!(store.is_empty());
}

#[test]
fn test_label_count_mismatch() {
    let samples = vec![0.0f32; 12];
    match SampleStore::<f32, i32>::labeled(samples, vec![3], vec![1, 2]) {
        Err(Error::LabelCountMismatch { labels, samples }) => {
            assert_eq!(labels, 2);
            assert_eq!(samples, 4);
        }
        other => panic!("expected LabelCountMismatch, got {other:?}"),
    }
}

#[test]
fn test_ragged_sample_buffer_is_rejected() {
    assert!(SampleStore::<f32>::unlabeled(vec![0.0; 10], vec![3]).is_err());
}

#[test]
fn test_target_length_is_checked() {
    let store = toy_store(4, 2);
    assert!(store.clone().with_targets(vec![0.0; 8], vec![2]).is_ok());
    assert!(store.with_targets(vec![0.0; 7], vec![2]).is_err());
}

// Configuration

#[test]
fn test_invalid_ratio_fails_at_configuration_time() {
    let config = LoaderConfig::default().validation_ratio(1.5);
    match FullBatchLoader::<f32>::new(toy_store(4, 2), [0, 0, 4], config) {
        Err(Error::InvalidRatio(r)) => assert_eq!(r, 1.5),
        other => panic!("expected InvalidRatio, got {other:?}"),
    }
}

#[test]
fn test_class_lengths_must_cover_store() {
    let config = LoaderConfig::default();
    assert!(FullBatchLoader::<f32>::new(toy_store(4, 2), [0, 0, 5], config).is_err());
}

#[test]
fn test_zero_minibatch_size_is_rejected() {
    let config = LoaderConfig::default().max_minibatch_size(0);
    assert!(FullBatchLoader::<f32>::new(toy_store(4, 2), [0, 0, 4], config).is_err());
}

// Minibatch fill, host path

#[test]
fn test_fill_window_follows_permutation() {
    // samples [[1],[2],[3],[4]] with an identity partition: window
    // [1, 3) of the permutation picks global samples 1 and 2.
    let store = SampleStore::unlabeled(vec![1.0f32, 2.0, 3.0, 4.0], vec![1]).unwrap();
    let config = LoaderConfig::default().max_minibatch_size(2);
    let mut loader = FullBatchLoader::<f32>::new(store, [0, 0, 4], config).unwrap();
    loader.initialize(Device::Host).unwrap();

    let handled = loader.fill_indices(1, 2).unwrap();
    assert!(!handled, "host binding must require a host copy");
    loader.fill_minibatch().unwrap();

    assert_eq!(loader.minibatch_indices().unwrap(), &[1, 2]);
    assert_eq!(loader.minibatch_data().unwrap(), &[2.0, 3.0]);
}

#[test]
fn test_fill_with_labels_and_short_window() {
    let samples: Vec<f32> = (0..10).flat_map(|i| [i as f32, -(i as f32)]).collect();
    let labels: Vec<i32> = (0..10).map(|i| i % 2).collect();
    let store = SampleStore::labeled(samples, vec![2], labels).unwrap();
    let config = LoaderConfig::default().max_minibatch_size(4).seed(9);
    let mut loader = FullBatchLoader::<f32>::new(store, [0, 0, 10], config).unwrap();
    loader.initialize(Device::Host).unwrap();
    loader.shuffle_train().unwrap();

    // Last window of the train subset holds 10 % 4 = 2 rows.
    let windows: Vec<_> = loader.windows(SubsetKind::Train).collect();
    assert_eq!(windows, vec![(0, 4), (4, 4), (8, 2)]);

    loader.fill_indices(8, 2).unwrap();
    loader.fill_minibatch().unwrap();
    let indices = loader.minibatch_indices().unwrap().to_vec();
    assert_eq!(indices, loader.partition().permutation()[8..10].to_vec());
    let expected_labels: Vec<LabelCode> =
        indices.iter().map(|&i| (i as i32) % 2).collect();
    assert_eq!(loader.minibatch_labels().unwrap().unwrap(), expected_labels.as_slice());
    let expected_data: Vec<f32> = indices
        .iter()
        .flat_map(|&i| [i as f32, -(i as f32)])
        .collect();
    assert_eq!(loader.minibatch_data().unwrap(), expected_data.as_slice());
}

#[test]
fn test_fill_window_bounds_are_checked() {
    let config = LoaderConfig::default().max_minibatch_size(2);
    let mut loader = FullBatchLoader::<f32>::new(toy_store(4, 2), [0, 0, 4], config).unwrap();
    loader.initialize(Device::Host).unwrap();
    assert!(loader.fill_indices(0, 3).is_err(), "count beyond window capacity");
    assert!(loader.fill_indices(3, 2).is_err(), "window past the dataset end");
    assert!(loader.fill_indices(2, 2).is_ok());
}

#[test]
fn test_uninitialized_loader_refuses_to_fill() {
    let config = LoaderConfig::default();
    let mut loader = FullBatchLoader::<f32>::new(toy_store(4, 2), [0, 0, 4], config).unwrap();
    assert!(loader.fill_indices(0, 2).is_err());
}

// Label mapping through the loader

#[test]
fn test_initialize_maps_labels_densely() {
    let samples = vec![0.0f32; 6];
    let store = SampleStore::labeled(samples, vec![1], vec![30i32, 10, 30, 20, 10, 30]).unwrap();
    let mut loader =
        FullBatchLoader::<f32, i32>::new(store, [0, 0, 6], LoaderConfig::default()).unwrap();
    loader.initialize(Device::Host).unwrap();

    assert_eq!(loader.num_classes(), 3);
    assert_eq!(loader.store().mapped_labels(), &[2, 0, 2, 1, 0, 2]);
    let mapper = loader.mapper().unwrap();
    assert_eq!(mapper.code_of(&10), Some(0));
    assert_eq!(mapper.raw_of(2), Some(&30));
}

#[test]
fn test_string_labels_map_in_sorted_order() {
    let raw: Vec<String> = ["walk", "jump", "walk", "run"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let store = SampleStore::labeled(vec![0.0f32; 4], vec![1], raw).unwrap();
    let mut loader =
        FullBatchLoader::<f32, String>::new(store, [0, 0, 4], LoaderConfig::default()).unwrap();
    loader.initialize(Device::Host).unwrap();
    assert_eq!(loader.store().mapped_labels(), &[2, 0, 2, 1]);
}

// Validation resizing through the loader

#[test]
fn test_initialize_resizes_validation_once() {
    let labels: Vec<i32> = [vec![0; 8], vec![1; 4]].concat();
    let store = SampleStore::labeled(vec![0.0f32; 12], vec![1], labels).unwrap();
    let config = LoaderConfig::default().validation_ratio(0.25).seed(4);
    let mut loader = FullBatchLoader::<f32, i32>::new(store, [0, 0, 12], config).unwrap();
    loader.initialize(Device::Host).unwrap();
    assert_eq!(loader.partition().class_lengths(), [0, 3, 9]);
}

#[test]
fn test_no_ratio_means_no_repartitioning() {
    // Without a configured ratio, initialize leaves the partition alone.
    let config = LoaderConfig::default().seed(8);
    let mut loader = FullBatchLoader::<f32>::new(toy_store(9, 1), [2, 3, 4], config).unwrap();
    loader.initialize(Device::Host).unwrap();
    assert_eq!(loader.partition().class_lengths(), [2, 3, 4]);
    assert_eq!(
        loader.partition().permutation(),
        (0..9u32).collect::<Vec<_>>().as_slice()
    );
}

#[test]
fn test_reinitialize_rebinds_cleanly() {
    // A second initialize releases the previous binding and runs the whole
    // sequence again.
    let config = LoaderConfig::default().max_minibatch_size(3);
    let mut loader = FullBatchLoader::<f32>::new(toy_store(6, 2), [0, 0, 6], config).unwrap();
    loader.initialize(Device::Host).unwrap();
    loader.fill_indices(0, 3).unwrap();
    loader.fill_minibatch().unwrap();
    loader.initialize(Device::Host).unwrap();
    loader.fill_indices(3, 3).unwrap();
    loader.fill_minibatch().unwrap();
    assert_eq!(loader.minibatch_indices().unwrap(), &[3, 4, 5]);
}

#[test]
fn test_seeded_loaders_agree() {
    let build = || {
        let labels: Vec<i32> = (0..30).map(|i| i % 3).collect();
        let store = SampleStore::labeled(vec![0.0f32; 30], vec![1], labels).unwrap();
        let config = LoaderConfig::default().validation_ratio(0.2).seed(123);
        let mut loader = FullBatchLoader::<f32, i32>::new(store, [0, 0, 30], config).unwrap();
        loader.initialize(Device::Host).unwrap();
        loader.partition().permutation().to_vec()
    };
    assert_eq!(build(), build());
}

// Normalization

#[test]
fn test_normalizer_fits_past_test_prefix() {
    // Test prefix holds the extremes; statistics must come from the
    // validation+train range only, yet the whole buffer is rescaled.
    let samples = vec![-100.0f32, 100.0, 0.0, 1.0, 2.0, 3.0];
    let store = SampleStore::unlabeled(samples, vec![1]).unwrap();
    let mut loader = FullBatchLoader::<f32>::new(store, [2, 0, 4], LoaderConfig::default())
        .unwrap()
        .with_normalizer(Box::new(LinearNormalizer::new()));
    loader.initialize(Device::Host).unwrap();

    // Fitted interval is [0, 3] -> [-1, 1]; the test rows land outside it.
    let data = loader.store().samples();
    let expected: Vec<f32> = [-100.0f32, 100.0, 0.0, 1.0, 2.0, 3.0]
        .iter()
        .map(|v| (v - 0.0) * (2.0 / 3.0) - 1.0)
        .collect();
    for (got, want) in data.iter().zip(&expected) {
        assert!((got - want).abs() < 1e-5, "{got} != {want}");
    }
}

// Regression (MSE) pipeline

#[test]
fn test_targets_fill_alongside_data() {
    let samples: Vec<f32> = (0..8).map(|i| i as f32).collect();
    let targets: Vec<f32> = (0..16).map(|i| (100 + i) as f32).collect();
    let store = SampleStore::<f32>::unlabeled(samples, vec![1])
        .unwrap()
        .with_targets(targets, vec![2])
        .unwrap();
    let config = LoaderConfig::default().max_minibatch_size(3);
    let mut loader = FullBatchLoader::<f32>::new(store, [0, 0, 8], config).unwrap();
    loader.initialize(Device::Host).unwrap();

    loader.fill_indices(2, 3).unwrap();
    loader.fill_minibatch().unwrap();
    assert_eq!(loader.minibatch_data().unwrap(), &[2.0, 3.0, 4.0]);
    assert_eq!(
        loader.minibatch_targets().unwrap().unwrap(),
        &[104.0, 105.0, 106.0, 107.0, 108.0, 109.0]
    );
}

#[test]
fn test_target_normalizer_is_independent() {
    // Samples use the identity normalizer; targets get mean/dispersion.
    let samples = vec![1.0f32, 2.0, 3.0, 4.0];
    let targets = vec![1.0f32, 3.0, 1.0, 3.0];
    let store = SampleStore::<f32>::unlabeled(samples.clone(), vec![1])
        .unwrap()
        .with_targets(targets, vec![1])
        .unwrap();
    let mut loader = FullBatchLoader::<f32>::new(store, [0, 0, 4], LoaderConfig::default())
        .unwrap()
        .with_target_normalizer(Box::new(MeanDispersionNormalizer::new()));
    loader.initialize(Device::Host).unwrap();

    assert_eq!(loader.store().samples(), samples.as_slice());
    assert_eq!(loader.store().targets(), &[-1.0, 1.0, -1.0, 1.0]);
}

// Epoch iteration

#[test]
fn test_windows_cover_each_subset() {
    let config = LoaderConfig::default().max_minibatch_size(4);
    let mut loader = FullBatchLoader::<f32>::new(toy_store(20, 1), [6, 4, 10], config).unwrap();
    loader.initialize(Device::Host).unwrap();

    let test: Vec<_> = loader.windows(SubsetKind::Test).collect();
    assert_eq!(test, vec![(0, 4), (4, 2)]);
    let valid: Vec<_> = loader.windows(SubsetKind::Valid).collect();
    assert_eq!(valid, vec![(6, 4)]);
    let train: Vec<_> = loader.windows(SubsetKind::Train).collect();
    assert_eq!(train, vec![(10, 4), (14, 4), (18, 2)]);

    // Every train window fills without error and covers every sample once.
    let mut seen = Vec::new();
    for (start, count) in train {
        loader.fill_indices(start, count).unwrap();
        loader.fill_minibatch().unwrap();
        seen.extend_from_slice(loader.minibatch_indices().unwrap());
    }
    seen.sort_unstable();
    assert_eq!(seen, (10..20).collect::<Vec<u32>>());
}

#[test]
fn test_shuffle_train_keeps_subsets() {
    let config = LoaderConfig::default().seed(77);
    let mut loader = FullBatchLoader::<f32>::new(toy_store(12, 1), [2, 2, 8], config).unwrap();
    loader.initialize(Device::Host).unwrap();
    loader.shuffle_train().unwrap();

    let perm = loader.partition().permutation();
    assert_eq!(&perm[..4], &[0, 1, 2, 3]);
    let mut train = perm[4..].to_vec();
    train.sort_unstable();
    assert_eq!(train, (4..12).collect::<Vec<u32>>());
}
