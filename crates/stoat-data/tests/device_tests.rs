// Host/device equivalence: for the same permutation, start offset, and
// count, the accelerator fill path must produce buffers element-for-element
// equal to the host path.
//
// These tests acquire a wgpu adapter at runtime and are skipped (with a
// message) on machines that have none.

#![cfg(feature = "wgpu")]

use stoat_data::partition::SubsetKind;
use stoat_data::{Device, FullBatchLoader, LoaderConfig, SampleStore};
use stoat_wgpu::WgpuDevice;

fn gpu() -> Option<WgpuDevice> {
    match WgpuDevice::new() {
        Ok(dev) => Some(dev),
        Err(e) => {
            eprintln!("skipping wgpu test: {e}");
            None
        }
    }
}

fn labeled_store(n: usize, sample_size: usize) -> SampleStore<f32> {
    let samples: Vec<f32> = (0..n * sample_size).map(|i| (i * 7 % 113) as f32).collect();
    let labels: Vec<i32> = (0..n as i32).map(|i| i % 4).collect();
    SampleStore::labeled(samples, vec![sample_size], labels).unwrap()
}

fn loaders(
    dev: WgpuDevice,
    store: SampleStore<f32>,
    config: LoaderConfig,
) -> (FullBatchLoader<f32>, FullBatchLoader<f32>) {
    let class_lengths = [0, 0, store.len()];
    let mut host = FullBatchLoader::new(store.clone(), class_lengths, config.clone()).unwrap();
    let mut accel = FullBatchLoader::new(store, class_lengths, config).unwrap();
    host.initialize(Device::Host).unwrap();
    accel.initialize(Device::Wgpu(dev)).unwrap();
    (host, accel)
}

#[test]
fn test_fill_equivalence_labeled() {
    let Some(dev) = gpu() else { return };
    let config = LoaderConfig::default().max_minibatch_size(8).seed(21);
    let (mut host, mut accel) = loaders(dev, labeled_store(40, 5), config);

    for (start, count) in [(0usize, 8usize), (8, 8), (32, 8), (37, 3)] {
        assert!(!host.fill_indices(start, count).unwrap());
        host.fill_minibatch().unwrap();
        assert!(accel.fill_indices(start, count).unwrap());

        assert_eq!(
            host.minibatch_data().unwrap(),
            accel.minibatch_data().unwrap(),
            "data window [{start}, {})",
            start + count
        );
        assert_eq!(
            host.minibatch_labels().unwrap(),
            accel.minibatch_labels().unwrap()
        );
        assert_eq!(
            host.minibatch_indices().unwrap(),
            accel.minibatch_indices().unwrap()
        );
    }
}

#[test]
fn test_fill_equivalence_after_resize_and_shuffle() {
    let Some(dev) = gpu() else { return };
    // The same seed drives both loaders, so their permutations agree; the
    // accelerator's permutation mirror must follow each host-side change.
    let config = LoaderConfig::default()
        .max_minibatch_size(6)
        .validation_ratio(0.25)
        .seed(5);
    let (mut host, mut accel) = loaders(dev, labeled_store(48, 3), config);
    host.shuffle_train().unwrap();
    accel.shuffle_train().unwrap();
    assert_eq!(
        host.partition().permutation(),
        accel.partition().permutation()
    );

    let windows: Vec<_> = host.windows(SubsetKind::Train).collect();
    for (start, count) in windows {
        host.fill_indices(start, count).unwrap();
        host.fill_minibatch().unwrap();
        accel.fill_indices(start, count).unwrap();
        assert_eq!(host.minibatch_data().unwrap(), accel.minibatch_data().unwrap());
        assert_eq!(
            host.minibatch_labels().unwrap(),
            accel.minibatch_labels().unwrap()
        );
    }
}

#[test]
fn test_fill_equivalence_with_targets() {
    let Some(dev) = gpu() else { return };
    let samples: Vec<f32> = (0..30).map(|i| i as f32).collect();
    let targets: Vec<f32> = (0..60).map(|i| (i as f32) * 0.5).collect();
    let store = SampleStore::<f32>::unlabeled(samples, vec![1])
        .unwrap()
        .with_targets(targets, vec![2])
        .unwrap();
    let config = LoaderConfig::default().max_minibatch_size(7).seed(3);
    let (mut host, mut accel) = loaders(dev, store, config);

    host.fill_indices(10, 7).unwrap();
    host.fill_minibatch().unwrap();
    accel.fill_indices(10, 7).unwrap();
    assert_eq!(
        host.minibatch_targets().unwrap(),
        accel.minibatch_targets().unwrap()
    );
    assert_eq!(host.minibatch_data().unwrap(), accel.minibatch_data().unwrap());
}
