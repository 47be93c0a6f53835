// CUDA backend tests. Run with `cargo test -p stoat-cuda` where a CUDA
// device and driver are present; without device 0 the tests skip with a
// message.

use stoat_core::{DType, FillDefs};
use stoat_cuda::{CudaContext, LoaderBinding};

fn gpu() -> Option<CudaContext> {
    match CudaContext::new(0) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("skipping CUDA test: {e}");
            None
        }
    }
}

fn defs(labels: bool, target_size: Option<usize>) -> FillDefs {
    FillDefs {
        labels,
        sample_size: 3,
        target_size,
        max_minibatch_size: 4,
        src_dtype: DType::F32,
        dst_dtype: DType::F32,
    }
}

#[test]
fn test_bind_and_fill_labeled() {
    let Some(ctx) = gpu() else { return };
    let samples: Vec<f32> = (0..12).map(|i| i as f32).collect(); // 4 samples of 3
    let labels: Vec<i32> = vec![7, 8, 9, 10];
    let permutation: Vec<u32> = vec![3, 1, 0, 2];
    let mut binding = LoaderBinding::bind(
        &ctx,
        &defs(true, None),
        &samples,
        Some(&labels),
        None,
        &permutation,
    )
    .unwrap();

    binding.fill(0, 2).unwrap();
    assert_eq!(&binding.minibatch_indices().unwrap()[..2], &[3, 1]);
    assert_eq!(
        &binding.minibatch_data().unwrap()[..6],
        &[9.0, 10.0, 11.0, 3.0, 4.0, 5.0]
    );
    assert_eq!(&binding.minibatch_labels().unwrap().unwrap()[..2], &[10, 8]);
}

#[test]
fn test_target_kernel_runs_in_same_fill() {
    let Some(ctx) = gpu() else { return };
    let samples: Vec<f32> = (0..12).map(|i| i as f32).collect();
    let targets: Vec<f32> = (0..8).map(|i| 50.0 + i as f32).collect(); // 4 targets of 2
    let permutation: Vec<u32> = vec![2, 0, 3, 1];
    let mut binding = LoaderBinding::bind(
        &ctx,
        &defs(false, Some(2)),
        &samples,
        None,
        Some(&targets),
        &permutation,
    )
    .unwrap();

    binding.fill(1, 3).unwrap();
    // Rows pick permutation[1..4] = [0, 3, 1].
    assert_eq!(&binding.minibatch_indices().unwrap()[..3], &[0, 3, 1]);
    assert_eq!(
        &binding.minibatch_targets().unwrap().unwrap()[..6],
        &[50.0, 51.0, 56.0, 57.0, 52.0, 53.0]
    );
}

#[test]
fn test_u8_samples_round_trip() {
    let Some(ctx) = gpu() else { return };
    // Raw byte samples move through the same byte-level mirrors.
    let samples: Vec<u8> = vec![0, 128, 255, 1, 2, 3];
    let permutation: Vec<u32> = vec![1, 0];
    let d = FillDefs {
        labels: false,
        sample_size: 3,
        target_size: None,
        max_minibatch_size: 2,
        src_dtype: DType::U8,
        dst_dtype: DType::U8,
    };
    let mut binding =
        LoaderBinding::bind(&ctx, &d, &samples, None, None, &permutation).unwrap();
    binding.fill(0, 2).unwrap();
    assert_eq!(&binding.minibatch_data().unwrap()[..6], &[1, 2, 3, 0, 128, 255]);
}

#[test]
fn test_permutation_rewrite_reaches_device() {
    let Some(ctx) = gpu() else { return };
    let samples: Vec<f32> = (0..4).map(|i| i as f32).collect();
    let mut d = defs(false, None);
    d.sample_size = 1;
    let permutation: Vec<u32> = (0..4).collect();
    let mut binding = LoaderBinding::bind(&ctx, &d, &samples, None, None, &permutation).unwrap();

    binding.fill(0, 2).unwrap();
    assert_eq!(&binding.minibatch_data().unwrap()[..2], &[0.0, 1.0]);

    binding.write_permutation(&[3, 2, 1, 0]).unwrap();
    binding.fill(0, 2).unwrap();
    assert_eq!(&binding.minibatch_data().unwrap()[..2], &[3.0, 2.0]);
}
