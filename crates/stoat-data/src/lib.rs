//! # stoat-data
//!
//! In-memory dataset loading and minibatch production for stoat.
//!
//! This crate provides:
//! - [`SampleStore`] — host-resident dataset arrays (samples, labels, targets)
//! - [`LabelMapper`] — raw label values to dense contiguous codes
//! - [`Partition`] — test/validation/train split as one index permutation,
//!   with stratified validation resizing
//! - [`Normalizer`] — analyze-then-rescale contract plus stock strategies
//! - [`FullBatchLoader`] — the root loader: initialize, resize, fill
//!   minibatches on the host or through a bound accelerator backend
//!
//! Accelerator backends are cargo features: `wgpu` (on by default) and
//! `cuda`.

pub mod backend;
pub mod config;
pub mod labels;
pub mod loader;
pub mod minibatch;
pub mod normalize;
pub mod partition;
pub mod store;
pub mod targets;

pub use backend::Device;
pub use config::LoaderConfig;
pub use labels::{LabelMapper, RawLabel};
pub use loader::FullBatchLoader;
pub use minibatch::Minibatch;
pub use normalize::{LinearNormalizer, MeanDispersionNormalizer, NoNormalizer, Normalizer};
pub use partition::{Partition, SubsetKind};
pub use store::SampleStore;
pub use targets::TargetPipeline;

pub use stoat_core::{DType, Element, Error, LabelCode, PermIndex, Result};

#[cfg(feature = "wgpu")]
pub use stoat_wgpu;

#[cfg(feature = "cuda")]
pub use stoat_cuda;
