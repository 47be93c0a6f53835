// FullBatchLoader — root lifecycle: initialize, resize, fill

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use stoat_core::{Element, Error, LabelCode, PermIndex, Result};
#[cfg(any(feature = "wgpu", feature = "cuda"))]
use stoat_core::FillDefs;

use crate::backend::{Binding, Device};
use crate::config::LoaderConfig;
use crate::labels::{LabelMapper, RawLabel};
use crate::minibatch::Minibatch;
use crate::normalize::{NoNormalizer, Normalizer};
use crate::partition::{Partition, SubsetKind};
use crate::store::SampleStore;
use crate::targets::TargetPipeline;

/// Loads an entire dataset in memory and produces fixed-capacity
/// minibatches from it.
///
/// Lifecycle: [`initialize`](Self::initialize) once (label mapping,
/// validation resize, normalization, buffer allocation, backend binding),
/// then per minibatch step [`fill_indices`](Self::fill_indices), followed
/// by [`fill_minibatch`](Self::fill_minibatch) when it returns `false`.
/// One logical thread of control per loader: no two fill operations run
/// concurrently, and the partition is resized synchronously before any
/// minibatch is produced under a given configuration.
pub struct FullBatchLoader<T: Element, L: RawLabel = LabelCode> {
    config: LoaderConfig,
    store: SampleStore<T, L>,
    partition: Partition,
    mapper: Option<LabelMapper<L>>,
    normalizer: Box<dyn Normalizer<T>>,
    regression: Option<TargetPipeline<T>>,
    minibatch: Option<Minibatch<T>>,
    binding: Binding<T>,
    rng: StdRng,
}

impl<T: Element, L: RawLabel> FullBatchLoader<T, L> {
    /// Create a loader over a complete store.
    ///
    /// `class_lengths` gives the `(test, valid, train)` subset sizes of the
    /// stored sample order; they must sum to the store's length. The
    /// configuration is checked eagerly: an out-of-range
    /// `validation_ratio` fails here, before any state exists.
    pub fn new(
        store: SampleStore<T, L>,
        class_lengths: [usize; 3],
        config: LoaderConfig,
    ) -> Result<Self> {
        config.validate()?;
        let total: usize = class_lengths.iter().sum();
        if total != store.len() {
            return Err(Error::msg(format!(
                "class lengths {:?} sum to {}, but the store holds {} samples",
                class_lengths,
                total,
                store.len()
            )));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let regression = store.has_targets().then(TargetPipeline::new);
        Ok(Self {
            config,
            partition: Partition::new(class_lengths),
            store,
            mapper: None,
            normalizer: Box::new(NoNormalizer),
            regression,
            minibatch: None,
            binding: Binding::host(),
            rng,
        })
    }

    /// Replace the sample normalizer (default: identity).
    pub fn with_normalizer(mut self, normalizer: Box<dyn Normalizer<T>>) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Replace the target normalizer (default: identity). Only meaningful
    /// when the store carries targets.
    pub fn with_target_normalizer(mut self, normalizer: Box<dyn Normalizer<T>>) -> Self {
        if let Some(regression) = &mut self.regression {
            regression.set_normalizer(normalizer);
        }
        self
    }

    /// Run the full initialization sequence and bind the execution target.
    ///
    /// Steps, in order: release any previous binding, map labels, resize
    /// the validation partition (iff configured), fit-and-apply
    /// normalization for samples and targets, allocate the minibatch
    /// window, bind the backend (mirror buffers, compile kernels, compute
    /// dispatch geometry).
    pub fn initialize(&mut self, device: Device) -> Result<()> {
        if self.store.is_empty() {
            return Err(Error::ShapeNotReady);
        }
        // Resource lifetime is one backend binding: drop the old one before
        // anything else so re-initialization starts clean.
        self.binding = Binding::host();

        if self.store.has_labels() {
            let train_offset = self.partition.offset(SubsetKind::Train);
            let mapper = LabelMapper::build(self.store.raw_labels(), train_offset);
            let mapped = mapper.map(self.store.raw_labels());
            info!("mapped labels into {} classes", mapper.num_classes());
            self.store.set_mapped_labels(mapped);
            self.mapper = Some(mapper);
        }

        if let Some(ratio) = self.config.validation_ratio {
            self.resize_validation(ratio)?;
        }

        debug!("data range before normalization: {:?}", self.store.data_range());
        let fit_from = self.partition.offset(SubsetKind::Valid) * self.store.sample_size();
        self.normalizer.analyze(&self.store.samples()[fit_from..]);
        self.normalizer.normalize(self.store.samples_mut());
        debug!("data range after normalization: {:?}", self.store.data_range());

        if let Some(regression) = &mut self.regression {
            info!("normalizing targets");
            regression.analyze_and_normalize(self.store.targets_mut());
        }

        self.minibatch = Some(Minibatch::allocate(
            self.config.max_minibatch_size,
            self.store.sample_size(),
            self.store.has_labels(),
            self.regression.as_ref().map(|_| self.store.target_size()),
        ));

        self.binding = self.bind(device)?;
        Ok(())
    }

    fn bind(&self, device: Device) -> Result<Binding<T>> {
        match device {
            Device::Host => Ok(Binding::host()),
            #[cfg(feature = "wgpu")]
            Device::Wgpu(dev) => {
                info!("loading the entire dataset on {}", dev.adapter_info());
                let defs = self.fill_defs();
                let binding = stoat_wgpu::LoaderBinding::bind(
                    &dev,
                    &defs,
                    self.store.samples(),
                    self.store.has_labels().then(|| self.store.mapped_labels()),
                    self.regression.as_ref().map(|_| self.store.targets()),
                    self.partition.permutation(),
                )?;
                Ok(Binding::Wgpu(binding))
            }
            #[cfg(feature = "cuda")]
            Device::Cuda(ctx) => {
                info!("loading the entire dataset on {}", ctx.name());
                let defs = self.fill_defs();
                let binding = stoat_cuda::LoaderBinding::bind(
                    &ctx,
                    &defs,
                    self.store.samples(),
                    self.store.has_labels().then(|| self.store.mapped_labels()),
                    self.regression.as_ref().map(|_| self.store.targets()),
                    self.partition.permutation(),
                )?;
                Ok(Binding::Cuda(binding))
            }
        }
    }

    #[cfg(any(feature = "wgpu", feature = "cuda"))]
    fn fill_defs(&self) -> FillDefs {
        FillDefs {
            labels: self.store.has_labels(),
            sample_size: self.store.sample_size(),
            target_size: self.regression.as_ref().map(|_| self.store.target_size()),
            max_minibatch_size: self.config.max_minibatch_size,
            src_dtype: T::DTYPE,
            dst_dtype: T::DTYPE,
        }
    }

    /// Repartition the validation+train pool (see
    /// [`Partition::resize_validation`]), then refresh the device-resident
    /// permutation if a backend is bound.
    pub fn resize_validation(&mut self, ratio: f64) -> Result<()> {
        let labels = self
            .store
            .has_labels()
            .then(|| self.store.mapped_labels());
        self.partition
            .resize_validation(labels, ratio, &mut self.rng)?;
        info!(
            "partition resized to (test, valid, train) = {:?}",
            self.partition.class_lengths()
        );
        self.sync_permutation()
    }

    /// Reshuffle the train range (call at epoch boundaries), then refresh
    /// the device-resident permutation if a backend is bound.
    pub fn shuffle_train(&mut self) -> Result<()> {
        self.partition.shuffle_train(&mut self.rng);
        self.sync_permutation()
    }

    fn sync_permutation(&mut self) -> Result<()> {
        match &mut self.binding {
            Binding::Host(_) => Ok(()),
            #[cfg(feature = "wgpu")]
            Binding::Wgpu(b) => b.write_permutation(self.partition.permutation()),
            #[cfg(feature = "cuda")]
            Binding::Cuda(b) => b.write_permutation(self.partition.permutation()),
        }
    }

    /// Select the window `permutation[start_offset..start_offset + count]`
    /// as the active minibatch.
    ///
    /// Returns `false` when a host-side copy is still required (call
    /// [`fill_minibatch`](Self::fill_minibatch) next) and `true` when the
    /// bound accelerator filled the window on device. On an accelerator the
    /// sample and target kernels run inside this one call; if either fails
    /// the whole call fails.
    pub fn fill_indices(&mut self, start_offset: usize, count: usize) -> Result<bool> {
        let minibatch = self
            .minibatch
            .as_mut()
            .ok_or_else(|| Error::msg("loader is not initialized"))?;
        if count > minibatch.max_size() {
            return Err(Error::msg(format!(
                "minibatch of {} rows exceeds the window capacity {}",
                count,
                minibatch.max_size()
            )));
        }
        if start_offset + count > self.partition.total() {
            return Err(Error::msg(format!(
                "window [{}, {}) runs past the dataset end {}",
                start_offset,
                start_offset + count,
                self.partition.total()
            )));
        }
        minibatch.size = count;
        match &mut self.binding {
            Binding::Host(_) => {
                let window = &self.partition.permutation()[start_offset..start_offset + count];
                minibatch.indices[..count].copy_from_slice(window);
                Ok(false)
            }
            #[cfg(feature = "wgpu")]
            Binding::Wgpu(b) => {
                b.fill(start_offset, count)?;
                Ok(true)
            }
            #[cfg(feature = "cuda")]
            Binding::Cuda(b) => {
                b.fill(start_offset, count)?;
                Ok(true)
            }
        }
    }

    /// Host fallback path: copy the selected rows from the store into the
    /// window buffers. Produces bit-identical contents to the accelerator
    /// path for the same permutation, offset, and count.
    pub fn fill_minibatch(&mut self) -> Result<()> {
        if !self.binding.is_host() {
            return Err(Error::msg(
                "fill_minibatch is the host path; the bound accelerator already filled the window",
            ));
        }
        let minibatch = self
            .minibatch
            .as_mut()
            .ok_or_else(|| Error::msg("loader is not initialized"))?;
        let sample_size = self.store.sample_size();
        let count = minibatch.size;
        let indices = &minibatch.indices[..count];

        minibatch.data[..count * sample_size]
            .par_chunks_mut(sample_size)
            .zip(indices.par_iter())
            .for_each(|(row, &src)| {
                row.copy_from_slice(self.store.sample_row(src as usize));
            });

        if let Some(labels) = &mut minibatch.labels {
            let mapped = self.store.mapped_labels();
            for (row, &src) in indices.iter().enumerate() {
                labels[row] = mapped[src as usize];
            }
        }

        if let (Some(regression), Some(targets)) = (&self.regression, &mut minibatch.targets) {
            regression.fill_rows(
                self.store.targets(),
                self.store.target_size(),
                indices,
                targets,
            );
        }
        Ok(())
    }

    /// The `(start_offset, count)` minibatch windows covering one subset,
    /// in order; the last window is truncated.
    pub fn windows(&self, kind: SubsetKind) -> impl Iterator<Item = (usize, usize)> + '_ {
        let range = self.partition.range(kind);
        let step = self.config.max_minibatch_size;
        range.clone().step_by(step).map(move |start| {
            (start, step.min(range.end - start))
        })
    }

    /// The filled rows of the data window, wherever they live.
    ///
    /// On the host binding this reads the window buffers (valid after
    /// `fill_minibatch`); on an accelerator it maps the device mirror back
    /// for host access first.
    pub fn minibatch_data(&mut self) -> Result<&[T]> {
        let minibatch = self
            .minibatch
            .as_ref()
            .ok_or_else(|| Error::msg("loader is not initialized"))?;
        let filled = minibatch.size * self.store.sample_size();
        match &mut self.binding {
            Binding::Host(_) => Ok(minibatch.data()),
            #[cfg(feature = "wgpu")]
            Binding::Wgpu(b) => Ok(&b.minibatch_data()?[..filled]),
            #[cfg(feature = "cuda")]
            Binding::Cuda(b) => Ok(&b.minibatch_data()?[..filled]),
        }
    }

    /// The filled rows of the label window, when labels are present.
    pub fn minibatch_labels(&mut self) -> Result<Option<&[LabelCode]>> {
        let minibatch = self
            .minibatch
            .as_ref()
            .ok_or_else(|| Error::msg("loader is not initialized"))?;
        let filled = minibatch.size;
        match &mut self.binding {
            Binding::Host(_) => Ok(minibatch.labels()),
            #[cfg(feature = "wgpu")]
            Binding::Wgpu(b) => Ok(b.minibatch_labels()?.map(|l| &l[..filled])),
            #[cfg(feature = "cuda")]
            Binding::Cuda(b) => Ok(b.minibatch_labels()?.map(|l| &l[..filled])),
        }
    }

    /// The filled rows of the target window, when targets are present.
    pub fn minibatch_targets(&mut self) -> Result<Option<&[T]>> {
        let minibatch = self
            .minibatch
            .as_ref()
            .ok_or_else(|| Error::msg("loader is not initialized"))?;
        let filled = minibatch.size * self.store.target_size();
        match &mut self.binding {
            Binding::Host(_) => Ok(minibatch.targets()),
            #[cfg(feature = "wgpu")]
            Binding::Wgpu(b) => Ok(b.minibatch_targets()?.map(|t| &t[..filled])),
            #[cfg(feature = "cuda")]
            Binding::Cuda(b) => Ok(b.minibatch_targets()?.map(|t| &t[..filled])),
        }
    }

    /// The global sample indices populating the current window.
    pub fn minibatch_indices(&mut self) -> Result<&[PermIndex]> {
        let minibatch = self
            .minibatch
            .as_ref()
            .ok_or_else(|| Error::msg("loader is not initialized"))?;
        let filled = minibatch.size;
        match &mut self.binding {
            Binding::Host(_) => Ok(minibatch.indices()),
            #[cfg(feature = "wgpu")]
            Binding::Wgpu(b) => Ok(&b.minibatch_indices()?[..filled]),
            #[cfg(feature = "cuda")]
            Binding::Cuda(b) => Ok(&b.minibatch_indices()?[..filled]),
        }
    }

    /// The minibatch window (host view).
    pub fn minibatch(&self) -> Option<&Minibatch<T>> {
        self.minibatch.as_ref()
    }

    /// The sample store.
    pub fn store(&self) -> &SampleStore<T, L> {
        &self.store
    }

    /// The partition state.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// The label mapper, once labels have been mapped.
    pub fn mapper(&self) -> Option<&LabelMapper<L>> {
        self.mapper.as_ref()
    }

    /// Number of classes (0 for an unlabeled dataset).
    pub fn num_classes(&self) -> usize {
        self.mapper.as_ref().map_or(0, |m| m.num_classes())
    }

    /// Whether the dataset carries labels.
    pub fn has_labels(&self) -> bool {
        self.store.has_labels()
    }

    /// The shape of one sample.
    pub fn shape(&self) -> Result<&[usize]> {
        self.store.shape()
    }
}

impl<T: Element, L: RawLabel> std::fmt::Debug for FullBatchLoader<T, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FullBatchLoader")
            .field("samples", &self.store.len())
            .field("class_lengths", &self.partition.class_lengths())
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}
