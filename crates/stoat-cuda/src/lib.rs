// CUDA backend — accelerator flavor B for the stoat data loader
//
// The kernel program is compiled at bind time via NVRTC, specialized by a
// `#define` prelude built from the definition set. Dispatch geometry is
// 1-D: a fixed block size and enough blocks to cover every element of the
// minibatch window; the target kernel gets its own geometry.
//
// Device transfers are byte-level (`bytemuck` views over the element
// buffers), so one upload/download pair serves every supported dtype.

pub mod kernels;

use std::sync::Arc;

use cudarc::driver::{CudaFunction, CudaSlice, LaunchAsync, LaunchConfig};
use cudarc::nvrtc::{compile_ptx_with_opts, CompileOptions};

use stoat_core::{Element, Error, FillDefs, LabelCode, PermIndex, Result};

/// Threads per block for the 1-D fill geometry.
const BLOCK: u32 = 256;

/// 1-D launch configuration covering `n` elements.
fn launch_cfg(n: usize) -> LaunchConfig {
    let grid = (n as u32).div_ceil(BLOCK);
    LaunchConfig {
        block_dim: (BLOCK, 1, 1),
        grid_dim: (grid.max(1), 1, 1),
        shared_mem_bytes: 0,
    }
}

// CudaContext — device handle

/// A CUDA execution context for the loader. Clonable (Arc internally).
#[derive(Clone)]
pub struct CudaContext {
    dev: Arc<cudarc::driver::CudaDevice>,
    ordinal: usize,
}

impl CudaContext {
    /// Open the GPU with the given ordinal (0, 1, ...).
    pub fn new(ordinal: usize) -> Result<Self> {
        let dev = cudarc::driver::CudaDevice::new(ordinal)
            .map_err(|e| Error::backend(format!("CUDA device creation failed: {e}")))?;
        Ok(Self { dev, ordinal })
    }

    /// The device name, e.g. `"cuda:0"`.
    pub fn name(&self) -> String {
        format!("cuda:{}", self.ordinal)
    }

    /// Compile the loader program for a definition set and load it.
    fn compile(&self, defs: &FillDefs) -> Result<()> {
        // Target the device's compute capability natively; PTX for a newer
        // toolkit than the driver understands fails to load otherwise.
        let major = self
            .dev
            .attribute(cudarc::driver::sys::CUdevice_attribute_enum::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR)
            .unwrap_or(8);
        let minor = self
            .dev
            .attribute(cudarc::driver::sys::CUdevice_attribute_enum::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR)
            .unwrap_or(9);
        let arch: &'static str = Box::leak(format!("sm_{major}{minor}").into_boxed_str());
        let opts = CompileOptions {
            arch: Some(arch),
            ..Default::default()
        };
        let ptx = compile_ptx_with_opts(kernels::loader_source(defs), opts)
            .map_err(|e| Error::backend(format!("NVRTC compilation failed: {e}")))?;
        self.dev
            .load_ptx(ptx, kernels::MODULE_NAME, &kernels::entry_names(defs))
            .map_err(|e| Error::backend(format!("PTX load failed: {e}")))?;
        Ok(())
    }

    fn get_func(&self, name: &str) -> Result<CudaFunction> {
        self.dev
            .get_func(kernels::MODULE_NAME, name)
            .ok_or_else(|| Error::backend(format!("CUDA kernel '{name}' not found")))
    }
}

impl std::fmt::Debug for CudaContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CudaContext({})", self.name())
    }
}

// Mirror — a host buffer with a device-resident twin

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    Synced,
    HostAhead,
    DeviceAhead,
}

/// A host vector mirrored into device memory with explicit map/unmap
/// state: device-visible before any kernel touches it, read back lazily on
/// the next host access.
struct Mirror<T: Element> {
    host: Vec<T>,
    dev: CudaSlice<u8>,
    state: SyncState,
    ctx: Arc<cudarc::driver::CudaDevice>,
}

impl<T: Element> Mirror<T> {
    fn new(ctx: &CudaContext, host: Vec<T>) -> Result<Self> {
        let dev = ctx
            .dev
            .htod_sync_copy(bytemuck::cast_slice(&host))
            .map_err(|e| Error::backend(format!("device upload failed: {e}")))?;
        Ok(Self {
            host,
            dev,
            state: SyncState::Synced,
            ctx: ctx.dev.clone(),
        })
    }

    fn write(&mut self, data: &[T]) {
        self.host.copy_from_slice(data);
        self.state = SyncState::HostAhead;
    }

    fn unmap_for_device(&mut self) -> Result<()> {
        if self.state == SyncState::HostAhead {
            self.ctx
                .htod_sync_copy_into(bytemuck::cast_slice(&self.host), &mut self.dev)
                .map_err(|e| Error::backend(format!("device upload failed: {e}")))?;
            self.state = SyncState::Synced;
        }
        Ok(())
    }

    fn mark_device_dirty(&mut self) {
        self.state = SyncState::DeviceAhead;
    }

    fn map_for_host(&mut self) -> Result<&[T]> {
        if self.state == SyncState::DeviceAhead {
            self.ctx
                .dtoh_sync_copy_into(&self.dev, bytemuck::cast_slice_mut(&mut self.host))
                .map_err(|e| Error::backend(format!("device readback failed: {e}")))?;
            self.state = SyncState::Synced;
        }
        Ok(&self.host)
    }
}

/// A dataset array made resident on device at bind time; the store keeps
/// the authoritative host copy.
struct Resident {
    dev: CudaSlice<u8>,
}

impl Resident {
    fn new<T: Element>(ctx: &CudaContext, data: &[T]) -> Result<Self> {
        let dev = ctx
            .dev
            .htod_sync_copy(bytemuck::cast_slice(data))
            .map_err(|e| Error::backend(format!("device upload failed: {e}")))?;
        Ok(Self { dev })
    }
}

// LoaderBinding — compiled kernels + bound buffers + dispatch geometry

/// The loader's bound CUDA state: resident dataset, compiled entry points,
/// and the fixed 1-D launch configurations. Dropping the binding frees
/// every device allocation it owns.
pub struct LoaderBinding<T: Element> {
    ctx: Arc<cudarc::driver::CudaDevice>,
    func_data: CudaFunction,
    func_target: Option<CudaFunction>,
    cfg_data: LaunchConfig,
    cfg_target: LaunchConfig,

    samples: Resident,
    labels: Option<Resident>,
    targets: Option<Resident>,
    permutation: Mirror<PermIndex>,
    minibatch_data: Mirror<T>,
    minibatch_labels: Option<Mirror<LabelCode>>,
    minibatch_targets: Option<Mirror<T>>,
    minibatch_indices: Mirror<PermIndex>,
}

impl<T: Element> LoaderBinding<T> {
    /// Mirror the dataset into device memory, compile the kernel program
    /// for the definition set, bind both entry points, and compute the
    /// dispatch geometry.
    pub fn bind(
        ctx: &CudaContext,
        defs: &FillDefs,
        samples: &[T],
        labels: Option<&[LabelCode]>,
        targets: Option<&[T]>,
        permutation: &[PermIndex],
    ) -> Result<Self> {
        debug_assert_eq!(defs.labels, labels.is_some());
        debug_assert_eq!(defs.target_size.is_some(), targets.is_some());

        ctx.compile(defs)?;
        let func_data = ctx.get_func(FillDefs::ENTRY_DATA)?;
        let func_target = defs
            .target_size
            .map(|_| ctx.get_func(FillDefs::ENTRY_TARGET))
            .transpose()?;

        let max = defs.max_minibatch_size;
        let binding = Self {
            ctx: ctx.dev.clone(),
            func_data,
            func_target,
            cfg_data: launch_cfg(defs.data_elems()),
            cfg_target: launch_cfg(defs.target_elems().max(1)),
            samples: Resident::new(ctx, samples)?,
            labels: labels.map(|l| Resident::new(ctx, l)).transpose()?,
            targets: targets.map(|t| Resident::new(ctx, t)).transpose()?,
            permutation: Mirror::new(ctx, permutation.to_vec())?,
            minibatch_data: Mirror::new(ctx, vec![T::default(); max * defs.sample_size])?,
            minibatch_labels: labels
                .map(|_| Mirror::new(ctx, vec![0 as LabelCode; max]))
                .transpose()?,
            minibatch_targets: defs
                .target_size
                .map(|ts| Mirror::new(ctx, vec![T::default(); max * ts]))
                .transpose()?,
            minibatch_indices: Mirror::new(ctx, vec![0 as PermIndex; max])?,
        };
        log::debug!(
            "compiled {} for {} window elements",
            kernels::MODULE_NAME,
            defs.data_elems()
        );
        Ok(binding)
    }

    /// Overwrite the device-resident permutation (after a resize or a
    /// train-range reshuffle).
    pub fn write_permutation(&mut self, permutation: &[PermIndex]) -> Result<()> {
        self.permutation.write(permutation);
        Ok(())
    }

    /// Latch the scalar constants and dispatch the fill kernels for the
    /// window `[start_offset, start_offset + count)`. Blocks until the
    /// device has finished; both kernels run inside this one call.
    pub fn fill(&mut self, start_offset: usize, count: usize) -> Result<()> {
        self.permutation.unmap_for_device()?;
        self.minibatch_data.unmap_for_device()?;
        self.minibatch_indices.unmap_for_device()?;
        if let Some(m) = &mut self.minibatch_labels {
            m.unmap_for_device()?;
        }
        if let Some(m) = &mut self.minibatch_targets {
            m.unmap_for_device()?;
        }

        let start = start_offset as i32;
        let count = count as i32;
        let launch = match (&self.labels, &mut self.minibatch_labels) {
            (Some(labels), Some(minibatch_labels)) => unsafe {
                self.func_data.clone().launch(
                    self.cfg_data,
                    (
                        &self.samples.dev,
                        &mut self.minibatch_data.dev,
                        start,
                        count,
                        &labels.dev,
                        &mut minibatch_labels.dev,
                        &self.permutation.dev,
                        &mut self.minibatch_indices.dev,
                    ),
                )
            },
            _ => unsafe {
                self.func_data.clone().launch(
                    self.cfg_data,
                    (
                        &self.samples.dev,
                        &mut self.minibatch_data.dev,
                        start,
                        count,
                        &self.permutation.dev,
                        &mut self.minibatch_indices.dev,
                    ),
                )
            },
        };
        launch.map_err(|e| Error::backend(format!("fill dispatch failed: {e}")))?;

        if let (Some(func), Some(targets), Some(minibatch_targets)) = (
            &self.func_target,
            &self.targets,
            &mut self.minibatch_targets,
        ) {
            unsafe {
                func.clone().launch(
                    self.cfg_target,
                    (
                        &targets.dev,
                        &mut minibatch_targets.dev,
                        start,
                        count,
                        &self.permutation.dev,
                    ),
                )
            }
            .map_err(|e| Error::backend(format!("target fill dispatch failed: {e}")))?;
        }

        self.ctx
            .synchronize()
            .map_err(|e| Error::backend(format!("device synchronize failed: {e}")))?;

        self.minibatch_data.mark_device_dirty();
        self.minibatch_indices.mark_device_dirty();
        if let Some(m) = &mut self.minibatch_labels {
            m.mark_device_dirty();
        }
        if let Some(m) = &mut self.minibatch_targets {
            m.mark_device_dirty();
        }
        Ok(())
    }

    /// Map the minibatch data window for host access.
    pub fn minibatch_data(&mut self) -> Result<&[T]> {
        self.minibatch_data.map_for_host()
    }

    /// Map the minibatch label window for host access.
    pub fn minibatch_labels(&mut self) -> Result<Option<&[LabelCode]>> {
        match &mut self.minibatch_labels {
            Some(m) => m.map_for_host().map(Some),
            None => Ok(None),
        }
    }

    /// Map the minibatch target window for host access.
    pub fn minibatch_targets(&mut self) -> Result<Option<&[T]>> {
        match &mut self.minibatch_targets {
            Some(m) => m.map_for_host().map(Some),
            None => Ok(None),
        }
    }

    /// Map the minibatch index window for host access.
    pub fn minibatch_indices(&mut self) -> Result<&[PermIndex]> {
        self.minibatch_indices.map_for_host()
    }
}
