// wgpu backend — accelerator flavor A for the stoat data loader
//
// The dataset is made resident in storage buffers once, at bind time; the
// fill kernels then gather minibatch rows entirely on device. Dispatch
// geometry is 2-D: one work item per (row, column) of the minibatch window.
//
// Host-visible staging follows a strict map/unmap discipline: a buffer is
// device-visible before any dispatch touches it, and mapped back lazily on
// the next host access. Violating that ordering is a correctness bug, so
// the states are tracked explicitly in `Mirror`.

pub mod kernels;

use std::borrow::Cow;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use stoat_core::{Element, Error, FillDefs, LabelCode, PermIndex, Result};

// WgpuDevice — instance, adapter, device, queue

/// A wgpu execution context for the loader.
pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_info: wgpu::AdapterInfo,
}

impl WgpuDevice {
    /// Acquire the highest-performance adapter available.
    ///
    /// Fails with a backend error when no adapter exists (headless CI
    /// machines without a GPU or software rasterizer).
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or_else(|| Error::backend("no wgpu adapter available"))?;

        let (device, queue) = pollster::block_on(
            adapter.request_device(&wgpu::DeviceDescriptor::default(), None),
        )
        .map_err(|e| Error::backend(format!("wgpu device creation failed: {e}")))?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info: adapter.get_info(),
        })
    }

    /// A human-readable adapter description, e.g. `"NVIDIA ... (Vulkan)"`.
    pub fn adapter_info(&self) -> String {
        format!("{} ({:?})", self.adapter_info.name, self.adapter_info.backend)
    }
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WgpuDevice({})", self.adapter_info())
    }
}

// Mirror — a host buffer with a device-resident twin

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    /// Host and device hold the same bytes.
    Synced,
    /// The host copy has been written since the last upload.
    HostAhead,
    /// A kernel has written the device copy since the last readback.
    DeviceAhead,
}

/// A host vector mirrored into a storage buffer, with explicit map/unmap
/// state. `unmap_for_device` must run before any dispatch that reads or
/// writes the buffer; `map_for_host` reads the device copy back on demand.
struct Mirror<T: Element> {
    host: Vec<T>,
    buffer: wgpu::Buffer,
    state: SyncState,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl<T: Element> Mirror<T> {
    fn new(dev: &WgpuDevice, host: Vec<T>, label: &str) -> Self {
        let buffer = dev
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&host),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
            });
        Self {
            host,
            buffer,
            state: SyncState::Synced,
            device: dev.device.clone(),
            queue: dev.queue.clone(),
        }
    }

    /// Overwrite the host copy; the device copy is stale until `unmap_for_device`.
    fn write(&mut self, data: &[T]) {
        self.host.copy_from_slice(data);
        self.state = SyncState::HostAhead;
    }

    /// Make the buffer device-visible: flush a pending host write.
    fn unmap_for_device(&mut self) {
        if self.state == SyncState::HostAhead {
            self.queue
                .write_buffer(&self.buffer, 0, bytemuck::cast_slice(&self.host));
            self.state = SyncState::Synced;
        }
    }

    /// Record that a dispatch has written the device copy.
    fn mark_device_dirty(&mut self) {
        self.state = SyncState::DeviceAhead;
    }

    /// Make the buffer host-visible: read the device copy back if a kernel
    /// wrote it since the last readback.
    fn map_for_host(&mut self) -> Result<&[T]> {
        if self.state == SyncState::DeviceAhead {
            let size = (self.host.len() * std::mem::size_of::<T>()) as u64;
            let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("stoat staging"),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
            encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, size);
            self.queue.submit(Some(encoder.finish()));

            let slice = staging.slice(..);
            let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
            slice.map_async(wgpu::MapMode::Read, move |r| {
                let _ = tx.send(r);
            });
            self.device.poll(wgpu::Maintain::Wait);
            match pollster::block_on(rx.receive()) {
                Some(Ok(())) => {}
                other => {
                    return Err(Error::backend(format!("buffer readback failed: {other:?}")))
                }
            }
            let data = slice.get_mapped_range();
            self.host.copy_from_slice(bytemuck::cast_slice(&data));
            drop(data);
            staging.unmap();
            self.state = SyncState::Synced;
        }
        Ok(&self.host)
    }
}

// Resident — an upload-once storage buffer (no host twin)

/// A dataset array made resident on device at bind time. The store keeps
/// the authoritative host copy, so no second host allocation is held here.
struct Resident {
    buffer: wgpu::Buffer,
}

impl Resident {
    fn new<T: Element>(dev: &WgpuDevice, data: &[T], label: &str) -> Self {
        let buffer = dev
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            });
        Self { buffer }
    }
}

// LoaderBinding — compiled kernels + bound buffers + dispatch geometry

/// The loader's bound wgpu state: the resident dataset, the compiled fill
/// pipelines, their bind groups, and the 2-D dispatch geometry. Dropping
/// the binding releases every device resource it owns.
pub struct LoaderBinding<T: Element> {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,

    data_pipeline: wgpu::ComputePipeline,
    data_bind_group: wgpu::BindGroup,
    data_groups: (u32, u32),

    target_pipeline: Option<wgpu::ComputePipeline>,
    target_bind_group: Option<wgpu::BindGroup>,
    target_groups: (u32, u32),

    params: wgpu::Buffer,
    permutation: Mirror<PermIndex>,
    minibatch_data: Mirror<T>,
    minibatch_labels: Option<Mirror<LabelCode>>,
    minibatch_targets: Option<Mirror<T>>,
    minibatch_indices: Mirror<PermIndex>,

    // Keep the dataset buffers alive for the binding's lifetime.
    _samples: Resident,
    _labels: Option<Resident>,
    _targets: Option<Resident>,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl<T: Element> LoaderBinding<T> {
    /// Mirror the dataset into device memory, compile the kernel program
    /// for the definition set, bind both entry points, and compute the
    /// dispatch geometry.
    pub fn bind(
        dev: &WgpuDevice,
        defs: &FillDefs,
        samples: &[T],
        labels: Option<&[LabelCode]>,
        targets: Option<&[T]>,
        permutation: &[PermIndex],
    ) -> Result<Self> {
        debug_assert_eq!(defs.labels, labels.is_some());
        debug_assert_eq!(defs.target_size.is_some(), targets.is_some());

        let source = kernels::loader_source(defs)?;
        dev.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = dev
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(FillDefs::KERNEL_FAMILY),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
            });
        if let Some(e) = pollster::block_on(dev.device.pop_error_scope()) {
            return Err(Error::backend(format!("WGSL compilation failed: {e}")));
        }

        let samples_res = Resident::new(dev, samples, "stoat samples");
        let labels_res = labels.map(|l| Resident::new(dev, l, "stoat labels"));
        let targets_res = targets.map(|t| Resident::new(dev, t, "stoat targets"));
        let permutation = Mirror::new(dev, permutation.to_vec(), "stoat permutation");

        let max = defs.max_minibatch_size;
        let minibatch_data = Mirror::new(dev, vec![T::default(); max * defs.sample_size], "stoat minibatch data");
        let minibatch_labels = defs
            .labels
            .then(|| Mirror::new(dev, vec![0; max], "stoat minibatch labels"));
        let minibatch_targets = defs
            .target_size
            .map(|ts| Mirror::new(dev, vec![T::default(); max * ts], "stoat minibatch targets"));
        let minibatch_indices = Mirror::new(dev, vec![0; max], "stoat minibatch indices");

        let params = dev
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("stoat fill params"),
                contents: bytemuck::cast_slice(&[0u32, 0u32]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        // Data pipeline: params, samples, minibatch data, permutation,
        // minibatch indices, and the label pair when present.
        let mut layout_entries = vec![
            uniform_entry(0),
            storage_entry(1, true),
            storage_entry(2, false),
            storage_entry(3, true),
            storage_entry(4, false),
        ];
        if defs.labels {
            layout_entries.push(storage_entry(5, true));
            layout_entries.push(storage_entry(6, false));
        }
        let data_layout = dev
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("stoat fill layout"),
                entries: &layout_entries,
            });

        let mut group_entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: params.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: samples_res.buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: minibatch_data.buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: permutation.buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: minibatch_indices.buffer.as_entire_binding(),
            },
        ];
        if let (Some(labels_res), Some(minibatch_labels)) = (&labels_res, &minibatch_labels) {
            group_entries.push(wgpu::BindGroupEntry {
                binding: 5,
                resource: labels_res.buffer.as_entire_binding(),
            });
            group_entries.push(wgpu::BindGroupEntry {
                binding: 6,
                resource: minibatch_labels.buffer.as_entire_binding(),
            });
        }
        let data_bind_group = dev.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("stoat fill bind group"),
            layout: &data_layout,
            entries: &group_entries,
        });

        dev.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let data_pipeline = dev
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(FillDefs::ENTRY_DATA),
                layout: Some(&dev.device.create_pipeline_layout(
                    &wgpu::PipelineLayoutDescriptor {
                        label: None,
                        bind_group_layouts: &[&data_layout],
                        push_constant_ranges: &[],
                    },
                )),
                module: &module,
                entry_point: FillDefs::ENTRY_DATA,
            });

        // Target pipeline: params, permutation, and the target pair.
        let (target_pipeline, target_bind_group) = if let (Some(_), Some(targets_res), Some(minibatch_targets)) =
            (defs.target_size, &targets_res, &minibatch_targets)
        {
            let target_layout =
                dev.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("stoat target fill layout"),
                        entries: &[
                            uniform_entry(0),
                            storage_entry(3, true),
                            storage_entry(7, true),
                            storage_entry(8, false),
                        ],
                    });
            let bind_group = dev.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("stoat target fill bind group"),
                layout: &target_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: permutation.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 7,
                        resource: targets_res.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 8,
                        resource: minibatch_targets.buffer.as_entire_binding(),
                    },
                ],
            });
            let pipeline = dev
                .device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(FillDefs::ENTRY_TARGET),
                    layout: Some(&dev.device.create_pipeline_layout(
                        &wgpu::PipelineLayoutDescriptor {
                            label: None,
                            bind_group_layouts: &[&target_layout],
                            push_constant_ranges: &[],
                        },
                    )),
                    module: &module,
                    entry_point: FillDefs::ENTRY_TARGET,
                });
            (Some(pipeline), Some(bind_group))
        } else {
            (None, None)
        };
        if let Some(e) = pollster::block_on(dev.device.pop_error_scope()) {
            return Err(Error::backend(format!("pipeline creation failed: {e}")));
        }

        log::debug!(
            "bound {} for {} samples of {} elements",
            FillDefs::KERNEL_FAMILY,
            samples.len() / defs.sample_size.max(1),
            defs.sample_size
        );

        Ok(Self {
            device: dev.device.clone(),
            queue: dev.queue.clone(),
            data_pipeline,
            data_bind_group,
            data_groups: kernels::workgroups(max, defs.sample_size),
            target_pipeline,
            target_bind_group,
            target_groups: kernels::workgroups(max, defs.target_size.unwrap_or(1)),
            params,
            permutation,
            minibatch_data,
            minibatch_labels,
            minibatch_targets,
            minibatch_indices,
            _samples: samples_res,
            _labels: labels_res,
            _targets: targets_res,
        })
    }

    /// Overwrite the device-resident permutation (after a resize or a
    /// train-range reshuffle).
    pub fn write_permutation(&mut self, permutation: &[PermIndex]) -> Result<()> {
        self.permutation.write(permutation);
        Ok(())
    }

    /// Latch the scalar constants and dispatch the fill kernels for the
    /// window `[start_offset, start_offset + count)`. Blocks until the
    /// device has finished; both pipelines run inside this one call.
    pub fn fill(&mut self, start_offset: usize, count: usize) -> Result<()> {
        self.queue.write_buffer(
            &self.params,
            0,
            bytemuck::cast_slice(&[start_offset as u32, count as u32]),
        );

        // Everything a kernel touches must be device-visible before dispatch.
        self.permutation.unmap_for_device();
        self.minibatch_data.unmap_for_device();
        self.minibatch_indices.unmap_for_device();
        if let Some(m) = &mut self.minibatch_labels {
            m.unmap_for_device();
        }
        if let Some(m) = &mut self.minibatch_targets {
            m.unmap_for_device();
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(FillDefs::KERNEL_FAMILY),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.data_pipeline);
            pass.set_bind_group(0, &self.data_bind_group, &[]);
            pass.dispatch_workgroups(self.data_groups.0, self.data_groups.1, 1);

            if let (Some(pipeline), Some(bind_group)) =
                (&self.target_pipeline, &self.target_bind_group)
            {
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.dispatch_workgroups(self.target_groups.0, self.target_groups.1, 1);
            }
        }
        self.queue.submit(Some(encoder.finish()));
        self.device.poll(wgpu::Maintain::Wait);
        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(Error::backend(format!("fill dispatch failed: {e}")));
        }

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
