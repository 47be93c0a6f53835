// Backend selection and bound state
//
// The execution target is picked once, at `initialize()`, and held as a
// tagged variant: the loader matches on the binding instead of dispatching
// through virtual overrides. Rebinding drops the previous variant first,
// which releases every device resource the old binding owned.

use std::fmt;

use stoat_core::Element;

/// The execution target for minibatch fill, chosen before initialization.
pub enum Device {
    /// No accelerator: `fill_indices` always reports that a host copy is
    /// still required and `fill_minibatch` performs it.
    Host,
    /// wgpu compute backend (2-D workgroup dispatch geometry).
    #[cfg(feature = "wgpu")]
    Wgpu(stoat_wgpu::WgpuDevice),
    /// CUDA backend via NVRTC-compiled kernels (1-D grid/block geometry).
    #[cfg(feature = "cuda")]
    Cuda(stoat_cuda::CudaContext),
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Host => write!(f, "Device::Host"),
            #[cfg(feature = "wgpu")]
            Device::Wgpu(dev) => write!(f, "Device::Wgpu({})", dev.adapter_info()),
            #[cfg(feature = "cuda")]
            Device::Cuda(ctx) => write!(f, "Device::Cuda({})", ctx.name()),
        }
    }
}

/// The loader's bound backend state. `Host` is the terminal state of a
/// host-only session; the accelerator variants carry the compiled kernels,
/// dispatch geometry, and device mirrors for the session.
pub(crate) enum Binding<T: Element> {
    Host(std::marker::PhantomData<T>),
    #[cfg(feature = "wgpu")]
    Wgpu(stoat_wgpu::LoaderBinding<T>),
    #[cfg(feature = "cuda")]
    Cuda(stoat_cuda::LoaderBinding<T>),
}

impl<T: Element> Binding<T> {
    pub(crate) fn host() -> Self {
        Binding::Host(std::marker::PhantomData)
    }

    pub(crate) fn is_host(&self) -> bool {
        matches!(self, Binding::Host(_))
    }
}

impl<T: Element> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Host(_) => write!(f, "Binding::Host"),
            #[cfg(feature = "wgpu")]
            Binding::Wgpu(_) => write!(f, "Binding::Wgpu"),
            #[cfg(feature = "cuda")]
            Binding::Cuda(_) => write!(f, "Binding::Cuda"),
        }
    }
}
