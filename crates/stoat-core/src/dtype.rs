use std::fmt;

// DType — element types the loader can hold and the fill kernels can move.
//
//   F32 — the default working type for samples and targets
//   F64 — high-precision work (host + CUDA only; WGSL has no f64)
//   I32 — label codes and index-like payloads
//   U32 — permutation indices
//   U8  — raw image bytes (host + CUDA only)

/// Enum of all supported element data types.
///
/// Kernel programs are compiled per dtype: the names below are spliced into
/// the kernel source through the definition set, so the device-side element
/// type always matches the host buffer it mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F64,
    I32,
    U32,
    U8,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F64 => 8,
            DType::I32 => 4,
            DType::U32 => 4,
            DType::U8 => 1,
        }
    }

    /// The CUDA C type name for this dtype.
    pub fn cuda_name(&self) -> &'static str {
        match self {
            DType::F32 => "float",
            DType::F64 => "double",
            DType::I32 => "int",
            DType::U32 => "unsigned int",
            DType::U8 => "unsigned char",
        }
    }

    /// The WGSL type name for this dtype, if WGSL can express it.
    ///
    /// WGSL storage buffers only hold `f32`/`i32`/`u32`; asking the wgpu
    /// backend to bind an `F64` or `U8` dataset is a backend error.
    pub fn wgsl_name(&self) -> Option<&'static str> {
        match self {
            DType::F32 => Some("f32"),
            DType::I32 => Some("i32"),
            DType::U32 => Some("u32"),
            DType::F64 | DType::U8 => None,
        }
    }

    /// Whether this dtype is a floating-point type.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I32 => "i32",
            DType::U32 => "u32",
            DType::U8 => "u8",
        };
        write!(f, "{}", s)
    }
}

// Element — the bridge between Rust scalar types and the DType enum.
//
// Buffers cross the host/device boundary as raw bytes (`bytemuck::Pod`),
// which keeps the device mirrors free of per-type copy entry points: one
// byte-level upload/download pair serves every dtype, and the kernel
// reinterprets the bytes through the dtype name in its definition set.

/// Trait implemented by Rust scalar types that can live in loader buffers.
pub trait Element:
    Copy + Default + PartialOrd + Send + Sync + fmt::Debug + bytemuck::Pod + 'static
{
    /// The corresponding DType enum variant.
    const DTYPE: DType;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;
}

impl Element for i32 {
    const DTYPE: DType = DType::I32;
}

impl Element for u32 {
    const DTYPE: DType = DType::U32;
}

impl Element for u8 {
    const DTYPE: DType = DType::U8;
}

/// The dense integer code type produced by label mapping.
pub type LabelCode = i32;

/// The index type of the partition permutation.
pub type PermIndex = u32;
