//! # stoat-core
//!
//! Element types and shared error types for the stoat data loader.
//!
//! This crate provides:
//! - [`DType`] — runtime tags for the supported element types
//! - [`Element`] — bridge trait from Rust scalars to [`DType`]
//! - [`Error`] / [`Result`] — the one error type used across the workspace

pub mod dtype;
pub mod error;
pub mod kernel;

pub use dtype::{DType, Element, LabelCode, PermIndex};
pub use error::{Error, Result};
pub use kernel::FillDefs;
