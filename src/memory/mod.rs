//! Memory model
//!
//! This module provides the core memory abstractions:
//! - [`heap`]: Checked, address-based heap with tombstones and diagnostics
//! - [`buffer`]: Owning buffer handle released at scope exit
//! - [`value`]: Addresses and scalars that reject reads before assignment
//! - [`sequence`]: Fixed-length container with checked indexing
//!
//! # Buffer lifecycle
//!
//! ```text
//! acquire → write → emit → release
//! ```
//!
//! On the checked [`heap::Heap`] every step takes an address, so the invalid
//! transitions of C code (write after free, free twice, copy past capacity,
//! print before write) can be expressed and are rejected with a
//! [`MemoryError`](crate::errors::MemoryError). On [`buffer::Buffer`] the
//! release steps cannot be expressed wrongly at all.

pub mod buffer;
pub mod heap;
pub mod sequence;
pub mod value;

pub use buffer::{Allocator, Buffer};
pub use heap::{BlockState, Diagnostic, Heap, HeapStats};
pub use sequence::Sequence;
pub use value::{Address, Slot};
