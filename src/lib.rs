//! # Introduction
//!
//! leakless walks short-lived string buffers through their whole lifecycle
//! and shows the classic C memory errors being ruled out: overflow through an
//! undersized allocation, leaks, use after free, double free, out-of-bounds
//! indexing and reads of uninitialized values.
//!
//! ## Buffer lifecycle
//!
//! ```text
//! acquire → write → emit → release
//! ```
//!
//! 1. [`memory`]: a checked, address-based
//!    [`memory::heap::Heap`] that rejects every invalid transition, and the
//!    owning [`memory::buffer::Buffer`] handle on top of it where leaks and
//!    double releases cannot be written at all.
//! 2. [`demo`]: the corrected program, plus the buggy programs replayed on
//!    the checked heap.
//! 3. [`report`]: categorizes memcheck output (including the heap's own
//!    rendered summary), filters it and compares two runs.
//! 4. [`errors`]: the [`errors::MemoryError`] taxonomy shared by all of the
//!    above.
//!
//! ## Example
//!
//! ```
//! use leakless::memory::Allocator;
//!
//! let alloc = Allocator::default();
//! let mut buf = alloc.acquire(20).unwrap();
//! buf.write("Hello, Valgrind!").unwrap();
//!
//! let mut out = Vec::new();
//! buf.emit(&mut out).unwrap();
//! buf.release().unwrap();
//!
//! assert_eq!(out, b"Hello, Valgrind!\n");
//! assert!(alloc.stats().is_balanced());
//! ```

pub mod constants;
pub mod demo;
pub mod errors;
pub mod memory;
pub mod report;
