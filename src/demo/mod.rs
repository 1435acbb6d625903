//! Demonstration programs
//!
//! - [`corrected`]: the fixed program, built on the owning
//!   [`Buffer`](crate::memory::buffer::Buffer) handle
//! - [`defects`]: the buggy programs and isolated defects, replayed on the
//!   checked [`Heap`](crate::memory::heap::Heap) so each error is rejected

pub mod corrected;
pub mod defects;

pub use defects::{Defect, DefectOutcome};
