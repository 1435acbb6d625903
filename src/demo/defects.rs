//! Defective programs replayed on the checked heap
//!
//! Each [`Defect`] isolates one classic memory error and shows the checked
//! model rejecting it. [`replay_older_version`] and [`replay_test_program`]
//! run the complete buggy programs, carrying on past each rejected operation
//! the way a program under a memory checker does, and return the heap so its
//! diagnostics and leaks can be inspected or rendered.

use super::corrected::{GREETING, GREETING_CAPACITY, MESSAGE};
use crate::errors::MemoryError;
use crate::memory::heap::Heap;
use crate::memory::sequence::Sequence;
use crate::memory::value::Slot;
use log::info;
use std::io::Write;

/// One isolated memory error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Defect {
    /// `malloc(10)` then `strcpy` of an 11-byte string
    UndersizedCopy,
    /// Allocation never freed
    Leak,
    /// `arr[5] = 10` on a 5-element array
    OutOfBounds,
    /// Write through a pointer after `free`
    UseAfterRelease,
    /// `free` called twice on the same pointer
    DoubleRelease,
    /// Branch on a local that was never assigned
    UninitializedRead,
}

/// What happened when a defect was replayed
#[derive(Debug)]
pub struct DefectOutcome {
    pub defect: Defect,
    /// The rejected operation; leaks are not rejected, only reported
    pub rejected: Option<MemoryError>,
    pub heap: Heap,
}

impl Defect {
    pub const ALL: [Defect; 6] = [
        Defect::UndersizedCopy,
        Defect::Leak,
        Defect::OutOfBounds,
        Defect::UseAfterRelease,
        Defect::DoubleRelease,
        Defect::UninitializedRead,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Defect::UndersizedCopy => "undersized copy",
            Defect::Leak => "leak",
            Defect::OutOfBounds => "out-of-bounds write",
            Defect::UseAfterRelease => "use after release",
            Defect::DoubleRelease => "double release",
            Defect::UninitializedRead => "uninitialized read",
        }
    }

    pub fn run(self) -> Result<DefectOutcome, MemoryError> {
        let mut heap = Heap::default();
        let rejected = match self {
            Defect::UndersizedCopy => {
                let buffer = heap.allocate(10)?;
                let result = heap.write_cstr(buffer, MESSAGE);
                heap.free(buffer)?;
                result.err()
            }
            Defect::Leak => {
                let leak = heap.allocate(4)?;
                heap.write_bytes_at(leak, &42i32.to_le_bytes())?;
                None
            }
            Defect::OutOfBounds => {
                let mut arr = Sequence::filled(5, 0i32);
                arr.set(5, 10).err()
            }
            Defect::UseAfterRelease => {
                let ptr = heap.allocate(4)?;
                heap.free(ptr)?;
                heap.write_bytes_at(ptr, &5i32.to_le_bytes()).err()
            }
            Defect::DoubleRelease => {
                let ptr = heap.allocate(4)?;
                heap.free(ptr)?;
                heap.free(ptr).err()
            }
            Defect::UninitializedRead => {
                let uninit: Slot<i32> = Slot::declare("uninit");
                uninit
                    .get()
                    .map(|v| v > 0)
                    .err()
                    .map(|e| heap.record_uninitialized_use(e))
            }
        };

        if let Some(err) = &rejected {
            info!("{}: rejected {} ({})", self.name(), err.kind(), err);
        }
        Ok(DefectOutcome {
            defect: self,
            rejected,
            heap,
        })
    }
}

/// The first buggy program: both buffers leak and the message buffer is too small
pub fn replay_older_version<W: Write>(out: &mut W) -> Result<Heap, MemoryError> {
    let mut heap = Heap::default();

    let dynamic = heap.allocate(GREETING_CAPACITY)?;
    heap.write_cstr(dynamic, GREETING)?;
    write_line(out, &heap.read_cstr(dynamic)?)?;

    let buffer = heap.allocate(10)?;
    let _ = heap.write_cstr(buffer, MESSAGE);
    // The rejected copy left the buffer unwritten, so this read is rejected too
    if let Ok(bytes) = heap.read_cstr(buffer) {
        write_line(out, &bytes)?;
    }

    Ok(heap)
}

/// The second buggy program: a leak, an out-of-bounds write, a write after
/// free and a branch on an uninitialized local
pub fn replay_test_program() -> Result<Heap, MemoryError> {
    let mut heap = Heap::default();

    let leak = heap.allocate(4)?;
    heap.write_bytes_at(leak, &42i32.to_le_bytes())?;

    let arr = heap.allocate(5 * 4)?;
    let _ = heap.write_bytes_at(arr + 5 * 4, &10i32.to_le_bytes());
    heap.free(arr)?;

    let ptr = heap.allocate(4)?;
    heap.free(ptr)?;
    let _ = heap.write_bytes_at(ptr, &5i32.to_le_bytes());

    let uninit: Slot<i32> = Slot::declare("uninit");
    if let Err(e) = uninit.get() {
        heap.record_uninitialized_use(e);
    }

    Ok(heap)
}

fn write_line<W: Write>(out: &mut W, bytes: &[u8]) -> Result<(), MemoryError> {
    out.write_all(bytes)?;
    out.write_all(b"\n")?;
    Ok(())
}
