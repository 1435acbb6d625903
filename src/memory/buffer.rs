//! Owning buffer handle
//!
//! [`Allocator`] hands out [`Buffer`]s backed by a shared [`Heap`]. A buffer is
//! the only handle to its block: it cannot be copied, [`Buffer::release`]
//! consumes it, and dropping it releases the block. Leaks, double releases
//! and use-after-release therefore cannot be written against this API; the
//! checked heap underneath still rejects overlong copies and reads of unwritten
//! memory.
//!
//! The heap is shared through `Rc<RefCell<_>>`, so buffers stay on the thread
//! that created them.

use super::heap::{Heap, HeapStats};
use super::value::Address;
use crate::errors::MemoryError;
use log::{debug, warn};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

/// Hands out buffers from one heap
#[derive(Debug, Clone, Default)]
pub struct Allocator {
    heap: Rc<RefCell<Heap>>,
}

impl Allocator {
    pub fn new(heap: Heap) -> Self {
        Allocator {
            heap: Rc::new(RefCell::new(heap)),
        }
    }

    /// Reserve a buffer of exactly `capacity` bytes
    pub fn acquire(&self, capacity: usize) -> Result<Buffer, MemoryError> {
        let address = self.heap.borrow_mut().allocate(capacity)?;
        Ok(Buffer {
            address,
            capacity,
            len: None,
            released: false,
            heap: Rc::clone(&self.heap),
        })
    }

    pub fn stats(&self) -> HeapStats {
        self.heap.borrow().stats()
    }

    /// Memcheck-style summary of everything this allocator has seen
    pub fn render_summary(&self) -> String {
        self.heap.borrow().render_summary()
    }
}

/// A heap buffer holding at most `capacity - 1` bytes of text plus a terminator
#[derive(Debug)]
pub struct Buffer {
    address: Address,
    capacity: usize,
    len: Option<usize>,
    released: bool,
    heap: Rc<RefCell<Heap>>,
}

impl Buffer {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Length of the stored text, `None` until the first successful write
    pub fn text_len(&self) -> Option<usize> {
        self.len
    }

    /// Copy `text` and its terminator in, rejecting text that does not fit
    pub fn write(&mut self, text: &str) -> Result<(), MemoryError> {
        self.heap.borrow_mut().write_cstr(self.address, text)?;
        self.len = Some(text.len());
        Ok(())
    }

    /// Bounded copy: store as much of `text` as fits, cut at a char boundary.
    /// Returns the number of bytes stored.
    pub fn write_truncating(&mut self, text: &str) -> Result<usize, MemoryError> {
        let mut end = text.len().min(self.capacity - 1);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if end < text.len() {
            debug!(
                "truncating {} bytes of text to {} for buffer at 0x{:x}",
                text.len(),
                end,
                self.address
            );
        }
        self.write(&text[..end])?;
        Ok(end)
    }

    /// Write the stored text and a newline to `out`
    pub fn emit<W: Write>(&self, out: &mut W) -> Result<(), MemoryError> {
        let bytes = self.heap.borrow_mut().read_cstr(self.address)?;
        out.write_all(&bytes)?;
        out.write_all(b"\n")?;
        Ok(())
    }

    /// Return the block to the heap. Consumes the handle.
    pub fn release(mut self) -> Result<(), MemoryError> {
        self.free()
    }

    fn free(&mut self) -> Result<(), MemoryError> {
        self.len = None;
        self.released = true;
        self.heap.borrow_mut().free(self.address)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.free() {
                warn!("failed to release buffer at 0x{:x}: {}", self.address, e);
            }
        }
    }
}
