//! The corrected program
//!
//! Prints `Hello, Valgrind!` from a 20-byte buffer using a bounded copy, then
//! prints `Hi, there!` from a buffer sized to fit it. Every buffer is released
//! before the function returns, whichever path it takes.

use crate::errors::MemoryError;
use crate::memory::buffer::{Allocator, Buffer};
use log::error;
use std::io::Write;

pub const GREETING: &str = "Hello, Valgrind!";
pub const GREETING_CAPACITY: usize = 20;
pub const MESSAGE: &str = "Hi, there!";

/// Run both steps, writing one line per step to `out`
pub fn run<W: Write>(alloc: &Allocator, out: &mut W) -> Result<(), MemoryError> {
    greet(alloc, out)?;
    print_message(alloc, MESSAGE, out)
}

/// Bounded copy of the greeting into a fixed-size buffer
pub fn greet<W: Write>(alloc: &Allocator, out: &mut W) -> Result<(), MemoryError> {
    let Some(mut buf) = acquire_or_report(alloc, GREETING_CAPACITY)? else {
        return Ok(());
    };
    buf.write_truncating(GREETING)?;
    buf.emit(out)?;
    buf.release()
}

/// Copy `message` into a buffer of exactly `len + 1` bytes and print it
pub fn print_message<W: Write>(
    alloc: &Allocator,
    message: &str,
    out: &mut W,
) -> Result<(), MemoryError> {
    let Some(mut buf) = acquire_or_report(alloc, message.len() + 1)? else {
        return Ok(());
    };
    buf.write(message)?;
    buf.emit(out)?;
    buf.release()
}

/// Allocation failure is reported and the step skipped; other errors propagate
fn acquire_or_report(
    alloc: &Allocator,
    capacity: usize,
) -> Result<Option<Buffer>, MemoryError> {
    match alloc.acquire(capacity) {
        Ok(buf) => Ok(Some(buf)),
        Err(e @ MemoryError::AllocationFailure { .. }) => {
            error!("memory allocation failed: {}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
