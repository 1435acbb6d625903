//! Error types for the memory model
//!
//! This module defines [`MemoryError`], the single taxonomy shared by the
//! checked heap, the owning [`Buffer`](crate::memory::buffer::Buffer) handle,
//! [`Slot`](crate::memory::value::Slot) and
//! [`Sequence`](crate::memory::sequence::Sequence).
//!
//! Every variant is a rejected operation: nothing is written, read or freed
//! when one of these is returned.

use crate::memory::value::Address;
use thiserror::Error;

/// Errors raised by memory operations
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The allocator cannot satisfy the request within its limit
    #[error("allocation failed: requested {requested} bytes, {in_use} already in use, limit is {limit}")]
    AllocationFailure {
        requested: usize,
        in_use: usize,
        limit: usize,
    },

    /// Zero-sized allocation request
    #[error("invalid capacity: {capacity} (must be positive)")]
    InvalidCapacity { capacity: usize },

    /// A copy would not fit in the destination (terminator included)
    #[error("capacity exceeded: {required} bytes required, buffer holds {capacity}")]
    CapacityExceeded { required: usize, capacity: usize },

    /// Text with a NUL byte before its end cannot be stored as a C string
    #[error("text contains an interior NUL byte at offset {offset}")]
    InteriorNul { offset: usize },

    /// Access to a block after it was released
    #[error("use after release: address 0x{address:x} has been freed")]
    UseAfterRelease { address: Address },

    /// Second release of the same block
    #[error("double release at address 0x{address:x}")]
    DoubleRelease { address: Address },

    /// Release of an address that was never allocated
    #[error("invalid release: address 0x{address:x} was never allocated")]
    InvalidRelease { address: Address },

    /// Access to an address that was never allocated
    #[error("invalid address: 0x{address:x} is not in any allocated block")]
    InvalidAddress { address: Address },

    /// Read of a value that was never written
    #[error("read from uninitialized {what}")]
    UninitializedRead { what: String },

    /// Indexed access outside a sequence
    #[error("index {index} out of bounds for length {len}")]
    OutOfBoundsAccess { index: usize, len: usize },

    /// Writing to the output sink failed
    #[error("output failed: {0}")]
    Output(#[from] std::io::Error),
}

impl MemoryError {
    /// Short taxonomy name, as used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            MemoryError::AllocationFailure { .. } => "AllocationFailure",
            MemoryError::InvalidCapacity { .. } => "InvalidCapacity",
            MemoryError::CapacityExceeded { .. } => "CapacityExceeded",
            MemoryError::InteriorNul { .. } => "InteriorNul",
            MemoryError::UseAfterRelease { .. } => "UseAfterRelease",
            MemoryError::DoubleRelease { .. } => "DoubleRelease",
            MemoryError::InvalidRelease { .. } => "InvalidRelease",
            MemoryError::InvalidAddress { .. } => "InvalidAddress",
            MemoryError::UninitializedRead { .. } => "UninitializedRead",
            MemoryError::OutOfBoundsAccess { .. } => "OutOfBoundsAccess",
            MemoryError::Output(_) => "Output",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_use_hex_addresses() {
        let err = MemoryError::UseAfterRelease {
            address: 0x1000_0000,
        };
        assert_eq!(
            err.to_string(),
            "use after release: address 0x10000000 has been freed"
        );
        assert_eq!(err.kind(), "UseAfterRelease");
    }

    #[test]
    fn test_capacity_message() {
        let err = MemoryError::CapacityExceeded {
            required: 11,
            capacity: 10,
        };
        assert_eq!(
            err.to_string(),
            "capacity exceeded: 11 bytes required, buffer holds 10"
        );
    }
}
