// Constants for the memory model

/// Starting address for heap allocations
/// Heap addresses start at 0x10000000 and are never reused
pub const HEAP_ADDRESS_START: u64 = 0x1000_0000;

/// Default heap limit in bytes (10 MB)
pub const DEFAULT_HEAP_LIMIT: usize = 10 * 1024 * 1024;

/// Process id printed in the `==PID==` prefix of rendered heap summaries
pub const SUMMARY_PID: u32 = 1;
