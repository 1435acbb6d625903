//! Checked heap model
//!
//! This module provides an address-based heap that behaves like a C allocator
//! watched by a memory checker:
//! - Explicit allocation/release (`malloc`/`free`) with a byte limit
//! - Tombstones for released blocks, so later accesses are classified as
//!   use-after-release instead of unknown addresses
//! - Per-byte initialization tracking
//! - Redzones between blocks so a write just past one block never lands in
//!   the next
//!
//! Every rejected operation returns a [`MemoryError`] and is also recorded as
//! a [`Diagnostic`]. [`Heap::render_summary`] prints the recorded diagnostics,
//! heap usage and leaks in memcheck's text layout.

use super::value::Address;
use crate::constants::{DEFAULT_HEAP_LIMIT, HEAP_ADDRESS_START, SUMMARY_PID};
use crate::errors::MemoryError;
use log::{debug, warn};
use rustc_hash::FxHashMap;
use std::fmt::Write as _;

/// Unaddressable gap left after every block
const REDZONE: u64 = 16;

/// State of a heap block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Allocated,
    Written,
    Released, // Tombstone, kept to classify later accesses
}

/// A block of heap memory
#[derive(Debug, Clone)]
pub struct HeapBlock {
    pub data: Vec<u8>,
    pub size: usize,
    pub state: BlockState,
    pub init_map: Vec<bool>, // Per-byte initialization tracking
}

impl HeapBlock {
    /// Zeroed block of `size` bytes, `None` when the host cannot provide it
    pub fn try_new(size: usize) -> Option<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(size).ok()?;
        data.resize(size, 0);
        let mut init_map = Vec::new();
        init_map.try_reserve_exact(size).ok()?;
        init_map.resize(size, false);

        Some(HeapBlock {
            data,
            size,
            state: BlockState::Allocated,
            init_map,
        })
    }

    pub fn is_live(&self) -> bool {
        self.state != BlockState::Released
    }

    /// Check if a byte range is initialized
    pub fn is_initialized(&self, offset: usize, size: usize) -> bool {
        match offset.checked_add(size) {
            Some(end) if end <= self.size => self.init_map[offset..end].iter().all(|&b| b),
            _ => false,
        }
    }

    fn store(&mut self, offset: usize, bytes: &[u8]) {
        let end = offset + bytes.len();
        self.data[offset..end].copy_from_slice(bytes);
        self.init_map[offset..end].iter_mut().for_each(|b| *b = true);
        self.state = BlockState::Written;
    }
}

/// A rejected operation, recorded for the end-of-run summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// First line, e.g. `Invalid write of size 4`
    pub headline: String,
    /// Operation that was rejected
    pub operation: String,
    /// Address the operation targeted, when there is one
    pub address: Option<Address>,
    /// Optional detail line describing the address
    pub detail: Option<String>,
}

/// Counters over the lifetime of a heap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub allocations: u64,
    pub releases: u64,
    pub bytes_allocated: u64,
    pub live_blocks: usize,
    pub live_bytes: usize,
}

impl HeapStats {
    /// Every allocation was released exactly once
    pub fn is_balanced(&self) -> bool {
        self.allocations == self.releases && self.live_blocks == 0
    }
}

/// The heap
#[derive(Debug, Clone)]
pub struct Heap {
    allocations: FxHashMap<Address, HeapBlock>,
    next_address: Address,
    live_bytes: usize,
    max_heap_size: usize,
    stats: HeapStats,
    diagnostics: Vec<Diagnostic>,
}

impl Heap {
    /// Create a new heap with a maximum size limit
    pub fn new(max_heap_size: usize) -> Self {
        Heap {
            allocations: FxHashMap::default(),
            next_address: HEAP_ADDRESS_START,
            live_bytes: 0,
            max_heap_size,
            stats: HeapStats::default(),
            diagnostics: Vec::new(),
        }
    }

    /// Allocate a block of memory
    pub fn allocate(&mut self, size: usize) -> Result<Address, MemoryError> {
        if size == 0 {
            return Err(self.reject(
                Diagnostic {
                    headline: "Argument 'size' of function malloc has a fishy value".to_string(),
                    operation: "Heap::allocate".to_string(),
                    address: None,
                    detail: None,
                },
                MemoryError::InvalidCapacity { capacity: size },
            ));
        }

        if self.live_bytes.saturating_add(size) > self.max_heap_size {
            let detail = format!(
                "{} bytes in use, limit is {}",
                self.live_bytes, self.max_heap_size
            );
            return Err(self.allocation_failure(size, detail));
        }

        let addr = self.next_address;
        let next = round_up(size as u64)
            .and_then(|span| span.checked_add(REDZONE))
            .and_then(|span| addr.checked_add(span));
        let Some(next) = next else {
            let detail = format!("address space exhausted at 0x{:x}", addr);
            return Err(self.allocation_failure(size, detail));
        };
        let Some(block) = HeapBlock::try_new(size) else {
            let detail = format!("host could not provide {} bytes", size);
            return Err(self.allocation_failure(size, detail));
        };

        self.next_address = next;
        self.allocations.insert(addr, block);
        self.live_bytes += size;
        self.stats.allocations += 1;
        self.stats.bytes_allocated += size as u64;
        debug!("allocated {} bytes at 0x{:x}", size, addr);

        Ok(addr)
    }

    /// Release a block of memory (mark as tombstone)
    pub fn free(&mut self, addr: Address) -> Result<(), MemoryError> {
        let size = match self.allocations.get(&addr).map(|b| (b.is_live(), b.size)) {
            Some((true, size)) => size,
            Some((false, size)) => {
                return Err(self.reject(
                    Diagnostic {
                        headline: "Invalid free() / delete / delete[] / realloc()".to_string(),
                        operation: "Heap::free".to_string(),
                        address: Some(addr),
                        detail: Some(format!(
                            "Address 0x{:x} is 0 bytes inside a block of size {} free'd",
                            addr, size
                        )),
                    },
                    MemoryError::DoubleRelease { address: addr },
                ));
            }
            None => {
                return Err(self.reject(
                    Diagnostic {
                        headline: "Invalid free() / delete / delete[] / realloc()".to_string(),
                        operation: "Heap::free".to_string(),
                        address: Some(addr),
                        detail: Some(format!(
                            "Address 0x{:x} is not the start of any allocated block",
                            addr
                        )),
                    },
                    MemoryError::InvalidRelease { address: addr },
                ));
            }
        };

        if let Some(block) = self.allocations.get_mut(&addr) {
            block.state = BlockState::Released;
        }
        self.live_bytes -= size;
        self.stats.releases += 1;
        debug!("released {} bytes at 0x{:x}", size, addr);
        Ok(())
    }

    /// Get a heap block (returns error if tombstone or doesn't exist)
    pub fn get_block(&self, addr: Address) -> Result<&HeapBlock, MemoryError> {
        match self.allocations.get(&addr) {
            Some(block) if block.is_live() => Ok(block),
            Some(_) => Err(MemoryError::UseAfterRelease { address: addr }),
            None => Err(MemoryError::InvalidAddress { address: addr }),
        }
    }

    /// Copy `text` plus a NUL terminator to the start of the block at `addr`
    pub fn write_cstr(&mut self, addr: Address, text: &str) -> Result<(), MemoryError> {
        let bytes = text.as_bytes();
        if let Some(offset) = bytes.iter().position(|&b| b == 0) {
            return Err(self.reject(
                Diagnostic {
                    headline: "Argument 'text' of function Heap::write_cstr has a fishy value"
                        .to_string(),
                    operation: "Heap::write_cstr".to_string(),
                    address: Some(addr),
                    detail: Some(format!("NUL byte at offset {} would truncate the copy", offset)),
                },
                MemoryError::InteriorNul { offset },
            ));
        }
        let required = bytes.len() + 1;

        let (state, capacity) = match self.allocations.get(&addr) {
            Some(block) => (block.state, block.size),
            None => {
                return Err(self.reject(
                    invalid_access("write", required, addr, "Heap::write_cstr", None),
                    MemoryError::InvalidAddress { address: addr },
                ));
            }
        };

        if state == BlockState::Released {
            let detail = format!(
                "Address 0x{:x} is 0 bytes inside a block of size {} free'd",
                addr, capacity
            );
            return Err(self.reject(
                invalid_access("write", required, addr, "Heap::write_cstr", Some(detail)),
                MemoryError::UseAfterRelease { address: addr },
            ));
        }

        if required > capacity {
            let overflow_at = addr + capacity as u64;
            let detail = format!(
                "Address 0x{:x} is 0 bytes after a block of size {} alloc'd",
                overflow_at, capacity
            );
            return Err(self.reject(
                invalid_access(
                    "write",
                    required - capacity,
                    overflow_at,
                    "Heap::write_cstr",
                    Some(detail),
                ),
                MemoryError::CapacityExceeded { required, capacity },
            ));
        }

        if let Some(block) = self.allocations.get_mut(&addr) {
            block.store(0, bytes);
            block.store(bytes.len(), &[0]);
        }
        Ok(())
    }

    /// Read the NUL-terminated string stored at the start of the block at `addr`
    pub fn read_cstr(&mut self, addr: Address) -> Result<Vec<u8>, MemoryError> {
        // First byte that is either unwritten or the terminator
        let scan = self.get_block(addr).map(|block| {
            let stop = block
                .data
                .iter()
                .zip(&block.init_map)
                .position(|(&b, &init)| !init || b == 0);
            (block.size, stop.map(|i| (i, block.init_map[i])))
        });

        match scan {
            Ok((_, Some((len, true)))) => {
                let block = self.get_block(addr)?;
                Ok(block.data[..len].to_vec())
            }
            Ok((capacity, Some((_, false)))) => Err(self.reject(
                Diagnostic {
                    headline: "Conditional jump or move depends on uninitialised value(s)"
                        .to_string(),
                    operation: "Heap::read_cstr".to_string(),
                    address: Some(addr),
                    detail: Some(format!(
                        "Uninitialised value was created by a heap allocation of size {}",
                        capacity
                    )),
                },
                MemoryError::UninitializedRead {
                    what: format!("heap block at 0x{:x}", addr),
                },
            )),
            Ok((capacity, None)) => {
                // No terminator inside the block: the scan would run off its end
                let past_end = addr + capacity as u64;
                Err(self.reject(
                    invalid_access("read", 1, past_end, "Heap::read_cstr", None),
                    MemoryError::InvalidAddress { address: past_end },
                ))
            }
            Err(err) => {
                let size = self.allocations.get(&addr).map_or(1, |b| b.size.max(1));
                Err(self.reject(
                    invalid_access("read", size, addr, "Heap::read_cstr", None),
                    err,
                ))
            }
        }
    }

    /// Write bytes at an arbitrary address inside a live block
    pub fn write_bytes_at(&mut self, addr: Address, bytes: &[u8]) -> Result<(), MemoryError> {
        let (block_addr, offset) = match self.locate(addr, bytes.len()) {
            Ok(found) => found,
            Err(err) => {
                return Err(self.reject(
                    invalid_access("write", bytes.len(), addr, "Heap::write_bytes_at", None),
                    err,
                ));
            }
        };
        if let Some(block) = self.allocations.get_mut(&block_addr) {
            block.store(offset, bytes);
        }
        Ok(())
    }

    /// Read initialized bytes at an arbitrary address inside a live block
    pub fn read_bytes_at(&mut self, addr: Address, size: usize) -> Result<Vec<u8>, MemoryError> {
        let (block_addr, offset) = match self.locate(addr, size) {
            Ok(found) => found,
            Err(err) => {
                return Err(self.reject(
                    invalid_access("read", size, addr, "Heap::read_bytes_at", None),
                    err,
                ));
            }
        };
        if !self.get_block(block_addr)?.is_initialized(offset, size) {
            return Err(self.reject(
                Diagnostic {
                    headline: format!("Use of uninitialised value of size {}", size),
                    operation: "Heap::read_bytes_at".to_string(),
                    address: Some(addr),
                    detail: None,
                },
                MemoryError::UninitializedRead {
                    what: format!("{} bytes at 0x{:x}", size, addr),
                },
            ));
        }
        let block = self.get_block(block_addr)?;
        Ok(block.data[offset..offset + size].to_vec())
    }

    /// Record a conditional that depended on an uninitialized value outside the heap
    pub fn record_uninitialized_use(&mut self, err: MemoryError) -> MemoryError {
        self.reject(
            Diagnostic {
                headline: "Conditional jump or move depends on uninitialised value(s)".to_string(),
                operation: "Slot::get".to_string(),
                address: None,
                detail: None,
            },
            err,
        )
    }

    /// Get all allocations (includes tombstones)
    pub fn allocations(&self) -> &FxHashMap<Address, HeapBlock> {
        &self.allocations
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            live_blocks: self.allocations.values().filter(|b| b.is_live()).count(),
            live_bytes: self.live_bytes,
            ..self.stats
        }
    }

    /// Live blocks as `(address, size)`, lowest address first
    pub fn leaks(&self) -> Vec<(Address, usize)> {
        let mut leaks: Vec<(Address, usize)> = self
            .allocations
            .iter()
            .filter(|(_, block)| block.is_live())
            .map(|(&addr, block)| (addr, block.size))
            .collect();
        leaks.sort_unstable();
        leaks
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Get max heap size
    pub fn max_size(&self) -> usize {
        self.max_heap_size
    }

    /// Render diagnostics, heap usage and leaks the way memcheck prints them
    pub fn render_summary(&self) -> String {
        let p = format!("=={}==", SUMMARY_PID);
        let mut out = String::new();

        for diag in &self.diagnostics {
            let _ = writeln!(out, "{} {}", p, diag.headline);
            match diag.address {
                Some(addr) => {
                    let _ = writeln!(out, "{}    at 0x{:X}: {}", p, addr, diag.operation);
                }
                None => {
                    let _ = writeln!(out, "{}    at {}", p, diag.operation);
                }
            }
            if let Some(detail) = &diag.detail {
                let _ = writeln!(out, "{}  {}", p, detail);
            }
            let _ = writeln!(out, "{} ", p);
        }

        let stats = self.stats();
        let leaks = self.leaks();
        let _ = writeln!(out, "{} HEAP SUMMARY:", p);
        let _ = writeln!(
            out,
            "{}     in use at exit: {} bytes in {} blocks",
            p, stats.live_bytes, stats.live_blocks
        );
        let _ = writeln!(
            out,
            "{}   total heap usage: {} allocs, {} frees, {} bytes allocated",
            p, stats.allocations, stats.releases, stats.bytes_allocated
        );
        let _ = writeln!(out, "{} ", p);

        if leaks.is_empty() {
            let _ = writeln!(out, "{} All heap blocks were freed -- no leaks are possible", p);
        } else {
            for (i, (addr, size)) in leaks.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{} {} bytes in 1 blocks are definitely lost in loss record {} of {}",
                    p,
                    size,
                    i + 1,
                    leaks.len()
                );
                let _ = writeln!(out, "{}    at 0x{:X}: Heap::allocate", p, addr);
                let _ = writeln!(out, "{} ", p);
            }
            let _ = writeln!(out, "{} LEAK SUMMARY:", p);
            let _ = writeln!(
                out,
                "{}    definitely lost: {} bytes in {} blocks",
                p, stats.live_bytes, stats.live_blocks
            );
            let _ = writeln!(out, "{}    indirectly lost: 0 bytes in 0 blocks", p);
            let _ = writeln!(out, "{}      possibly lost: 0 bytes in 0 blocks", p);
            let _ = writeln!(out, "{}    still reachable: 0 bytes in 0 blocks", p);
            let _ = writeln!(out, "{}         suppressed: 0 bytes in 0 blocks", p);
        }
        let _ = writeln!(out, "{} ", p);

        let contexts = self.diagnostics.len() + leaks.len();
        let _ = writeln!(
            out,
            "{} ERROR SUMMARY: {} errors from {} contexts (suppressed: 0 from 0)",
            p, contexts, contexts
        );
        out
    }

    /// Find the live block containing `[addr, addr + size)`
    fn locate(&self, addr: Address, size: usize) -> Result<(Address, usize), MemoryError> {
        let end = addr.saturating_add(size as u64);
        let (&block_addr, block) = self
            .allocations
            .iter()
            .find(|(&start, block)| addr >= start && addr < start + block.size as u64)
            .ok_or(MemoryError::InvalidAddress { address: addr })?;

        if !block.is_live() {
            return Err(MemoryError::UseAfterRelease { address: addr });
        }
        if end > block_addr + block.size as u64 {
            return Err(MemoryError::InvalidAddress { address: addr });
        }
        Ok((block_addr, (addr - block_addr) as usize))
    }

    fn allocation_failure(&mut self, size: usize, detail: String) -> MemoryError {
        self.reject(
            Diagnostic {
                headline: format!("Allocation of {} bytes failed", size),
                operation: "Heap::allocate".to_string(),
                address: None,
                detail: Some(detail),
            },
            MemoryError::AllocationFailure {
                requested: size,
                in_use: self.live_bytes,
                limit: self.max_heap_size,
            },
        )
    }

    fn reject(&mut self, diagnostic: Diagnostic, err: MemoryError) -> MemoryError {
        warn!("{}: {}", diagnostic.operation, err);
        self.diagnostics.push(diagnostic);
        err
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(DEFAULT_HEAP_LIMIT)
    }
}

fn round_up(size: u64) -> Option<u64> {
    size.div_ceil(REDZONE).checked_mul(REDZONE)
}

fn invalid_access(
    kind: &str,
    size: usize,
    addr: Address,
    operation: &str,
    detail: Option<String>,
) -> Diagnostic {
    Diagnostic {
        headline: format!("Invalid {} of size {}", kind, size),
        operation: operation.to_string(),
        address: Some(addr),
        detail,
    }
}
