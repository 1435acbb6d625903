// Integration tests for the buffer lifecycle

use leakless::demo::corrected;
use leakless::demo::defects::{self, Defect};
use leakless::errors::MemoryError;
use leakless::memory::{Allocator, Heap, Sequence, Slot};
use proptest::prelude::*;

#[test]
fn test_hello_valgrind() {
    let alloc = Allocator::default();
    let mut buf = alloc.acquire(20).expect("Acquire failed");
    buf.write("Hello, Valgrind!").expect("Write failed");

    let mut out = Vec::new();
    buf.emit(&mut out).expect("Emit failed");
    let result = buf.release();
    assert!(result.is_ok(), "Release failed: {:?}", result);

    assert_eq!(String::from_utf8(out).unwrap(), "Hello, Valgrind!\n");
    let stats = alloc.stats();
    assert_eq!(stats.allocations, 1);
    assert_eq!(stats.releases, 1);
}

#[test]
fn test_undersized_buffer_rejected() {
    let alloc = Allocator::default();
    let mut buf = alloc.acquire(10).expect("Acquire failed");
    let result = buf.write("Hi, there!");

    assert!(result.is_err(), "Expected capacity error");
    let error_msg = format!("{:?}", result.unwrap_err());
    assert!(
        error_msg.contains("CapacityExceeded"),
        "Error should be CapacityExceeded, got: {}",
        error_msg
    );
}

#[test]
fn test_corrected_program_output() {
    let alloc = Allocator::default();
    let mut out = Vec::new();
    let result = corrected::run(&alloc, &mut out);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "Hello, Valgrind!\nHi, there!\n"
    );
    assert!(alloc.stats().is_balanced());
    assert!(alloc
        .render_summary()
        .contains("All heap blocks were freed -- no leaks are possible"));
}

#[test]
fn test_buffers_dropped_on_error_path_are_released() {
    fn fails_midway(alloc: &Allocator) -> Result<(), MemoryError> {
        let mut first = alloc.acquire(8)?;
        first.write("short")?;
        let mut second = alloc.acquire(4)?;
        second.write("too long")?;
        Ok(())
    }

    let alloc = Allocator::default();
    assert!(fails_midway(&alloc).is_err());

    let stats = alloc.stats();
    assert_eq!(stats.allocations, 2);
    assert_eq!(stats.releases, 2);
    assert!(stats.is_balanced());
}

// === CHECKED HEAP TESTS ===

#[test]
fn test_heap_write_after_release() {
    let mut heap = Heap::default();
    let addr = heap.allocate(16).expect("Allocate failed");
    heap.free(addr).expect("Free failed");

    let result = heap.write_cstr(addr, "again");
    assert!(
        matches!(result, Err(MemoryError::UseAfterRelease { address }) if address == addr),
        "Expected UseAfterRelease, got: {:?}",
        result
    );
}

#[test]
fn test_heap_double_release() {
    let mut heap = Heap::default();
    let addr = heap.allocate(16).expect("Allocate failed");
    heap.free(addr).expect("Free failed");

    let result = heap.free(addr);
    assert!(result.is_err(), "Expected double-release error");
    let error_msg = result.unwrap_err().to_string();
    assert!(
        error_msg.contains("double release"),
        "Error message should mention double release, got: {}",
        error_msg
    );
    assert_eq!(heap.stats().releases, 1);
}

#[test]
fn test_heap_limit() {
    let mut heap = Heap::new(64);
    let result = heap.allocate(65);
    assert!(matches!(
        result,
        Err(MemoryError::AllocationFailure {
            requested: 65,
            limit: 64,
            ..
        })
    ));
}

#[test]
fn test_acquire_beyond_host_memory() {
    let alloc = Allocator::new(Heap::new(usize::MAX));
    let result = alloc.acquire(usize::MAX / 2 + 1);
    assert!(
        matches!(result, Err(MemoryError::AllocationFailure { .. })),
        "Expected AllocationFailure, got: {:?}",
        result.map(|buf| buf.capacity())
    );
    assert!(alloc.acquire(20).is_ok());
}

#[test]
fn test_sequence_index_at_length() {
    let mut arr = Sequence::filled(5, 0i32);
    let result = arr.set(5, 10);
    assert!(
        matches!(result, Err(MemoryError::OutOfBoundsAccess { index: 5, len: 5 })),
        "Expected OutOfBoundsAccess, got: {:?}",
        result
    );
}

#[test]
fn test_uninitialized_conditional() {
    let uninit: Slot<i32> = Slot::declare("uninit");
    let branch = uninit.get().map(|v| v > 0);
    assert!(matches!(branch, Err(MemoryError::UninitializedRead { .. })));
}

#[test]
fn test_all_defects_detected() {
    for defect in Defect::ALL {
        let outcome = defect.run().expect("Scenario failed");
        match defect {
            Defect::Leak => {
                assert!(outcome.rejected.is_none());
                assert_eq!(outcome.heap.leaks().len(), 1);
            }
            _ => assert!(
                outcome.rejected.is_some(),
                "{} was not rejected",
                defect.name()
            ),
        }
    }
}

#[test]
fn test_older_version_leaks_both_buffers() {
    let mut out = Vec::new();
    let heap = defects::replay_older_version(&mut out).expect("Replay failed");

    let summary = heap.render_summary();
    assert!(summary.contains("in use at exit: 30 bytes in 2 blocks"));
    assert!(summary.contains("total heap usage: 2 allocs, 0 frees, 30 bytes allocated"));
    assert!(summary.contains("ERROR SUMMARY: 4 errors from 4 contexts"));
}

// === PROPERTIES ===

proptest! {
    #[test]
    fn prop_write_then_emit_reproduces_text(
        text in r"[^\x00]{0,40}",
        slack in 1usize..16,
    ) {
        let capacity = text.len() + slack;
        let alloc = Allocator::default();
        let mut buf = alloc.acquire(capacity).unwrap();
        buf.write(&text).unwrap();

        let mut out = Vec::new();
        buf.emit(&mut out).unwrap();
        buf.release().unwrap();

        prop_assert_eq!(out, format!("{}\n", text).into_bytes());
        prop_assert!(alloc.stats().is_balanced());
    }

    #[test]
    fn prop_text_that_does_not_fit_is_rejected(
        text in "[a-z]{1,40}",
    ) {
        let alloc = Allocator::default();
        let mut buf = alloc.acquire(text.len()).unwrap();
        let rejected = matches!(
            buf.write(&text),
            Err(MemoryError::CapacityExceeded { .. })
        );
        prop_assert!(rejected);
        prop_assert_eq!(buf.text_len(), None);
    }
}
