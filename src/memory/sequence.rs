//! Fixed-length, bounds-checked sequence
//!
//! [`Sequence`] is the replacement for a raw `int arr[N]`: the length is fixed
//! at construction and every indexed access is checked. An index equal to or
//! past the length is rejected with [`MemoryError::OutOfBoundsAccess`] instead
//! of touching the neighbouring memory.

use crate::errors::MemoryError;
use log::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence<T> {
    items: Box<[T]>,
}

impl<T: Clone> Sequence<T> {
    /// Create a sequence of `len` copies of `fill`
    pub fn filled(len: usize, fill: T) -> Self {
        Sequence {
            items: vec![fill; len].into_boxed_slice(),
        }
    }
}

impl<T> Sequence<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&T, MemoryError> {
        self.items.get(index).ok_or_else(|| self.out_of_bounds(index))
    }

    /// Write at `index`, leaving the sequence unchanged on failure
    pub fn set(&mut self, index: usize, value: T) -> Result<(), MemoryError> {
        let len = self.items.len();
        match self.items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => {
                warn!("rejected write at index {} of sequence of length {}", index, len);
                Err(MemoryError::OutOfBoundsAccess { index, len })
            }
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    fn out_of_bounds(&self, index: usize) -> MemoryError {
        MemoryError::OutOfBoundsAccess {
            index,
            len: self.items.len(),
        }
    }
}

impl<T> From<Vec<T>> for Sequence<T> {
    fn from(items: Vec<T>) -> Self {
        Sequence {
            items: items.into_boxed_slice(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_at_length_is_rejected() {
        let mut arr = Sequence::filled(5, 0i32);
        match arr.set(5, 10) {
            Err(MemoryError::OutOfBoundsAccess { index, len }) => {
                assert_eq!(index, 5);
                assert_eq!(len, 5);
            }
            other => panic!("expected OutOfBoundsAccess, got {:?}", other),
        }
        assert_eq!(arr.as_slice(), &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_last_index_is_writable() {
        let mut arr = Sequence::filled(5, 0i32);
        arr.set(4, 10).unwrap();
        assert_eq!(*arr.get(4).unwrap(), 10);
        assert!(arr.get(5).is_err());
    }

    #[test]
    fn test_empty_sequence() {
        let mut arr: Sequence<u8> = Sequence::from(Vec::new());
        assert!(arr.is_empty());
        assert!(arr.set(0, 1).is_err());
    }
}
