//! Scalar values with initialization tracking
//!
//! This module defines the [`Address`] type used by the heap and [`Slot`], a
//! named scalar that may be declared before it is assigned. Unlike a C local,
//! an unassigned slot holds no garbage: reading it is rejected with
//! [`MemoryError::UninitializedRead`].
//!
//! Code that does not need the declare-then-assign pattern should simply bind
//! an initialized value; `Slot` exists to show the checked variant.

use crate::errors::MemoryError;

/// Memory address type (64-bit)
pub type Address = u64;

/// A named scalar that is either assigned or not
#[derive(Debug, Clone, PartialEq)]
pub struct Slot<T> {
    name: String,
    value: Option<T>,
}

impl<T: Copy> Slot<T> {
    /// Declare a slot without a value
    pub fn declare(name: impl Into<String>) -> Self {
        Slot {
            name: name.into(),
            value: None,
        }
    }

    /// Declare a slot with an initial value
    pub fn with_value(name: impl Into<String>, value: T) -> Self {
        Slot {
            name: name.into(),
            value: Some(value),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_initialized(&self) -> bool {
        self.value.is_some()
    }

    pub fn assign(&mut self, value: T) {
        self.value = Some(value);
    }

    /// Read the value, failing if it was never assigned
    pub fn get(&self) -> Result<T, MemoryError> {
        self.value.ok_or_else(|| MemoryError::UninitializedRead {
            what: format!("variable '{}'", self.name),
        })
    }
}
