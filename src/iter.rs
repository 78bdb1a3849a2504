//! A cursor-based iterator over [`crate::fixed::FixedTable`] and
//! [`crate::variable::VariableTable`] alike.
//!
//! The iterator stores only a table reference and an index, never a raw
//! pointer into the mapping — every step re-derives its read through the
//! table's own accessor, which always re-fetches the current mapping. That
//! makes it immune to the table growing (and remapping) mid-iteration,
//! unlike the teacher's `VectorSliceGuard`-based borrows, which must check
//! a remap epoch because they do hold a pointer across calls.

use crate::error::Result;
use crate::fixed::FixedTable;
use crate::variable::VariableTable;
use bytemuck::Pod;

/// A table that can be stepped through by slot index.
pub trait Sequence {
    /// The type produced by [`Sequence::get`].
    type Item;

    /// Number of slots written so far.
    fn size(&self) -> u64;

    /// True if the slot at `index` has been written.
    fn has_value(&self, index: u64) -> bool;

    /// Reads the slot at `index`. Errors if it is not yet ready.
    fn get(&self, index: u64) -> Result<Self::Item>;

    /// Blocks until the slot at `index` is ready, then reads it.
    fn wait(&self, index: u64) -> Result<Self::Item>;
}

impl<T: Pod> Sequence for FixedTable<T> {
    type Item = T;

    fn size(&self) -> u64 {
        FixedTable::size(self)
    }

    fn has_value(&self, index: u64) -> bool {
        FixedTable::has_value(self, index)
    }

    fn get(&self, index: u64) -> Result<T> {
        FixedTable::get(self, index)
    }

    fn wait(&self, index: u64) -> Result<T> {
        FixedTable::wait(self, index)
    }
}

impl Sequence for VariableTable {
    type Item = Vec<u8>;

    fn size(&self) -> u64 {
        VariableTable::record_count(self)
    }

    fn has_value(&self, index: u64) -> bool {
        VariableTable::has_value(self, index)
    }

    fn get(&self, index: u64) -> Result<Vec<u8>> {
        VariableTable::get(self, index)
    }

    fn wait(&self, index: u64) -> Result<Vec<u8>> {
        VariableTable::wait(self, index)
    }
}

/// A random-access, forward-only cursor over a [`Sequence`].
///
/// `next()` stops (returns `None`) once the cursor reaches the table's
/// current `size()`; it does not block. Use [`TableIter::blocking_next`] to
/// wait for a producer instead of stopping.
pub struct TableIter<'a, S: Sequence> {
    table: &'a S,
    cursor: u64,
}

impl<'a, S: Sequence> TableIter<'a, S> {
    /// Starts a new iterator at slot 0.
    #[must_use]
    pub fn new(table: &'a S) -> Self {
        Self { table, cursor: 0 }
    }

    /// Starts a new iterator at the given slot.
    #[must_use]
    pub fn from_index(table: &'a S, index: u64) -> Self {
        Self { table, cursor: index }
    }

    /// The index the next call to [`Iterator::next`] or
    /// [`TableIter::blocking_next`] will read.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Blocks until the next slot is ready, reads it, and advances the
    /// cursor. Never returns `None`: the underlying table is append-only,
    /// so there is always a "next" eventually.
    pub fn blocking_next(&mut self) -> Result<S::Item> {
        let value = self.table.wait(self.cursor)?;
        self.cursor += 1;
        Ok(value)
    }
}

impl<'a, S: Sequence> Iterator for TableIter<'a, S> {
    type Item = Result<S::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.table.size() && !self.table.has_value(self.cursor) {
            return None;
        }
        let value = self.table.get(self.cursor);
        self.cursor += 1;
        Some(value)
    }
}

#[cfg(test)]
#[path = "iter_tests.rs"]
mod iter_tests;
