//! A growable, append-only array of variable-length byte records, built
//! from a [`crate::fixed::FixedTable`] of `(offset, length)` entries sitting
//! in front of a second mapped file used purely as a byte heap.
//!
//! A writer reserves heap space with the same fetch-and-grow protocol
//! [`crate::fixed::FixedTable`] uses for slots, copies the record's bytes
//! into the heap, then publishes an [`IndexEntry`] pointing at them — the
//! index entry's own `ready` flag (inherited from `FixedTable`) is what
//! readers wait and poll on, so the heap itself needs no per-byte
//! visibility protocol of its own.
//!
//! The index lives at the path given to [`VariableTable::create`]/`open`;
//! the heap lives alongside it with an `.idb` suffix appended, the same
//! sibling-file convention the original implementation used.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::{Pod, Zeroable};
use tracing::instrument;

use crate::error::{Error, Result};
use crate::fixed::FixedTable;
use crate::growth;
use crate::mmap::MappedFile;
use crate::mode::OpenMode;

/// `(offset, length)` into the heap file, one per logical record. `Pod` so
/// it can live directly inside a [`FixedTable`] slot.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq, Eq)]
struct IndexEntry {
    offset: u64,
    length: u64,
}

fn heap_path(index_path: &Path) -> PathBuf {
    let mut os = index_path.as_os_str().to_owned();
    os.push(".idb");
    PathBuf::from(os)
}

/// A growable array of byte records shared across processes through a pair
/// of mapped files: a fixed-size index and a variable-length byte heap.
pub struct VariableTable {
    index: FixedTable<IndexEntry>,
    heap: MappedFile,
    cached_heap_capacity_bytes: AtomicU64,
}

impl VariableTable {
    /// Creates a new table. `initial_slots` sizes the index; `initial_heap_bytes`
    /// sizes the byte heap. Both grow independently as needed.
    pub fn create(path: impl AsRef<Path>, initial_slots: u64, initial_heap_bytes: u64) -> Result<Self> {
        let path = path.as_ref();
        let index = FixedTable::create(path, initial_slots)?;
        let heap = MappedFile::create(heap_path(path), initial_heap_bytes.max(1))?;
        let cached_heap_capacity_bytes = AtomicU64::new(heap.capacity_bytes());
        Ok(Self { index, heap, cached_heap_capacity_bytes })
    }

    /// Opens an existing table (both the index and its `.idb` heap sibling)
    /// in the given mode.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let index = FixedTable::open(path, mode)?;
        let heap = MappedFile::open(heap_path(path), mode)?;
        let cached_heap_capacity_bytes = AtomicU64::new(heap.capacity_bytes());
        Ok(Self { index, heap, cached_heap_capacity_bytes })
    }

    /// Opens the table read-write if its index file exists, otherwise
    /// creates both files fresh.
    pub fn open_or_create(path: impl AsRef<Path>, initial_slots: u64, initial_heap_bytes: u64) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, OpenMode::ReadWrite)
        } else {
            Self::create(path, initial_slots, initial_heap_bytes)
        }
    }

    /// Number of records written so far, and the heap's current byte
    /// watermark.
    #[must_use]
    pub fn size(&self) -> (u64, u64) {
        (self.record_count(), self.heap.size_bytes())
    }

    /// Number of index slots and heap bytes currently available without
    /// growing.
    #[must_use]
    pub fn capacity(&self) -> (u64, u64) {
        (self.index_capacity(), self.heap.capacity_bytes())
    }

    /// Number of records written so far. Used where only the record count
    /// (not the paired heap watermark) is meaningful, e.g. iteration.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.index.size()
    }

    /// Number of index slots currently available without growing.
    #[must_use]
    pub fn index_capacity(&self) -> u64 {
        self.index.capacity()
    }

    /// True if the record at `index` has been written and is safe to read.
    #[must_use]
    pub fn has_value(&self, index: u64) -> bool {
        self.index.has_value(index)
    }

    /// Reads the record at `index`, if it has been written, copying its
    /// bytes out of the heap.
    ///
    /// # Errors
    /// Returns [`Error::BadAccess`] if the slot is not yet ready.
    pub fn get(&self, index: u64) -> Result<Vec<u8>> {
        let entry = self.index.get(index)?;
        self.read_heap_range(index, entry)
    }

    /// Blocks the calling thread until the record at `index` is ready, then
    /// returns its bytes.
    pub fn wait(&self, index: u64) -> Result<Vec<u8>> {
        let entry = self.index.wait(index)?;
        self.read_heap_range(index, entry)
    }

    /// Reads the byte range an already-resolved index entry points at.
    ///
    /// The index entry's own `ready` flag guarantees the writer finished
    /// growing the heap to cover `[offset, offset+length)` before
    /// publishing, but that growth may not have reached *this* process's
    /// mapping yet — so this still catches up the heap's local capacity
    /// (a cheap remap, no lock, no wait) before deriving a pointer into it,
    /// rather than trusting the stale local mapping length.
    fn read_heap_range(&self, index: u64, entry: IndexEntry) -> Result<Vec<u8>> {
        let mut local = self.cached_heap_capacity_bytes.load(Ordering::Acquire);
        let needed = entry.offset + entry.length;
        self.heap.catch_up_capacity(&mut local, needed)?;
        self.cached_heap_capacity_bytes.store(local, Ordering::Release);
        if needed > local {
            return Err(Error::BadAccess { index });
        }

        let payload = self.heap.payload();
        let start = entry.offset as usize;
        debug_assert!(start + entry.length as usize <= payload.len(), "index entry points past the mapped heap");
        // SAFETY: the catch-up above ensures the local mapping covers
        // [offset, offset+length), and the writer fully wrote those bytes
        // before publishing the index entry this was resolved from.
        let slice = unsafe { std::slice::from_raw_parts(payload.as_mut_ptr().add(start), entry.length as usize) };
        Ok(slice.to_vec())
    }

    /// Appends `bytes`, growing the heap and/or the index as needed, and
    /// returns the index it was written to.
    #[instrument(skip(self, bytes))]
    pub fn push(&self, bytes: &[u8]) -> Result<u64> {
        if self.heap.mode() == OpenMode::ReadOnly {
            return Err(Error::InvalidMode { op: "VariableTable::push", mode: self.heap.mode() });
        }
        let len = bytes.len() as u64;
        let offset = self.heap.native_header().inner().size().fetch_add(len, Ordering::AcqRel);

        let mut local = self.cached_heap_capacity_bytes.load(Ordering::Acquire);
        let needed = offset + len;
        if needed > local {
            growth::ensure_capacity(&self.heap, &mut local, needed)?;
            self.cached_heap_capacity_bytes.store(local, Ordering::Release);
        }

        {
            let payload = self.heap.payload();
            debug_assert!(offset as usize + bytes.len() <= payload.len());
            // SAFETY: the fetch_add above exclusively reserved [offset, offset+len)
            // for this call; no other writer touches these bytes concurrently.
            unsafe {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), payload.as_mut_ptr().add(offset as usize), bytes.len());
            }
        }

        self.index.push(IndexEntry { offset, length: len })
    }

    /// Truncates both the index and the heap down to their current sizes.
    /// Callers must ensure there are no concurrent writers.
    pub fn shrink_to_fit(&self) -> Result<()> {
        self.index.shrink_to_fit()?;
        self.heap.shrink_to_fit()?;
        self.cached_heap_capacity_bytes.store(self.heap.capacity_bytes(), Ordering::Release);
        Ok(())
    }

    /// Path of the backing index file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.index.path()
    }
}

#[cfg(test)]
#[path = "variable_tests.rs"]
mod variable_tests;
