//! A growable, append-only array of fixed-size records shared across
//! processes via a single memory-mapped file.
//!
//! Each slot is a [`Cell<T>`]: an 8-byte atomic "ready" header followed by
//! the record itself. A writer reserves a slot by incrementing the header's
//! `size` counter, grows the backing file if the slot falls outside the
//! currently mapped capacity (via [`crate::growth::ensure_capacity`]),
//! writes the payload, then flips `ready` and wakes any readers blocked on
//! that slot. Readers never need a lock: a `ready` load tells them whether
//! the bytes underneath are meaningful yet.
//!
//! Grounded on the teacher's `storage::mmap::MmapStorage` for the growable
//! single-file-plus-header shape, generalized to the record-oriented,
//! futex-gated slot protocol `SPEC_FULL.md` §4 describes.

use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use bytemuck::Pod;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::growth;
use crate::mmap::{MappedFile, PayloadGuard};
use crate::mode::OpenMode;

/// Bytes reserved at the front of every slot for the atomic `ready` flag,
/// keeping the record payload itself 8-byte aligned.
const CELL_HEADER_BYTES: usize = 8;

fn cell_size<T: Pod>() -> usize {
    debug_assert!(align_of::<T>() <= CELL_HEADER_BYTES, "FixedTable<T> requires align_of::<T>() <= 8");
    let raw = CELL_HEADER_BYTES + size_of::<T>();
    raw.next_multiple_of(CELL_HEADER_BYTES)
}

/// A growable array of `T` shared across processes through a single mapped
/// file. `T` must be [`bytemuck::Pod`] (a plain, trivially-copyable record
/// type) with an alignment of at most 8 bytes.
pub struct FixedTable<T: Pod> {
    mf: MappedFile,
    cached_capacity_bytes: AtomicU64,
    _marker: PhantomData<T>,
}

impl<T: Pod> FixedTable<T> {
    /// Creates a new table backed by a freshly created file, sized to hold
    /// at least `initial_slots` records.
    pub fn create(path: impl AsRef<Path>, initial_slots: u64) -> Result<Self> {
        let capacity_bytes = initial_slots.max(1) * cell_size::<T>() as u64;
        let mf = MappedFile::create(path, capacity_bytes)?;
        let cached_capacity_bytes = AtomicU64::new(mf.capacity_bytes());
        Ok(Self { mf, cached_capacity_bytes, _marker: PhantomData })
    }

    /// Opens an existing table in the given mode.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let mf = MappedFile::open(path, mode)?;
        let cached_capacity_bytes = AtomicU64::new(mf.capacity_bytes());
        Ok(Self { mf, cached_capacity_bytes, _marker: PhantomData })
    }

    /// Opens the table read-write if it exists, otherwise creates it with
    /// room for `initial_slots` records.
    pub fn open_or_create(path: impl AsRef<Path>, initial_slots: u64) -> Result<Self> {
        let capacity_bytes = initial_slots.max(1) * cell_size::<T>() as u64;
        let mf = MappedFile::open_or_create(path, capacity_bytes)?;
        let cached_capacity_bytes = AtomicU64::new(mf.capacity_bytes());
        Ok(Self { mf, cached_capacity_bytes, _marker: PhantomData })
    }

    /// Number of records written so far (including any in-flight slots that
    /// have been reserved but not yet marked ready).
    ///
    /// Routes through [`MappedFile::size_bytes`] rather than reading the
    /// header's atomic directly: a foreign-endian file opened `ReadOnly`
    /// needs the byte-swapped view, and only the endian-aware accessor knows
    /// which one to use.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.mf.size_bytes() / cell_size::<T>() as u64
    }

    /// Number of records the file currently has room for without growing.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.mf.capacity_bytes() / cell_size::<T>() as u64
    }

    /// Derives the ready-flag and value pointers for `index` from an
    /// already-acquired payload guard.
    ///
    /// Callers must keep `payload` alive for as long as either pointer is
    /// dereferenced: dropping it (letting the mapping lock go) before using
    /// a pointer derived here risks dereferencing memory a concurrent
    /// `remap` has already unmapped. See `DESIGN.md` on remap/pointer
    /// invalidation.
    fn cell_ptrs(payload: &PayloadGuard<'_>, index: u64) -> (*const AtomicU32, *mut T) {
        let cell_size = cell_size::<T>();
        let offset = index as usize * cell_size;
        debug_assert!(offset + cell_size <= payload.len(), "index out of the currently mapped capacity");
        // SAFETY: offset is within the payload per the assertion above, and
        // is 8-byte aligned since cell_size is a multiple of 8.
        let base = unsafe { payload.as_mut_ptr().add(offset) };
        (base.cast::<AtomicU32>().cast_const(), unsafe { base.add(CELL_HEADER_BYTES).cast::<T>() })
    }

    /// Gates `index` against `size()` (per-slot reservations, not the
    /// mapped capacity) and, if the index falls outside this process's
    /// locally mapped capacity, remaps to pick up growth another process has
    /// already published — without taking part in the grow protocol, so
    /// this never blocks. Returns the (possibly refreshed) local capacity;
    /// if it's still short of `index`'s cell, the slot genuinely isn't on
    /// disk yet and the caller should treat it as not ready.
    fn local_capacity_for(&self, index: u64) -> Result<u64> {
        let mut local = self.cached_capacity_bytes.load(Ordering::Acquire);
        let needed = (index + 1) * cell_size::<T>() as u64;
        self.mf.catch_up_capacity(&mut local, needed)?;
        self.cached_capacity_bytes.store(local, Ordering::Release);
        Ok(local)
    }

    /// True if the record at `index` has been written and is safe to read.
    ///
    /// Returns `false` for an `index` beyond the currently known size; never
    /// blocks, panics, or grows the file (it may remap to observe growth
    /// another process already performed).
    #[must_use]
    pub fn has_value(&self, index: u64) -> bool {
        if index >= self.size() {
            return false;
        }
        let needed = (index + 1) * cell_size::<T>() as u64;
        let Ok(local) = self.local_capacity_for(index) else {
            return false;
        };
        if needed > local {
            return false;
        }
        let payload = self.mf.payload();
        let (flag_ptr, _) = Self::cell_ptrs(&payload, index);
        // SAFETY: flag_ptr is a live AtomicU32 within the mapping `payload` pins.
        unsafe { &*flag_ptr }.load(Ordering::Acquire) != 0
    }

    /// Reads the record at `index`, if it has been written.
    ///
    /// # Errors
    /// Returns [`Error::BadAccess`] if the slot is not yet ready.
    pub fn get(&self, index: u64) -> Result<T> {
        if index >= self.size() {
            return Err(Error::BadAccess { index });
        }
        let needed = (index + 1) * cell_size::<T>() as u64;
        let local = self.local_capacity_for(index)?;
        if needed > local {
            return Err(Error::BadAccess { index });
        }
        let payload = self.mf.payload();
        let (flag_ptr, value_ptr) = Self::cell_ptrs(&payload, index);
        // SAFETY: flag_ptr/value_ptr are live within the mapping `payload` pins.
        if unsafe { &*flag_ptr }.load(Ordering::Acquire) == 0 {
            return Err(Error::BadAccess { index });
        }
        // SAFETY: the Acquire load above observed the producer's Release
        // store to `ready`, so the value bytes it published are visible here.
        Ok(unsafe { value_ptr.read_unaligned() })
    }

    /// Blocks the calling thread until the record at `index` is ready, then
    /// returns it.
    ///
    /// Holds the mapping's read lock for the duration of the futex wait
    /// rather than dropping it first: a concurrent `remap` (e.g. another
    /// producer's growth) would otherwise invalidate the pointer being
    /// waited on while this thread is blocked inside it. This can delay an
    /// unrelated grower until the wait resolves; it never causes a deadlock,
    /// since publishing the slot this thread waits on never itself needs
    /// the write lock.
    #[instrument(skip(self))]
    pub fn wait(&self, index: u64) -> Result<T> {
        loop {
            if index >= self.capacity() {
                let mut local = self.cached_capacity_bytes.load(Ordering::Acquire);
                growth::ensure_capacity(&self.mf, &mut local, (index + 1) * cell_size::<T>() as u64)?;
                self.cached_capacity_bytes.store(local, Ordering::Release);
                continue;
            }

            let payload = self.mf.payload();
            let (flag_ptr, value_ptr) = Self::cell_ptrs(&payload, index);
            // SAFETY: pointers are live within the mapping `payload` pins.
            let flag = unsafe { &*flag_ptr };
            if flag.load(Ordering::Acquire) != 0 {
                // SAFETY: see `get`'s Acquire/Release reasoning.
                return Ok(unsafe { value_ptr.read_unaligned() });
            }
            // Tolerates spurious wakeups: the outer loop re-checks `flag`.
            atomic_wait::wait(flag, 0);
        }
    }

    /// Appends `value`, growing the file if necessary, and returns the
    /// index it was written to.
    #[instrument(skip(self, value))]
    pub fn push(&self, value: T) -> Result<u64> {
        if self.mf.mode() == OpenMode::ReadOnly {
            return Err(Error::InvalidMode { op: "FixedTable::push", mode: self.mf.mode() });
        }
        let cell_size = cell_size::<T>() as u64;
        let slot_offset = self.mf.native_header().inner().size().fetch_add(cell_size, Ordering::AcqRel);
        let index = slot_offset / cell_size;

        let mut local = self.cached_capacity_bytes.load(Ordering::Acquire);
        let needed = slot_offset + cell_size;
        if needed > local {
            growth::ensure_capacity(&self.mf, &mut local, needed)?;
            self.cached_capacity_bytes.store(local, Ordering::Release);
        }

        let payload = self.mf.payload();
        let (flag_ptr, value_ptr) = Self::cell_ptrs(&payload, index);
        // SAFETY: offset + cell_size <= payload.len() by the growth above;
        // this index was exclusively reserved by our fetch_add, so no other
        // writer touches these bytes concurrently.
        unsafe {
            value_ptr.write_unaligned(value);
        }
        // SAFETY: flag_ptr is a live AtomicU32 within the mapping `payload` pins.
        let flag = unsafe { &*flag_ptr };
        flag.store(1, Ordering::Release);
        atomic_wait::wake_all(flag);

        Ok(index)
    }

    /// Truncates the backing file's capacity down to its current size.
    /// Callers must ensure there are no concurrent writers.
    pub fn shrink_to_fit(&self) -> Result<()> {
        self.mf.shrink_to_fit()?;
        self.cached_capacity_bytes.store(self.mf.capacity_bytes(), Ordering::Release);
        Ok(())
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.mf.path()
    }
}

#[cfg(test)]
#[path = "fixed_tests.rs"]
mod fixed_tests;
