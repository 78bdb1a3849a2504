//! The single-grower, many-waiters capacity protocol shared by
//! [`crate::fixed::FixedTable`] and [`crate::variable::VariableTable`].
//!
//! Mirrors the teacher's `MmapStorage::ensure_capacity` in shape — resize
//! under a lock, remap, keep going — but generalized from an in-process
//! `parking_lot::RwLock` to a header field shared across processes: the
//! lock is `header.grow_lock`, CAS'd in the mapped file itself, and waiters
//! block on the futex word `header.capacity_bell` via the `atomic-wait`
//! crate rather than a `parking_lot::Condvar`.

use std::sync::atomic::Ordering;

use tracing::{instrument, trace};

use crate::error::Result;
use crate::mmap::MappedFile;

/// Grows `mf` until its on-disk capacity is at least `needed_bytes`,
/// following the one-grower/many-waiters protocol described in
/// `SPEC_FULL.md` §4.2, and writes the (possibly unchanged) result back into
/// `*local_capacity_bytes`.
///
/// Exactly one caller racing for a given capacity bump performs the actual
/// `recapacity`; the rest block on `capacity_bell` until it publishes. Every
/// caller remaps before returning, including the one that grew, so
/// `*local_capacity_bytes` is always refreshed from the file rather than
/// computed locally.
#[instrument(skip(mf, local_capacity_bytes))]
pub(crate) fn ensure_capacity(mf: &MappedFile, local_capacity_bytes: &mut u64, needed_bytes: u64) -> Result<()> {
    while needed_bytes > *local_capacity_bytes {
        let header = mf.native_header();
        let bell = header.inner().capacity_bell();

        // Snapshot before attempting the lock: if another process already
        // finished growing between our last remap and this attempt, this
        // value will already differ from whatever `bell` holds once we
        // reach the `wait` below, so we won't block needlessly.
        let observed_bell = bell.load(Ordering::Acquire);
        let already_locked = header.inner().grow_lock().swap(1, Ordering::AcqRel) != 0;

        if !already_locked {
            let grow_result = if *local_capacity_bytes == header.inner().capacity().load(Ordering::Acquire) {
                drop(header);
                trace!("won grow race, recapacitying");
                mf.recapacity()
            } else {
                // Someone grew between our stale local_capacity_bytes and
                // now; nothing to do this round.
                drop(header);
                Ok(())
            };

            let header = mf.native_header();
            header.inner().grow_lock().store(0, Ordering::Release);
            header.inner().capacity_bell().fetch_add(1, Ordering::Release);
            atomic_wait::wake_all(header.inner().capacity_bell());
            drop(header);
            grow_result?;
        } else {
            drop(header);
        }

        // Re-fetch the header: recapacity/remap above may have rebound the
        // mapping out from under the `header` we grabbed at loop entry.
        let header = mf.native_header();
        atomic_wait::wait(header.inner().capacity_bell(), observed_bell);
        drop(header);

        mf.remap()?;
        *local_capacity_bytes = mf.capacity_bytes();
    }

    Ok(())
}

#[cfg(test)]
#[path = "growth_tests.rs"]
mod growth_tests;
