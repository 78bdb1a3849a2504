//! `tidelog`: embedded, append-only tables backed by memory-mapped files,
//! shared lock-free between processes on the same host.
//!
//! Two table shapes are provided:
//!
//! - [`FixedTable<T>`](fixed::FixedTable) — an array of fixed-size,
//!   [`bytemuck::Pod`] records.
//! - [`VariableTable`](variable::VariableTable) — an array of
//!   variable-length byte records, built from a `FixedTable` of
//!   `(offset, length)` entries in front of a byte heap.
//!
//! Both grow by doubling their backing file, coordinate growth across
//! processes with a header field CAS'd under a single-grower protocol (see
//! [`growth`]), and let readers block on a not-yet-written slot via an
//! OS futex rather than polling (see [`TableIter::blocking_next`] and the
//! tables' own `wait` methods).
//!
//! Nothing here spawns a background thread, installs a global tracing
//! subscriber, or retries a failed syscall — every operation either
//! succeeds or returns an [`Error`] synchronously, and every module emits
//! [`tracing`] spans/events for the caller's own subscriber to pick up.

pub mod error;
mod fixed;
mod growth;
mod header;
pub mod iter;
pub mod mmap;
pub mod mode;
mod variable;


pub use error::{Error, Result};
pub use fixed::FixedTable;
pub use iter::{Sequence, TableIter};
pub use mmap::MappedFile;
pub use mode::OpenMode;
pub use variable::VariableTable;
