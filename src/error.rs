//! Error types returned by `tidelog`.

use thiserror::Error;

use crate::mode::OpenMode;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by `tidelog`'s public API.
///
/// The library never swallows an error, never retries IO automatically, and
/// never logs on the caller's behalf — every failure is returned synchronously.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation was invoked with an [`OpenMode`] it does not accept.
    #[error("invalid mode {mode:?} for {op}")]
    InvalidMode {
        /// Name of the operation that rejected the mode.
        op: &'static str,
        /// The mode that was rejected.
        mode: OpenMode,
    },

    /// A filesystem or mapping operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// `ReadWrite` was requested on a file written by the opposite byte order.
    #[error("endian mismatch: file's endian_tag does not match this host's native order")]
    EndianMismatch,

    /// A checked accessor was called on a slot that is not yet ready.
    #[error("slot {index} has no value yet")]
    BadAccess {
        /// The slot index that was not ready.
        index: u64,
    },
}
