//! Open modes shared by [`crate::mmap::MappedFile`] and the tables built on it.

/// How a table or its backing [`crate::mmap::MappedFile`] is opened.
///
/// See `spec.md` §6 for the full mode matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Create (truncating) a new file. Fails loudly only on IO error; an
    /// existing file at the path is silently truncated — see `DESIGN.md`
    /// for why this mirrors the original implementation's policy.
    CreateOnly,
    /// Open the file read-write if it exists, otherwise create it.
    OpenOrCreate,
    /// Open an existing file read-write. Persists writes.
    ReadWrite,
    /// Open an existing file read-only. Writes are rejected by the OS.
    ReadOnly,
    /// Open an existing file as a private copy-on-write mapping. Writes are
    /// visible to this process only and are never persisted.
    ReadPrivate,
    /// Open an existing file as a copy-on-write mapping. Semantically
    /// identical to `ReadPrivate` for this crate's purposes; kept distinct
    /// because the spec's mode table lists them separately.
    CopyOnWrite,
}

impl OpenMode {
    /// True for modes that require the file to already exist.
    #[must_use]
    pub fn requires_existing(self) -> bool {
        matches!(
            self,
            OpenMode::ReadWrite | OpenMode::ReadOnly | OpenMode::ReadPrivate | OpenMode::CopyOnWrite
        )
    }

    /// True for modes whose writes are persisted back to the file.
    #[must_use]
    pub fn persists_writes(self) -> bool {
        matches!(self, OpenMode::CreateOnly | OpenMode::OpenOrCreate | OpenMode::ReadWrite)
    }

    /// True for modes that map the file writably (even if not persisted).
    #[must_use]
    pub fn is_writable_mapping(self) -> bool {
        matches!(
            self,
            OpenMode::CreateOnly | OpenMode::OpenOrCreate | OpenMode::ReadWrite | OpenMode::ReadPrivate | OpenMode::CopyOnWrite
        )
    }
}
