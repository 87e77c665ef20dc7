use std::io;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, LinHashError>;

/// Errors produced by the index, its cache, and its overflow files.
#[derive(Debug, thiserror::Error)]
pub enum LinHashError {
    #[error("invalid initial bucket count: {0} (must be a power of two >= 2)")]
    InvalidInitialSize(u64),

    #[error("index {0} has not been initialised")]
    Uninitialized(u64),

    #[error("out of memory allocating a cache buffer of {0} bytes")]
    OutOfMemory(usize),

    #[error("file I/O error: {0}")]
    FileIo(#[from] io::Error),

    #[error("item not found")]
    ItemNotFound,

    #[error("duplicate key rejected under insert-unique write concern")]
    Duplicate,

    #[error("unable to insert record: {0}")]
    UnableToInsert(String),

    #[error("destroying index {map_id} failed: {last_error}")]
    DestructionError { map_id: u64, last_error: String },

    #[error("cache slot {0} is out of range")]
    InvalidCacheSlot(usize),
}

impl LinHashError {
    pub fn unable_to_insert<S: Into<String>>(reason: S) -> Self {
        LinHashError::UnableToInsert(reason.into())
    }

    /// True for errors a caller could plausibly retry (e.g. after freeing
    /// memory or widening a resource limit). Everything else is permanent
    /// for the lifetime of this index handle.
    pub fn is_retriable(&self) -> bool {
        matches!(self, LinHashError::OutOfMemory(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_io_converts_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: LinHashError = io_err.into();
        assert!(matches!(err, LinHashError::FileIo(_)));
    }

    #[test]
    fn out_of_memory_is_retriable() {
        assert!(LinHashError::OutOfMemory(4096).is_retriable());
        assert!(!LinHashError::ItemNotFound.is_retriable());
    }
}
