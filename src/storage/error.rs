//! Storage layer error types.

use crate::storage::page::PageId;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid slot id: {slot_id} (tuple count: {tuple_count})")]
    InvalidSlot { slot_id: u32, tuple_count: u32 },

    #[error("Buffer pool exhausted: every cached page is pinned")]
    BufferPoolExhausted,

    #[error("Page {0} is pinned and cannot be deleted")]
    PagePinned(PageId),

    #[error("Unknown page type tag: {0}")]
    UnknownPageType(u8),

    #[error("Unknown value type tag: {0}")]
    UnknownValueTag(u8),

    #[error("Unknown log record type: {0}")]
    UnknownLogRecordType(u32),

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
