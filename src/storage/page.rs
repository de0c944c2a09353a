pub mod heap_page;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::PAGE_SIZE;
use std::fmt;

/// Identifier of a fixed-size page within the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type tag stored in the first byte of every formatted page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    Heap = 1,
    BTreeInternal = 2,
    BTreeLeaf = 3,
    FreeList = 4,
    Metadata = 5,
}

impl PageType {
    pub fn from_u8(tag: u8) -> StorageResult<Self> {
        match tag {
            1 => Ok(PageType::Heap),
            2 => Ok(PageType::BTreeInternal),
            3 => Ok(PageType::BTreeLeaf),
            4 => Ok(PageType::FreeList),
            5 => Ok(PageType::Metadata),
            _ => Err(StorageError::UnknownPageType(tag)),
        }
    }
}

/// A fixed-size in-memory page: raw bytes plus the bookkeeping the buffer
/// pool relies on (dirty flag, pin count).
///
/// The pin count is the sole admission-control mechanism: a pinned page must
/// never be evicted. The dirty flag is caller-declared through
/// `BufferPool::unpin_page`, never inferred from mutation.
#[derive(Debug)]
pub struct Page {
    id: PageId,
    data: Box<[u8; PAGE_SIZE]>,
    dirty: bool,
    pin_count: u32,
}

impl Page {
    /// Create a zero-filled page.
    pub fn new(id: PageId) -> Self {
        Self {
            id,
            data: Box::new([0u8; PAGE_SIZE]),
            dirty: false,
            pin_count: 0,
        }
    }

    /// Wrap bytes read from disk.
    pub fn from_bytes(id: PageId, data: Box<[u8; PAGE_SIZE]>) -> Self {
        Self {
            id,
            data,
            dirty: false,
            pin_count: 0,
        }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }

    pub fn pin(&mut self) {
        self.pin_count += 1;
    }

    /// Decrement the pin count, flooring at zero.
    pub fn unpin(&mut self) {
        self.pin_count = self.pin_count.saturating_sub(1);
    }

    /// Zero the page contents and mark it dirty.
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.dirty = true;
    }
}

pub use heap_page::HeapPage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_page_is_zeroed() {
        let page = Page::new(PageId(7));
        assert_eq!(page.id(), PageId(7));
        assert!(page.data().iter().all(|&b| b == 0));
        assert!(!page.is_dirty());
        assert!(!page.is_pinned());
    }

    #[test]
    fn test_pin_unpin_floors_at_zero() {
        let mut page = Page::new(PageId(0));
        page.pin();
        page.pin();
        assert_eq!(page.pin_count(), 2);
        page.unpin();
        page.unpin();
        page.unpin();
        assert_eq!(page.pin_count(), 0);
        assert!(!page.is_pinned());
    }

    #[test]
    fn test_clear_marks_dirty() {
        let mut page = Page::new(PageId(0));
        page.data_mut()[0] = 0xFF;
        assert!(!page.is_dirty());
        page.clear();
        assert!(page.is_dirty());
        assert_eq!(page.data()[0], 0);
    }

    #[test]
    fn test_page_type_round_trip() {
        for tag in 1u8..=5 {
            let ty = PageType::from_u8(tag).unwrap();
            assert_eq!(ty as u8, tag);
        }
        assert!(PageType::from_u8(0).is_err());
        assert!(PageType::from_u8(9).is_err());
    }
}
