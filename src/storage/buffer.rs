use crate::storage::disk::DiskManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId};
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Reference pool capacity when the caller has no opinion.
pub const DEFAULT_POOL_SIZE: usize = 100;

/// Pinned in-memory page cache over the disk manager with LRU eviction.
///
/// Every operation runs under one global mutex; this makes single operations
/// atomic when called from multiple threads but provides no isolation
/// between transactions. Callers must pair each `fetch_page`/`new_page`
/// with exactly one `unpin_page`; the pool never unpins on its own.
pub struct BufferPool {
    inner: Mutex<BufferPoolInner>,
}

struct BufferPoolInner {
    disk: DiskManager,
    capacity: usize,
    pages: HashMap<PageId, Arc<RwLock<Page>>>,
    // Most-recently-used page ids at the front.
    lru: VecDeque<PageId>,
}

impl BufferPool {
    pub fn new(disk: DiskManager, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BufferPoolInner {
                disk,
                capacity,
                pages: HashMap::with_capacity(capacity),
                lru: VecDeque::with_capacity(capacity),
            }),
        }
    }

    /// Fetch a page, reading it from disk on a cache miss. The returned
    /// page is pinned once.
    pub fn fetch_page(&self, page_id: PageId) -> StorageResult<Arc<RwLock<Page>>> {
        let mut inner = self.inner.lock();

        if let Some(page) = inner.pages.get(&page_id).cloned() {
            page.write().pin();
            inner.touch(page_id);
            return Ok(page);
        }

        if inner.pages.len() >= inner.capacity {
            inner.evict_one()?;
        }

        let mut page = inner.disk.read_page(page_id)?;
        page.pin();
        let page = Arc::new(RwLock::new(page));
        inner.pages.insert(page_id, page.clone());
        inner.lru.push_front(page_id);

        Ok(page)
    }

    /// Decrement a page's pin count and OR in the caller's dirty report.
    /// Never evicts as a side effect.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) {
        let inner = self.inner.lock();
        if let Some(page) = inner.pages.get(&page_id) {
            let mut page = page.write();
            page.unpin();
            if is_dirty {
                page.set_dirty(true);
            }
        }
    }

    /// Allocate a fresh page on disk and cache it, pinned once.
    pub fn new_page(&self) -> StorageResult<Arc<RwLock<Page>>> {
        let mut inner = self.inner.lock();

        if inner.pages.len() >= inner.capacity {
            inner.evict_one()?;
        }

        let page_id = inner.disk.allocate_page()?;
        let mut page = Page::new(page_id);
        page.pin();
        let page = Arc::new(RwLock::new(page));
        inner.pages.insert(page_id, page.clone());
        inner.lru.push_front(page_id);

        Ok(page)
    }

    /// Write one cached page to disk if it is dirty, regardless of pins.
    pub fn flush_page(&self, page_id: PageId) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if let Some(page) = inner.pages.get(&page_id).cloned() {
            let mut page = page.write();
            if page.is_dirty() {
                inner.disk.write_page(&mut page)?;
            }
        }
        Ok(())
    }

    /// Write every dirty cached page to disk, regardless of pins.
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        let pages: Vec<_> = inner.pages.values().cloned().collect();
        for page in pages {
            let mut page = page.write();
            if page.is_dirty() {
                inner.disk.write_page(&mut page)?;
            }
        }
        Ok(())
    }

    /// Drop a page from the cache. Fails while the page is pinned.
    pub fn delete_page(&self, page_id: PageId) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if let Some(page) = inner.pages.get(&page_id) {
            if page.read().is_pinned() {
                return Err(StorageError::PagePinned(page_id));
            }
            inner.pages.remove(&page_id);
            inner.lru.retain(|&id| id != page_id);
        }
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    pub fn cached_pages(&self) -> usize {
        self.inner.lock().pages.len()
    }
}

impl BufferPoolInner {
    /// Promote a page to most-recently-used.
    fn touch(&mut self, page_id: PageId) {
        self.lru.retain(|&id| id != page_id);
        self.lru.push_front(page_id);
    }

    /// Evict the least-recently-used unpinned page, writing it out first
    /// if dirty. Fails when every cached page is pinned.
    fn evict_one(&mut self) -> StorageResult<()> {
        for idx in (0..self.lru.len()).rev() {
            let page_id = self.lru[idx];
            let Some(page) = self.pages.get(&page_id).cloned() else {
                continue;
            };

            // A frame whose lock is currently held is in use; skip it
            // rather than park on it while holding the pool mutex.
            let Some(mut guard) = page.try_write() else {
                continue;
            };
            if guard.is_pinned() {
                continue;
            }

            if guard.is_dirty() {
                self.disk.write_page(&mut guard)?;
            }
            drop(guard);

            debug!("evicting page {}", page_id);
            self.pages.remove(&page_id);
            let _ = self.lru.remove(idx);
            return Ok(());
        }

        Err(StorageError::BufferPoolExhausted)
    }
}
