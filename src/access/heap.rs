use crate::access::tuple::{RecordId, Tuple};
use crate::catalog::Schema;
use crate::storage::buffer::BufferPool;
use crate::storage::page::{HeapPage, PageId};
use anyhow::{bail, Result};
use std::sync::Arc;

/// Multi-page heap file for one table.
///
/// Owns the ordered page-id list and an insert cursor pointing at the page
/// currently accepting inserts. The heap only grows; pages are never
/// reclaimed.
pub struct TableHeap {
    buffer_pool: Arc<BufferPool>,
    schema: Schema,
    page_ids: Vec<PageId>,
    insert_cursor: usize,
}

impl TableHeap {
    /// Create a table with exactly one freshly allocated page.
    pub fn create(buffer_pool: Arc<BufferPool>, schema: Schema) -> Result<Self> {
        let page = buffer_pool.new_page()?;
        let page_id = {
            let mut guard = page.write();
            HeapPage::new(&mut guard, &schema)?.page_id()
        };
        drop(page);
        buffer_pool.unpin_page(page_id, true);

        Ok(Self {
            buffer_pool,
            schema,
            page_ids: vec![page_id],
            insert_cursor: 0,
        })
    }

    /// Reattach to a table whose pages already exist on disk.
    pub fn open(buffer_pool: Arc<BufferPool>, schema: Schema, page_ids: Vec<PageId>) -> Result<Self> {
        if page_ids.is_empty() {
            bail!("a table heap needs at least one page");
        }
        let insert_cursor = page_ids.len() - 1;
        Ok(Self {
            buffer_pool,
            schema,
            page_ids,
            insert_cursor,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn first_page_id(&self) -> PageId {
        self.page_ids[0]
    }

    pub fn page_ids(&self) -> &[PageId] {
        &self.page_ids
    }

    /// Insert into the current target page; when it reports full, allocate
    /// a fresh page and retry once. A tuple that does not fit in an empty
    /// page is a capacity error.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> Result<RecordId> {
        let page_id = self.page_ids[self.insert_cursor];
        let page = self.buffer_pool.fetch_page(page_id)?;
        let slot = {
            let mut guard = page.write();
            HeapPage::new(&mut guard, &self.schema)?.insert_tuple(tuple)?
        };
        drop(page);

        if let Some(slot_id) = slot {
            self.buffer_pool.unpin_page(page_id, true);
            return Ok(RecordId::new(page_id, slot_id));
        }
        self.buffer_pool.unpin_page(page_id, false);

        // Current target is full; advance to a new page.
        let page = self.buffer_pool.new_page()?;
        let (new_page_id, slot) = {
            let mut guard = page.write();
            let mut heap_page = HeapPage::new(&mut guard, &self.schema)?;
            (heap_page.page_id(), heap_page.insert_tuple(tuple)?)
        };
        drop(page);
        self.buffer_pool.unpin_page(new_page_id, true);

        self.page_ids.push(new_page_id);
        self.insert_cursor = self.page_ids.len() - 1;

        match slot {
            Some(slot_id) => Ok(RecordId::new(new_page_id, slot_id)),
            None => bail!("tuple does not fit in an empty page"),
        }
    }

    /// Fetch the tuple at `rid`; `None` for tombstoned or out-of-range slots.
    pub fn get_tuple(&self, rid: RecordId) -> Result<Option<Tuple>> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let tuple = {
            let mut guard = page.write();
            HeapPage::new(&mut guard, &self.schema)?.get_tuple(rid.slot_id)?
        };
        drop(page);
        self.buffer_pool.unpin_page(rid.page_id, false);
        Ok(tuple)
    }

    /// Tombstone the tuple at `rid`, invalidating the handle.
    pub fn delete_tuple(&self, rid: RecordId) -> Result<()> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        {
            let mut guard = page.write();
            HeapPage::new(&mut guard, &self.schema)?.delete_tuple(rid.slot_id)?;
        }
        drop(page);
        self.buffer_pool.unpin_page(rid.page_id, true);
        Ok(())
    }

    /// Replace the tuple at `rid` with a new image on the same page.
    ///
    /// The new image may land in a different slot; the returned RecordId is
    /// the tuple's current location. `None` means the page had no room for
    /// the new image (the old slot is tombstoned regardless).
    pub fn update_tuple(&self, rid: RecordId, tuple: &Tuple) -> Result<Option<RecordId>> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let slot = {
            let mut guard = page.write();
            HeapPage::new(&mut guard, &self.schema)?.update_tuple(rid.slot_id, tuple)?
        };
        drop(page);
        self.buffer_pool.unpin_page(rid.page_id, true);
        Ok(slot.map(|slot_id| RecordId::new(rid.page_id, slot_id)))
    }

    /// Lazy forward scan across pages in page-list order. Each call starts
    /// a fresh iterator; one page's tuples are materialized at a time and
    /// the page is unpinned before the tuples are handed out.
    pub fn scan(&self) -> TableScan {
        TableScan {
            buffer_pool: self.buffer_pool.clone(),
            schema: self.schema.clone(),
            page_ids: self.page_ids.clone(),
            page_index: 0,
            current: Vec::new().into_iter(),
        }
    }
}

/// Iterator over all live tuples of a table.
pub struct TableScan {
    buffer_pool: Arc<BufferPool>,
    schema: Schema,
    page_ids: Vec<PageId>,
    page_index: usize,
    current: std::vec::IntoIter<Tuple>,
}

impl TableScan {
    fn load_page(&self, page_id: PageId) -> Result<Vec<Tuple>> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let tuples = {
            let mut guard = page.write();
            HeapPage::new(&mut guard, &self.schema)?.get_all_tuples()?
        };
        drop(page);
        self.buffer_pool.unpin_page(page_id, false);
        Ok(tuples)
    }
}

impl Iterator for TableScan {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tuple) = self.current.next() {
                return Some(Ok(tuple));
            }
            if self.page_index >= self.page_ids.len() {
                return None;
            }
            let page_id = self.page_ids[self.page_index];
            self.page_index += 1;
            match self.load_page(page_id) {
                Ok(tuples) => self.current = tuples.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
