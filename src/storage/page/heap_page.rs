use crate::access::tuple::{RecordId, Tuple};
use crate::access::value::{deserialize_values, serialize_values};
use crate::catalog::Schema;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId, PageType};
use crate::storage::PAGE_SIZE;

// Header: page type (1 byte), tuple count (4 bytes), free space offset (4 bytes)
pub const HEADER_SIZE: usize = 9;
const TUPLE_COUNT_OFFSET: usize = 1;
const FREE_SPACE_OFFSET: usize = 5;

// Slot entry: payload offset (4 bytes), payload length (4 bytes)
pub const SLOT_SIZE: usize = 8;

const TOMBSTONE_OFFSET: i32 = -1;

/// Slotted-page view over a raw page's bytes.
///
/// The slot array grows forward from the header; tuple payloads grow
/// backward from the end of the page. Deleted slots are tombstoned as
/// (offset = -1, length = 0) and their space is never reclaimed within the
/// page; compaction is a known, deliberate omission.
pub struct HeapPage<'a> {
    page: &'a mut Page,
    schema: &'a Schema,
}

impl<'a> HeapPage<'a> {
    /// Interpret `page` as a heap page, formatting the header if the page
    /// is still all zeroes.
    pub fn new(page: &'a mut Page, schema: &'a Schema) -> StorageResult<Self> {
        if page.data()[0] == 0 {
            let mut hp = Self { page, schema };
            hp.initialize();
            Ok(hp)
        } else {
            match PageType::from_u8(page.data()[0])? {
                PageType::Heap => Ok(Self { page, schema }),
                other => Err(StorageError::Corrupted(format!(
                    "expected heap page, found {:?}",
                    other
                ))),
            }
        }
    }

    fn initialize(&mut self) {
        let data = self.page.data_mut();
        data[0] = PageType::Heap as u8;
        data[TUPLE_COUNT_OFFSET..TUPLE_COUNT_OFFSET + 4].copy_from_slice(&0i32.to_le_bytes());
        data[FREE_SPACE_OFFSET..FREE_SPACE_OFFSET + 4]
            .copy_from_slice(&(PAGE_SIZE as i32).to_le_bytes());
    }

    pub fn page_id(&self) -> PageId {
        self.page.id()
    }

    pub fn tuple_count(&self) -> u32 {
        self.read_i32(TUPLE_COUNT_OFFSET) as u32
    }

    fn free_space_offset(&self) -> usize {
        self.read_i32(FREE_SPACE_OFFSET) as usize
    }

    /// Bytes left between the slot array and the payload area.
    pub fn free_space(&self) -> usize {
        let used_front = HEADER_SIZE + self.tuple_count() as usize * SLOT_SIZE;
        self.free_space_offset().saturating_sub(used_front)
    }

    /// Serialize `tuple` into the page. Returns the new slot number, or
    /// `None` when the page has no room; a full page is a routing signal
    /// for the caller, not an error.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> StorageResult<Option<u32>> {
        let payload = serialize_values(tuple.values());

        let count = self.tuple_count() as usize;
        let free_ptr = self.free_space_offset();

        let required = SLOT_SIZE + payload.len();
        let available = free_ptr - (HEADER_SIZE + count * SLOT_SIZE);
        if available < required {
            return Ok(None);
        }

        let new_free_ptr = free_ptr - payload.len();
        let data = self.page.data_mut();
        data[new_free_ptr..free_ptr].copy_from_slice(&payload);

        let slot_offset = HEADER_SIZE + count * SLOT_SIZE;
        data[slot_offset..slot_offset + 4].copy_from_slice(&(new_free_ptr as i32).to_le_bytes());
        data[slot_offset + 4..slot_offset + 8]
            .copy_from_slice(&(payload.len() as i32).to_le_bytes());

        self.write_i32(TUPLE_COUNT_OFFSET, (count + 1) as i32);
        self.write_i32(FREE_SPACE_OFFSET, new_free_ptr as i32);

        Ok(Some(count as u32))
    }

    /// Deserialize the tuple in `slot_id`. Returns `None` for slots past
    /// the tuple count and for tombstoned slots.
    pub fn get_tuple(&self, slot_id: u32) -> StorageResult<Option<Tuple>> {
        if slot_id >= self.tuple_count() {
            return Ok(None);
        }

        let (offset, length) = self.read_slot(slot_id);
        if offset == TOMBSTONE_OFFSET {
            return Ok(None);
        }

        let start = offset as usize;
        let end = start + length as usize;
        if end > PAGE_SIZE {
            return Err(StorageError::Corrupted(format!(
                "slot {} points past the page ({}..{})",
                slot_id, start, end
            )));
        }

        let values = deserialize_values(&self.page.data()[start..end], &self.schema.data_types())?;
        let mut tuple = Tuple::with_schema(values, self.schema);
        tuple.set_rid(RecordId::new(self.page.id(), slot_id));
        Ok(Some(tuple))
    }

    /// Tombstone `slot_id`. The payload bytes stay where they are; free
    /// space is never reclaimed within a page.
    pub fn delete_tuple(&mut self, slot_id: u32) -> StorageResult<()> {
        let count = self.tuple_count();
        if slot_id >= count {
            return Err(StorageError::InvalidSlot {
                slot_id,
                tuple_count: count,
            });
        }

        self.write_slot(slot_id, TOMBSTONE_OFFSET, 0);
        Ok(())
    }

    /// Tombstone the old slot and insert the new image. Returns the slot
    /// the new image landed in, or `None` when the page had no room (the
    /// old slot stays tombstoned either way).
    pub fn update_tuple(&mut self, slot_id: u32, tuple: &Tuple) -> StorageResult<Option<u32>> {
        self.delete_tuple(slot_id)?;
        self.insert_tuple(tuple)
    }

    /// All live tuples in slot order, each tagged with its record id.
    pub fn get_all_tuples(&self) -> StorageResult<Vec<Tuple>> {
        let count = self.tuple_count();
        let mut tuples = Vec::new();

        for slot_id in 0..count {
            if let Some(tuple) = self.get_tuple(slot_id)? {
                tuples.push(tuple);
            }
        }

        Ok(tuples)
    }

    fn read_slot(&self, slot_id: u32) -> (i32, i32) {
        let base = HEADER_SIZE + slot_id as usize * SLOT_SIZE;
        (self.read_i32(base), self.read_i32(base + 4))
    }

    fn write_slot(&mut self, slot_id: u32, offset: i32, length: i32) {
        let base = HEADER_SIZE + slot_id as usize * SLOT_SIZE;
        self.write_i32(base, offset);
        self.write_i32(base + 4, length);
    }

    fn read_i32(&self, offset: usize) -> i32 {
        let data = self.page.data();
        i32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ])
    }

    fn write_i32(&mut self, offset: usize, value: i32) {
        self.page.data_mut()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}
