use crate::storage::error::StorageResult;
use crate::storage::page::{Page, PageId};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const PAGE_SIZE: usize = 4096;

/// Page-level I/O against a single backing file.
///
/// All operations go through the one file handle; callers serialize access
/// by owning the manager (normally behind the buffer pool's lock).
///
/// There is no explicit close operation: every `write_page` syncs to
/// stable storage, so dropping the manager closes the file with nothing
/// left unflushed.
pub struct DiskManager {
    file: File,
}

impl DiskManager {
    /// Open the data file, creating it if it does not exist.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Self { file })
    }

    /// Read a page from disk.
    ///
    /// A page past the end of the file has simply not been materialized yet;
    /// it reads back as all zeroes rather than an error.
    pub fn read_page(&mut self, page_id: PageId) -> StorageResult<Page> {
        let offset = Self::page_offset(page_id);
        let file_size = self.file.metadata()?.len();

        if offset + PAGE_SIZE as u64 > file_size {
            return Ok(Page::new(page_id));
        }

        let mut buf = Box::new([0u8; PAGE_SIZE]);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf.as_mut())?;

        Ok(Page::from_bytes(page_id, buf))
    }

    /// Write a page to disk, force it to stable storage, and clear the
    /// page's dirty flag.
    pub fn write_page(&mut self, page: &mut Page) -> StorageResult<()> {
        let offset = Self::page_offset(page.id());
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.data())?;
        self.file.sync_all()?;
        page.set_dirty(false);
        Ok(())
    }

    /// Extend the file by exactly one page and return the new page's id.
    pub fn allocate_page(&mut self) -> StorageResult<PageId> {
        let file_size = self.file.metadata()?.len();
        let new_page_id = PageId((file_size / PAGE_SIZE as u64) as u32);
        self.file.set_len(file_size + PAGE_SIZE as u64)?;
        Ok(new_page_id)
    }

    pub fn num_pages(&self) -> StorageResult<u32> {
        let file_size = self.file.metadata()?.len();
        Ok((file_size / PAGE_SIZE as u64) as u32)
    }

    /// Force any outstanding writes to stable storage.
    pub fn flush(&self) -> StorageResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn page_offset(page_id: PageId) -> u64 {
        page_id.0 as u64 * PAGE_SIZE as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_file() -> StorageResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");

        let dm = DiskManager::open(&path)?;
        assert_eq!(dm.num_pages()?, 0);
        assert!(path.exists());

        Ok(())
    }

    #[test]
    fn test_write_and_read_page() -> StorageResult<()> {
        let dir = tempdir()?;
        let mut dm = DiskManager::open(&dir.path().join("test.db"))?;

        let page_id = dm.allocate_page()?;
        let mut page = Page::new(page_id);
        page.data_mut()[0] = 42;
        page.data_mut()[PAGE_SIZE - 1] = 24;
        page.set_dirty(true);

        dm.write_page(&mut page)?;
        assert!(!page.is_dirty());

        let read = dm.read_page(page_id)?;
        assert_eq!(read.data()[0], 42);
        assert_eq!(read.data()[PAGE_SIZE - 1], 24);

        Ok(())
    }

    #[test]
    fn test_read_unmaterialized_page_is_zeroed() -> StorageResult<()> {
        let dir = tempdir()?;
        let mut dm = DiskManager::open(&dir.path().join("test.db"))?;

        let page = dm.read_page(PageId(10))?;
        assert_eq!(page.id(), PageId(10));
        assert!(page.data().iter().all(|&b| b == 0));

        Ok(())
    }

    #[test]
    fn test_allocate_page_extends_file() -> StorageResult<()> {
        let dir = tempdir()?;
        let mut dm = DiskManager::open(&dir.path().join("test.db"))?;

        assert_eq!(dm.allocate_page()?, PageId(0));
        assert_eq!(dm.num_pages()?, 1);
        assert_eq!(dm.allocate_page()?, PageId(1));
        assert_eq!(dm.num_pages()?, 2);

        Ok(())
    }

    #[test]
    fn test_page_boundary_no_overlap() -> StorageResult<()> {
        let dir = tempdir()?;
        let mut dm = DiskManager::open(&dir.path().join("test.db"))?;

        let id0 = dm.allocate_page()?;
        let id1 = dm.allocate_page()?;

        let mut p0 = Page::new(id0);
        p0.data_mut().fill(1);
        let mut p1 = Page::new(id1);
        p1.data_mut().fill(2);

        dm.write_page(&mut p0)?;
        dm.write_page(&mut p1)?;

        assert!(dm.read_page(id0)?.data().iter().all(|&b| b == 1));
        assert!(dm.read_page(id1)?.data().iter().all(|&b| b == 2));

        Ok(())
    }

    #[test]
    fn test_persistence_across_reopen() -> StorageResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");

        {
            let mut dm = DiskManager::open(&path)?;
            let id = dm.allocate_page()?;
            let mut page = Page::new(id);
            page.data_mut()[0] = 99;
            dm.write_page(&mut page)?;
        }

        {
            let mut dm = DiskManager::open(&path)?;
            assert_eq!(dm.num_pages()?, 1);
            assert_eq!(dm.read_page(PageId(0))?.data()[0], 99);
        }

        Ok(())
    }
}
