//! Append-only write-ahead log of transaction lifecycle and page mutations.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Log sequence number. Monotonic per process lifetime, starting at 0 on
/// every start; never persisted.
pub type Lsn = u64;

const TAG_BEGIN: u32 = 0;
const TAG_COMMIT: u32 = 1;
const TAG_ABORT: u32 = 2;
const TAG_UPDATE: u32 = 3;

/// One record in the write-ahead log.
///
/// Wire format: 4-byte type tag, 4-byte transaction id; Update records add
/// the page id and two length-prefixed byte images (before, after).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Begin {
        txn_id: u32,
    },
    Commit {
        txn_id: u32,
    },
    Abort {
        txn_id: u32,
    },
    Update {
        txn_id: u32,
        page_id: PageId,
        before: Vec<u8>,
        after: Vec<u8>,
    },
}

impl LogRecord {
    pub fn txn_id(&self) -> u32 {
        match self {
            LogRecord::Begin { txn_id }
            | LogRecord::Commit { txn_id }
            | LogRecord::Abort { txn_id }
            | LogRecord::Update { txn_id, .. } => *txn_id,
        }
    }
}

/// Appends log records to a single log file and replays them for recovery.
pub struct LogManager {
    path: PathBuf,
    writer: BufWriter<File>,
    next_lsn: Lsn,
}

impl LogManager {
    /// Open the log file in append mode, creating it if missing.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            next_lsn: 0,
        })
    }

    /// Append a record, assigning it the next sequence number. The record
    /// lands in the stream buffer; call `flush` to force it to disk.
    pub fn append(&mut self, record: &LogRecord) -> StorageResult<Lsn> {
        let lsn = self.next_lsn;
        self.next_lsn += 1;

        let w = &mut self.writer;
        match record {
            LogRecord::Begin { txn_id } => {
                w.write_u32::<LittleEndian>(TAG_BEGIN)?;
                w.write_u32::<LittleEndian>(*txn_id)?;
            }
            LogRecord::Commit { txn_id } => {
                w.write_u32::<LittleEndian>(TAG_COMMIT)?;
                w.write_u32::<LittleEndian>(*txn_id)?;
            }
            LogRecord::Abort { txn_id } => {
                w.write_u32::<LittleEndian>(TAG_ABORT)?;
                w.write_u32::<LittleEndian>(*txn_id)?;
            }
            LogRecord::Update {
                txn_id,
                page_id,
                before,
                after,
            } => {
                w.write_u32::<LittleEndian>(TAG_UPDATE)?;
                w.write_u32::<LittleEndian>(*txn_id)?;
                w.write_u32::<LittleEndian>(page_id.0)?;
                w.write_u32::<LittleEndian>(before.len() as u32)?;
                w.write_all(before)?;
                w.write_u32::<LittleEndian>(after.len() as u32)?;
                w.write_all(after)?;
            }
        }

        Ok(lsn)
    }

    /// Force buffered records to stable storage.
    pub fn flush(&mut self) -> StorageResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Replay the whole log file from the start, stopping cleanly at EOF.
    pub fn read_all(&self) -> StorageResult<Vec<LogRecord>> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();

        loop {
            let tag = match reader.read_u32::<LittleEndian>() {
                Ok(tag) => tag,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            let txn_id = reader.read_u32::<LittleEndian>()?;

            let record = match tag {
                TAG_BEGIN => LogRecord::Begin { txn_id },
                TAG_COMMIT => LogRecord::Commit { txn_id },
                TAG_ABORT => LogRecord::Abort { txn_id },
                TAG_UPDATE => {
                    let page_id = PageId(reader.read_u32::<LittleEndian>()?);
                    let before = read_image(&mut reader)?;
                    let after = read_image(&mut reader)?;
                    LogRecord::Update {
                        txn_id,
                        page_id,
                        before,
                        after,
                    }
                }
                other => return Err(StorageError::UnknownLogRecordType(other)),
            };
            records.push(record);
        }

        Ok(records)
    }

    /// True when the log file holds no records yet.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(std::fs::metadata(&self.path)?.len() == 0)
    }

    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn
    }
}

fn read_image(reader: &mut impl Read) -> StorageResult<Vec<u8>> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}
