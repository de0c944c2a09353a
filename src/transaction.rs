//! Transaction bookkeeping: lifecycle logging, commit-time flushing, and
//! crash recovery by log replay.

use crate::storage::buffer::BufferPool;
use crate::storage::page::PageId;
use crate::storage::wal::{LogManager, LogRecord, Lsn};
use crate::storage::PAGE_SIZE;
use anyhow::Result;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Lifecycle state of a transaction. Transitions are one-way:
/// Active -> Committed or Active -> Aborted, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// A single transaction handle.
#[derive(Debug)]
pub struct Transaction {
    id: u32,
    state: TransactionState,
}

impl Transaction {
    fn new(id: u32) -> Self {
        Self {
            id,
            state: TransactionState::Active,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }
}

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("transaction {id} is not active (state: {state:?})")]
    NotActive { id: u32, state: TransactionState },
}

/// Creates and tracks transactions, writes their lifecycle records to the
/// log, and replays the log after a crash.
///
/// The surrounding system runs one active transaction at a time; the
/// manager tracks active ids only to catch usage bugs, not to provide
/// isolation.
pub struct TransactionManager {
    log: LogManager,
    buffer_pool: Arc<BufferPool>,
    next_txn_id: u32,
    active: HashSet<u32>,
}

impl TransactionManager {
    pub fn new(log: LogManager, buffer_pool: Arc<BufferPool>) -> Self {
        Self {
            log,
            buffer_pool,
            next_txn_id: 0,
            active: HashSet::new(),
        }
    }

    /// Start a new transaction and log its Begin record.
    pub fn begin(&mut self) -> Result<Transaction> {
        let id = self.next_txn_id;
        self.next_txn_id += 1;

        self.log.append(&LogRecord::Begin { txn_id: id })?;
        self.active.insert(id);
        debug!("begin txn {}", id);

        Ok(Transaction::new(id))
    }

    /// Commit: log the Commit record, force the log, then force every dirty
    /// buffer-pool page (a global flush, not scoped to this transaction).
    pub fn commit(&mut self, txn: &mut Transaction) -> Result<()> {
        self.check_active(txn)?;

        self.log.append(&LogRecord::Commit { txn_id: txn.id })?;
        self.log.flush()?;
        self.buffer_pool.flush_all_pages()?;

        txn.state = TransactionState::Committed;
        self.active.remove(&txn.id);
        debug!("committed txn {}", txn.id);

        Ok(())
    }

    /// Abort: log the Abort record and force the log. No in-memory page
    /// state is undone, since nothing is flushed before commit.
    pub fn abort(&mut self, txn: &mut Transaction) -> Result<()> {
        self.check_active(txn)?;

        self.log.append(&LogRecord::Abort { txn_id: txn.id })?;
        self.log.flush()?;

        txn.state = TransactionState::Aborted;
        self.active.remove(&txn.id);
        debug!("aborted txn {}", txn.id);

        Ok(())
    }

    /// Record a physical page update (full before/after page images) for
    /// the given active transaction. Callers invoke this around mutations
    /// they want redone after a crash; the table heap does not log on its
    /// own.
    pub fn log_page_update(
        &mut self,
        txn: &Transaction,
        page_id: PageId,
        before: Vec<u8>,
        after: Vec<u8>,
    ) -> Result<Lsn> {
        self.check_active(txn)?;
        let lsn = self.log.append(&LogRecord::Update {
            txn_id: txn.id,
            page_id,
            before,
            after,
        })?;
        Ok(lsn)
    }

    pub fn is_active(&self, txn_id: u32) -> bool {
        self.active.contains(&txn_id)
    }

    /// Replay the log after a crash: an analyze pass resolves each
    /// transaction's final state (last record wins), then a redo pass
    /// re-applies the after-image of every Update belonging to a committed
    /// transaction. Uncommitted transactions need no undo because no update
    /// is ever flushed before commit.
    ///
    /// Redo writes literal after-images, so running recovery twice leaves
    /// the same page bytes as running it once.
    pub fn recover(&mut self) -> Result<()> {
        let records = self.log.read_all()?;
        if records.is_empty() {
            return Ok(());
        }

        let mut states: HashMap<u32, TransactionState> = HashMap::new();
        for record in &records {
            match record {
                LogRecord::Begin { txn_id } => {
                    states.insert(*txn_id, TransactionState::Active);
                }
                LogRecord::Commit { txn_id } => {
                    states.insert(*txn_id, TransactionState::Committed);
                }
                LogRecord::Abort { txn_id } => {
                    states.insert(*txn_id, TransactionState::Aborted);
                }
                LogRecord::Update { .. } => {}
            }
        }

        let mut redone = 0usize;
        for record in &records {
            let LogRecord::Update {
                txn_id,
                page_id,
                after,
                ..
            } = record
            else {
                continue;
            };
            if states.get(txn_id) != Some(&TransactionState::Committed) {
                continue;
            }

            let page = self.buffer_pool.fetch_page(*page_id)?;
            {
                let mut guard = page.write();
                let len = after.len().min(PAGE_SIZE);
                guard.data_mut()[..len].copy_from_slice(&after[..len]);
            }
            drop(page);
            self.buffer_pool.unpin_page(*page_id, true);
            redone += 1;
        }

        self.buffer_pool.flush_all_pages()?;
        info!(
            "recovery replayed {} records, redid {} page updates",
            records.len(),
            redone
        );

        // Resume id assignment past every id seen in the log.
        if let Some(max_id) = states.keys().max() {
            self.next_txn_id = self.next_txn_id.max(max_id + 1);
        }

        Ok(())
    }

    fn check_active(&self, txn: &Transaction) -> Result<(), TransactionError> {
        if txn.state != TransactionState::Active {
            return Err(TransactionError::NotActive {
                id: txn.id,
                state: txn.state,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::DiskManager;
    use tempfile::tempdir;

    fn test_manager() -> (TransactionManager, Arc<BufferPool>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let disk = DiskManager::open(&dir.path().join("test.db")).unwrap();
        let pool = Arc::new(BufferPool::new(disk, 10));
        let log = LogManager::open(&dir.path().join("test.log")).unwrap();
        let manager = TransactionManager::new(log, pool.clone());
        (manager, pool, dir)
    }

    #[test]
    fn test_begin_assigns_fresh_ids() -> Result<()> {
        let (mut tm, _pool, _dir) = test_manager();

        let t0 = tm.begin()?;
        let t1 = tm.begin()?;
        assert_eq!(t0.id(), 0);
        assert_eq!(t1.id(), 1);
        assert!(tm.is_active(0));
        assert!(tm.is_active(1));

        Ok(())
    }

    #[test]
    fn test_commit_transitions_state() -> Result<()> {
        let (mut tm, _pool, _dir) = test_manager();

        let mut txn = tm.begin()?;
        assert_eq!(txn.state(), TransactionState::Active);

        tm.commit(&mut txn)?;
        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(!tm.is_active(txn.id()));

        Ok(())
    }

    #[test]
    fn test_commit_twice_is_illegal() -> Result<()> {
        let (mut tm, _pool, _dir) = test_manager();

        let mut txn = tm.begin()?;
        tm.commit(&mut txn)?;

        let err = tm.commit(&mut txn).unwrap_err();
        let err = err.downcast::<TransactionError>()?;
        assert!(matches!(err, TransactionError::NotActive { .. }));

        Ok(())
    }

    #[test]
    fn test_abort_is_terminal() -> Result<()> {
        let (mut tm, _pool, _dir) = test_manager();

        let mut txn = tm.begin()?;
        tm.abort(&mut txn)?;
        assert_eq!(txn.state(), TransactionState::Aborted);

        assert!(tm.commit(&mut txn).is_err());
        assert!(tm.abort(&mut txn).is_err());

        Ok(())
    }

    #[test]
    fn test_log_update_requires_active_txn() -> Result<()> {
        let (mut tm, _pool, _dir) = test_manager();

        let mut txn = tm.begin()?;
        tm.log_page_update(&txn, PageId(0), vec![0], vec![1])?;

        tm.commit(&mut txn)?;
        assert!(tm
            .log_page_update(&txn, PageId(0), vec![0], vec![1])
            .is_err());

        Ok(())
    }

    #[test]
    fn test_recover_redoes_committed_updates_only() -> Result<()> {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let log_path = dir.path().join("test.log");

        // Simulate a crashed process: one committed transaction wrote page
        // 0, one uncommitted transaction wrote page 1; nothing reached the
        // data file.
        {
            let disk = DiskManager::open(&db_path).unwrap();
            let pool = Arc::new(BufferPool::new(disk, 10));
            let log = LogManager::open(&log_path).unwrap();
            let mut tm = TransactionManager::new(log, pool.clone());

            let committed_after = vec![0xAB; PAGE_SIZE];
            let lost_after = vec![0xCD; PAGE_SIZE];

            let mut t0 = tm.begin()?;
            tm.log_page_update(&t0, PageId(0), vec![0; PAGE_SIZE], committed_after)?;
            tm.commit(&mut t0)?;

            let t1 = tm.begin()?;
            tm.log_page_update(&t1, PageId(1), vec![0; PAGE_SIZE], lost_after)?;
            tm.log.flush()?;
            // Crash: t1 never commits, pages never flushed with its data.
        }

        // Restart and recover.
        let disk = DiskManager::open(&db_path).unwrap();
        let pool = Arc::new(BufferPool::new(disk, 10));
        let log = LogManager::open(&log_path).unwrap();
        let mut tm = TransactionManager::new(log, pool.clone());
        assert!(!tm.log.is_empty()?);
        tm.recover()?;

        let p0 = pool.fetch_page(PageId(0))?;
        assert!(p0.read().data().iter().all(|&b| b == 0xAB));
        drop(p0);
        pool.unpin_page(PageId(0), false);

        let p1 = pool.fetch_page(PageId(1))?;
        assert!(p1.read().data().iter().all(|&b| b == 0));
        drop(p1);
        pool.unpin_page(PageId(1), false);

        // New transactions get ids past those in the log.
        let txn = tm.begin()?;
        assert_eq!(txn.id(), 2);

        Ok(())
    }

    #[test]
    fn test_recover_is_idempotent() -> Result<()> {
        let (mut tm, pool, _dir) = test_manager();

        let after = vec![0x5A; PAGE_SIZE];
        let mut txn = tm.begin()?;
        tm.log_page_update(&txn, PageId(0), vec![0; PAGE_SIZE], after)?;
        tm.commit(&mut txn)?;

        tm.recover()?;
        let first: Vec<u8> = {
            let page = pool.fetch_page(PageId(0))?;
            let bytes = page.read().data().to_vec();
            drop(page);
            pool.unpin_page(PageId(0), false);
            bytes
        };

        tm.recover()?;
        let second: Vec<u8> = {
            let page = pool.fetch_page(PageId(0))?;
            let bytes = page.read().data().to_vec();
            drop(page);
            pool.unpin_page(PageId(0), false);
            bytes
        };

        assert_eq!(first, second);
        assert!(first.iter().all(|&b| b == 0x5A));

        Ok(())
    }
}
