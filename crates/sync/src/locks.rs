//! In-process serialization of read-modify-write cycles.
//!
//! Two submissions for the same (workbook, sheet, row) would otherwise both
//! read the old cell, add their own delta, and the second batch write would
//! drop the first delta. Holding a [`RowGuard`] across read → batch write
//! closes that window for callers sharing one [`RowLocks`]. Writers in other
//! processes are not covered.

use std::collections::HashSet;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub workbook_id: String,
    pub sheet: String,
    pub row: u32,
}

impl RowKey {
    pub fn new(workbook_id: impl Into<String>, sheet: impl Into<String>, row: u32) -> Self {
        Self {
            workbook_id: workbook_id.into(),
            sheet: sheet.into(),
            row,
        }
    }
}

#[derive(Default)]
pub struct RowLocks {
    held: Mutex<HashSet<RowKey>>,
    released: Condvar,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `key` is free, then hold it until the guard drops.
    pub fn acquire(&self, key: RowKey) -> RowGuard<'_> {
        let mut held = self.held.lock();
        while held.contains(&key) {
            self.released.wait(&mut held);
        }
        held.insert(key.clone());
        RowGuard { locks: self, key }
    }

    pub fn is_held(&self, key: &RowKey) -> bool {
        self.held.lock().contains(key)
    }
}

pub struct RowGuard<'a> {
    locks: &'a RowLocks,
    key: RowKey,
}

impl RowGuard<'_> {
    pub fn key(&self) -> &RowKey {
        &self.key
    }
}

impl Drop for RowGuard<'_> {
    fn drop(&mut self) {
        self.locks.held.lock().remove(&self.key);
        self.locks.released.notify_all();
    }
}
