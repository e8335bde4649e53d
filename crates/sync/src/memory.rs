//! In-memory spreadsheet backend.
//!
//! Backs unit and integration tests and the CLI's `--offline` mode. State
//! round-trips through a JSON fixture; cells are keyed by A1 address so
//! fixtures stay readable:
//!
//! ```json
//! { "files": [ { "id": "wb-1", "name": "2026_01_東門店業績日報表",
//!                "mime_type": "application/vnd.google-apps.spreadsheet",
//!                "parent": "root",
//!                "sheets": [ { "title": "小明", "cells": { "B19": 1000 } } ] } ] }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::addressing::{a1, CellRange};
use crate::service::{
    CellValue, CellWrite, ContentFilter, FileRef, ServiceError, SheetHandle, SheetService,
    WorkbookHandle, FOLDER_MIME, SPREADSHEET_MIME,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    pub files: Vec<MemoryFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sheets: Vec<MemorySheet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySheet {
    pub title: String,
    #[serde(default)]
    pub cells: BTreeMap<String, CellValue>,
}

struct State {
    store: MemoryStore,
    next_id: u64,
    fail_next: Option<ServiceError>,
    batch_writes: usize,
}

pub struct MemoryService {
    state: Mutex<State>,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryService {
    pub fn new() -> Self {
        Self::from_store(MemoryStore::default())
    }

    pub fn from_store(store: MemoryStore) -> Self {
        let next_id = store.files.len() as u64 + 1;
        Self {
            state: Mutex::new(State {
                store,
                next_id,
                fail_next: None,
                batch_writes: 0,
            }),
        }
    }

    /// Load a JSON fixture.
    pub fn load(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        let store: MemoryStore = serde_json::from_str(&contents)
            .map_err(|e| format!("cannot parse {}: {}", path.display(), e))?;
        Ok(Self::from_store(store))
    }

    /// Write the current state back as a JSON fixture.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| format!("cannot serialize fixture: {}", e))?;
        std::fs::write(path, json).map_err(|e| format!("cannot write {}: {}", path.display(), e))
    }

    pub fn snapshot(&self) -> MemoryStore {
        self.state.lock().store.clone()
    }

    // ── Fixture builders ────────────────────────────────────────────

    pub fn add_folder(&self, name: &str, parent: Option<&str>) -> String {
        self.add_file_at(name, parent, FOLDER_MIME, None)
    }

    pub fn add_workbook(&self, name: &str, parent: Option<&str>, sheets: &[&str]) -> String {
        let id = self.add_file_at(name, parent, SPREADSHEET_MIME, None);
        for title in sheets {
            self.add_sheet(&id, title);
        }
        id
    }

    pub fn add_file_at(
        &self,
        name: &str,
        parent: Option<&str>,
        mime_type: &str,
        created_time: Option<DateTime<Utc>>,
    ) -> String {
        let mut state = self.state.lock();
        let id = loop {
            let candidate = format!("mem-{}", state.next_id);
            state.next_id += 1;
            if !state.store.files.iter().any(|f| f.id == candidate) {
                break candidate;
            }
        };
        state.store.files.push(MemoryFile {
            id: id.clone(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            parent: parent.map(String::from),
            created_time,
            sheets: Vec::new(),
        });
        id
    }

    pub fn add_sheet(&self, workbook_id: &str, title: &str) {
        let mut state = self.state.lock();
        if let Some(file) = state.store.files.iter_mut().find(|f| f.id == workbook_id) {
            file.sheets.push(MemorySheet {
                title: title.to_string(),
                cells: BTreeMap::new(),
            });
        }
    }

    pub fn set_cell(&self, workbook_id: &str, sheet: &str, row: u32, col: u32, value: CellValue) {
        let mut state = self.state.lock();
        if let Some(s) = sheet_mut(&mut state.store, workbook_id, sheet) {
            s.cells.insert(a1(row, col), value);
        }
    }

    pub fn cell(&self, workbook_id: &str, sheet: &str, row: u32, col: u32) -> CellValue {
        let state = self.state.lock();
        state
            .store
            .files
            .iter()
            .find(|f| f.id == workbook_id)
            .and_then(|f| f.sheets.iter().find(|s| s.title == sheet))
            .and_then(|s| s.cells.get(&a1(row, col)).cloned())
            .unwrap_or(CellValue::Empty)
    }

    /// Make the next service call fail with `err`.
    pub fn fail_next(&self, err: ServiceError) {
        self.state.lock().fail_next = Some(err);
    }

    /// Number of successful batch writes so far.
    pub fn batch_writes(&self) -> usize {
        self.state.lock().batch_writes
    }
}

fn sheet_mut<'a>(store: &'a mut MemoryStore, workbook_id: &str, title: &str) -> Option<&'a mut MemorySheet> {
    store
        .files
        .iter_mut()
        .find(|f| f.id == workbook_id)?
        .sheets
        .iter_mut()
        .find(|s| s.title == title)
}

fn not_found(what: &str) -> ServiceError {
    ServiceError::Http(404, format!("{what} not found"))
}

impl State {
    fn check(&mut self) -> Result<(), ServiceError> {
        match self.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn workbook(&self, id: &str) -> Result<&MemoryFile, ServiceError> {
        self.store
            .files
            .iter()
            .find(|f| f.id == id && f.mime_type == SPREADSHEET_MIME)
            .ok_or_else(|| not_found(&format!("spreadsheet {id}")))
    }
}

impl SheetService for MemoryService {
    fn find(
        &self,
        name: &str,
        parent: Option<&str>,
        filter: ContentFilter,
    ) -> Result<Vec<FileRef>, ServiceError> {
        let mut state = self.state.lock();
        state.check()?;
        Ok(state
            .store
            .files
            .iter()
            .filter(|f| f.name == name)
            .filter(|f| parent.map_or(true, |p| f.parent.as_deref() == Some(p)))
            .filter(|f| filter.accepts(&f.mime_type))
            .map(|f| FileRef {
                id: f.id.clone(),
                name: f.name.clone(),
                mime_type: f.mime_type.clone(),
                created_time: f.created_time,
                url: Some(format!("memory://{}", f.id)),
            })
            .collect())
    }

    fn open(&self, file_id: &str) -> Result<WorkbookHandle, ServiceError> {
        let mut state = self.state.lock();
        state.check()?;
        let file = state.workbook(file_id)?;
        Ok(WorkbookHandle {
            id: file.id.clone(),
            name: file.name.clone(),
            url: format!("memory://{}", file.id),
        })
    }

    fn list_sheets(&self, workbook: &WorkbookHandle) -> Result<Vec<String>, ServiceError> {
        let mut state = self.state.lock();
        state.check()?;
        let file = state.workbook(&workbook.id)?;
        Ok(file.sheets.iter().map(|s| s.title.clone()).collect())
    }

    fn read_range(
        &self,
        sheet: &SheetHandle,
        range: &CellRange,
    ) -> Result<Vec<Vec<CellValue>>, ServiceError> {
        let mut state = self.state.lock();
        state.check()?;
        let file = state.workbook(&sheet.workbook_id)?;
        let data = file
            .sheets
            .iter()
            .find(|s| s.title == sheet.title)
            .ok_or_else(|| not_found(&format!("sheet '{}'", sheet.title)))?;

        Ok((range.first_row..=range.last_row)
            .map(|row| {
                (range.first_col..=range.last_col)
                    .map(|col| data.cells.get(&a1(row, col)).cloned().unwrap_or(CellValue::Empty))
                    .collect()
            })
            .collect())
    }

    fn batch_write(&self, sheet: &SheetHandle, writes: &[CellWrite]) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        state.check()?;
        state.workbook(&sheet.workbook_id)?;
        let target = sheet_mut(&mut state.store, &sheet.workbook_id, &sheet.title)
            .ok_or_else(|| not_found(&format!("sheet '{}'", sheet.title)))?;
        for w in writes {
            target.cells.insert(a1(w.row, w.col), w.value.clone());
        }
        state.batch_writes += 1;
        Ok(())
    }
}
