use crate::error::KpiError;
use crate::model::ReportPeriod;
use crate::naming::{legacy_names, month_folder_name, workbook_name};
use crate::service::{ContentFilter, FileRef, SheetService, WorkbookHandle};

/// Resolves (store, month) to the store's monthly workbook.
///
/// Workbooks live either in a `{year}{month:02}` folder under the root
/// folder or, for months filed before the folders existed, directly in the
/// root. When the month folder exists only it is searched.
pub struct WorkbookLocator<'a> {
    service: &'a dyn SheetService,
    root_folder: &'a str,
}

impl<'a> WorkbookLocator<'a> {
    pub fn new(service: &'a dyn SheetService, root_folder: &'a str) -> Self {
        Self { service, root_folder }
    }

    pub fn locate(&self, store: &str, period: ReportPeriod) -> Result<WorkbookHandle, KpiError> {
        if store.trim().is_empty() {
            return Err(KpiError::Validation("store is required".into()));
        }

        let name = workbook_name(period, store);
        let (container, label) = match self.month_folder(period)? {
            Some(folder) => {
                let label = format!("folder {}", folder.name);
                (folder.id, label)
            }
            None => {
                log::debug!("no month folder {} under root; searching root", month_folder_name(period));
                (self.root_folder.to_string(), "root folder".to_string())
            }
        };

        let matches = self.service.find(&name, Some(container.as_str()), ContentFilter::Spreadsheet)?;
        if let Some(file) = newest(matches) {
            log::debug!("located [{}] as {} in {}", name, file.id, label);
            return Ok(self.service.open(&file.id)?);
        }

        // Same name (or an uploaded .xlsx/.xls copy) in another format is a
        // different failure from "nothing there".
        let mut candidates = vec![name.clone()];
        candidates.extend(legacy_names(&name));
        for candidate in &candidates {
            let others = self.service.find(candidate, Some(container.as_str()), ContentFilter::Any)?;
            if let Some(file) = newest(others.into_iter().filter(|f| !f.is_spreadsheet() && !f.is_folder()).collect()) {
                log::warn!("[{}] found as {} ({}), not a spreadsheet", name, file.name, file.mime_type);
                return Err(KpiError::FormatMismatch {
                    name: file.name,
                    mime_type: file.mime_type,
                });
            }
        }

        Err(KpiError::WorkbookNotFound {
            name,
            searched: vec![label],
        })
    }

    fn month_folder(&self, period: ReportPeriod) -> Result<Option<FileRef>, KpiError> {
        let folder_name = month_folder_name(period);
        let folders = self
            .service
            .find(&folder_name, Some(self.root_folder), ContentFilter::Folder)?;
        Ok(newest(folders))
    }
}

/// Most recently created file; ties (or missing timestamps) broken by id so
/// the choice is deterministic.
fn newest(files: Vec<FileRef>) -> Option<FileRef> {
    files
        .into_iter()
        .max_by(|a, b| a.created_time.cmp(&b.created_time).then_with(|| a.id.cmp(&b.id)))
}
