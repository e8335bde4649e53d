//! Which spreadsheet service a command talks to.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kpiboard_config::secrets::get_drive_token;
use kpiboard_config::Settings;
use kpiboard_drive_client::{DriveClient, DriveOptions};
use kpiboard_sync::{AppContext, MemoryService, ServiceError, SheetService};

use crate::{CliError, Invocation};

pub type Connector = Box<dyn Fn() -> Result<Arc<dyn SheetService>, ServiceError> + Send + Sync>;

pub enum Backend {
    /// JSON fixture loaded into memory; written back after a submit.
    Offline { path: PathBuf, service: Arc<MemoryService> },
    Drive(DriveOptions),
}

impl Backend {
    pub fn select(inv: &Invocation, settings: &Settings) -> Result<Self, CliError> {
        match &inv.offline {
            Some(path) => {
                let service = MemoryService::load(path).map_err(|e| {
                    CliError::io(e).with_hint("the --offline file must be a workbook fixture in JSON")
                })?;
                log::debug!("offline backend: {}", path.display());
                Ok(Backend::Offline { path: path.clone(), service: Arc::new(service) })
            }
            None => Ok(Backend::Drive(DriveOptions {
                drive_base: settings.drive.drive_base.clone(),
                sheets_base: settings.drive.sheets_base.clone(),
                timeout: Duration::from_secs(settings.drive.timeout_secs),
                ..DriveOptions::default()
            })),
        }
    }

    /// Client factory for [`AppContext`]. The Drive token is looked up on
    /// every connect so a refreshed token is picked up after expiry.
    pub fn connector(&self) -> Connector {
        match self {
            Backend::Offline { service, .. } => {
                let service = Arc::clone(service);
                Box::new(move || Ok(Arc::clone(&service) as Arc<dyn SheetService>))
            }
            Backend::Drive(options) => {
                let options = options.clone();
                Box::new(move || {
                    let lookup = get_drive_token();
                    let token = lookup.token.ok_or(ServiceError::NotAuthenticated)?;
                    log::debug!("drive token from {}", lookup.source.as_str());
                    let client = DriveClient::with_options(token, options.clone())?;
                    Ok(Arc::new(client) as Arc<dyn SheetService>)
                })
            }
        }
    }

    pub fn context(&self, settings: &Settings) -> AppContext {
        AppContext::new(settings.schema(), settings.root_folder_id.clone(), self.connector())
            .with_options(settings.sync_options())
    }

    /// Save the fixture after a write. No-op against Drive.
    pub fn persist(&self) -> Result<(), CliError> {
        match self {
            Backend::Offline { path, service } => {
                service.save(path).map_err(CliError::io)?;
                log::debug!("saved {}", path.display());
                Ok(())
            }
            Backend::Drive(_) => Ok(()),
        }
    }
}
