// Deployment settings
// Loaded from ~/.config/kpiboard/kpiboard.toml (or --config / KPIBOARD_CONFIG)

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use kpiboard_sync::score::TargetSet;
use kpiboard_sync::{AccessRole, MetricSchema, StoreRoster, SyncOptions};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "kpiboard.toml";

#[derive(Debug)]
pub enum ConfigError {
    /// Settings file missing or unreadable
    Io { path: PathBuf, message: String },
    /// TOML syntax or type error
    Parse(String),
    /// Parsed but inconsistent
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, message } => write!(f, "cannot read {}: {}", path.display(), message),
            ConfigError::Parse(msg) => write!(f, "config parse error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Top-level settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Drive folder holding the month folders and workbooks.
    pub root_folder_id: String,
    /// Unlocks every store and the aggregate view.
    #[serde(default)]
    pub admin_password: Option<String>,
    #[serde(default)]
    pub drive: DriveSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    /// Replaces the built-in metric schema when present.
    #[serde(default)]
    pub schema: Option<MetricSchema>,
    #[serde(default)]
    pub stores: Vec<StoreConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriveSettings {
    #[serde(default = "default_drive_base")]
    pub drive_base: String,
    #[serde(default = "default_sheets_base")]
    pub sheets_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_drive_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

fn default_sheets_base() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            drive_base: default_drive_base(),
            sheets_base: default_sheets_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub verify_day_column: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub name: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Staff display names, which are also their sheet titles.
    #[serde(default)]
    pub staff: Vec<String>,
    #[serde(default)]
    pub targets: TargetSet,
    /// Per-staff overrides of `targets`.
    #[serde(default)]
    pub staff_targets: BTreeMap<String, TargetSet>,
}

impl Settings {
    /// Default settings file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kpiboard")
            .join(CONFIG_FILE)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        log::debug!("loaded settings from {}", path.display());
        Self::from_toml(&contents)
    }

    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_folder_id.trim().is_empty() {
            return Err(ConfigError::Validation("root_folder_id must not be empty".into()));
        }
        if self.drive.timeout_secs == 0 {
            return Err(ConfigError::Validation("drive.timeout_secs must be >= 1".into()));
        }
        if let Some(schema) = &self.schema {
            schema
                .validate()
                .map_err(|e| ConfigError::Validation(format!("[schema]: {e}")))?;
        }

        let mut names = HashSet::new();
        for store in &self.stores {
            if store.name.trim().is_empty() {
                return Err(ConfigError::Validation("store name must not be empty".into()));
            }
            if !names.insert(store.name.as_str()) {
                return Err(ConfigError::Validation(format!("duplicate store '{}'", store.name)));
            }
            let mut staff = HashSet::new();
            for person in &store.staff {
                if person.trim().is_empty() {
                    return Err(ConfigError::Validation(format!("store '{}': empty staff name", store.name)));
                }
                if !staff.insert(person.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "store '{}': staff '{}' listed twice",
                        store.name, person
                    )));
                }
            }
            check_targets(&store.name, &store.targets)?;
            for (person, targets) in &store.staff_targets {
                check_targets(&format!("{} / {}", store.name, person), targets)?;
            }
        }
        Ok(())
    }

    /// Metric schema in effect: `[schema]` if configured, else built-in.
    pub fn schema(&self) -> MetricSchema {
        self.schema.clone().unwrap_or_else(MetricSchema::builtin)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            verify_day_column: self.sync.verify_day_column,
        }
    }

    pub fn store(&self, name: &str) -> Option<&StoreConfig> {
        self.stores.iter().find(|s| s.name == name)
    }

    /// Every configured store with its staff, in file order.
    pub fn rosters(&self) -> Vec<StoreRoster> {
        self.stores
            .iter()
            .map(|s| StoreRoster::new(s.name.clone(), s.staff.clone()))
            .collect()
    }

    /// Targets for a staff member, falling back to the store's.
    pub fn targets_for(&self, store: &str, staff: Option<&str>) -> TargetSet {
        let Some(config) = self.store(store) else {
            return TargetSet::new();
        };
        staff
            .and_then(|s| config.staff_targets.get(s))
            .unwrap_or(&config.targets)
            .clone()
    }

    /// Store-level targets keyed by store name, for aggregate scoring.
    pub fn store_targets(&self) -> BTreeMap<String, TargetSet> {
        self.stores
            .iter()
            .filter(|s| !s.targets.is_empty())
            .map(|s| (s.name.clone(), s.targets.clone()))
            .collect()
    }

    /// Plaintext password gate. The admin password unlocks everything; a
    /// store password unlocks only that store.
    pub fn authenticate(&self, store: Option<&str>, password: &str) -> Option<AccessRole> {
        if password.is_empty() {
            return None;
        }
        if self.admin_password.as_deref() == Some(password) {
            return Some(AccessRole::Admin);
        }
        let store = self.store(store?)?;
        (store.password.as_deref() == Some(password)).then(|| AccessRole::Store(store.name.clone()))
    }
}

fn check_targets(owner: &str, targets: &TargetSet) -> Result<(), ConfigError> {
    for (metric, goal) in targets {
        if !goal.target.is_finite() || goal.target < 0.0 {
            return Err(ConfigError::Validation(format!(
                "{owner}: target for '{metric}' must be a non-negative number"
            )));
        }
        if !goal.weight.is_finite() {
            return Err(ConfigError::Validation(format!("{owner}: weight for '{metric}' must be finite")));
        }
    }
    Ok(())
}
