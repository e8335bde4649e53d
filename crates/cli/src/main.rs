// kpi - daily store KPI reporting against the shared monthly workbooks

mod aggregate;
mod backend;
mod exit_codes;
mod render;
mod report;
mod token;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use kpiboard_config::{ConfigError, Settings};
use kpiboard_sync::{KpiError, ServiceError};

use exit_codes::*;

#[derive(Parser)]
#[command(name = "kpi")]
#[command(about = "Submit daily store KPIs to the monthly workbooks and roll them up")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Settings file (default: <config dir>/kpiboard/kpiboard.toml)
    #[arg(long, global = true, env = "KPIBOARD_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run against a JSON workbook fixture instead of Google Drive
    #[arg(long, global = true, value_name = "FILE")]
    offline: Option<PathBuf>,

    /// More log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the metrics, their columns and how they combine
    #[command(after_help = "\
Examples:
  kpi schema
  kpi schema --json | jq '.metrics[].name'")]
    Schema {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find a store's workbook for a month
    #[command(after_help = "\
Examples:
  kpi locate --store 東門店 --month 2026-01
  kpi --offline fixture.json locate --store 東門店 --month 202601")]
    Locate {
        /// Store name as it appears in the workbook name
        #[arg(long)]
        store: String,

        /// Report month (YYYY-MM)
        #[arg(long)]
        month: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what a report would write and how it scores, without writing
    #[command(after_help = "\
Examples:
  kpi preview --store 東門店 --staff 小明 --metric 毛利=1500 --metric 門號=1
  kpi preview --store 東門店 --staff 小明 --date 2026-01-05 --metric 遠傳升續率=0.8
  kpi preview --input report.json --json")]
    Preview {
        #[command(flatten)]
        entry: EntryArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a daily report into the store workbook
    #[command(after_help = "\
Examples:
  kpi submit --store 東門店 --staff 小明 --metric 毛利=1500 --password ****
  KPIBOARD_PASSWORD=**** kpi submit --input report.json --yes --json

Accumulating metrics are added to what the row already holds;
rate metrics replace it. Running the same submit twice counts it twice.")]
    Submit {
        #[command(flatten)]
        entry: EntryArgs,

        /// Store password (or the admin password)
        #[arg(long, env = "KPIBOARD_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,

        /// Output the write outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Roll up a month across every configured store (admin only)
    #[command(after_help = "\
Examples:
  kpi aggregate --month 2026-01 --password ****
  kpi aggregate --month 2026-01 --json > january.json")]
    Aggregate {
        /// Report month (YYYY-MM)
        #[arg(long)]
        month: String,

        /// Admin password
        #[arg(long, env = "KPIBOARD_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the Google Drive access token
    #[command(subcommand)]
    Token(TokenCommands),
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Store a token in the system keychain (prompts when omitted)
    Set {
        token: Option<String>,
    },
    /// Remove the token from the system keychain
    Clear,
    /// Show where the token would be read from
    Status {
        #[arg(long)]
        json: bool,
    },
}

/// Report fields shared by `preview` and `submit`.
#[derive(Args, Debug, Clone, Default)]
pub struct EntryArgs {
    /// Store name
    #[arg(long)]
    pub store: Option<String>,

    /// Staff name (their sheet tab in the workbook)
    #[arg(long)]
    pub staff: Option<String>,

    /// Report date, YYYY-MM-DD (default: today)
    #[arg(long)]
    pub date: Option<String>,

    /// Metric value as NAME=VALUE. Repeatable.
    #[arg(long = "metric", short = 'm', value_name = "NAME=VALUE")]
    pub metrics: Vec<String>,

    /// JSON file with store, staff, date and metrics; flags override it
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("KPI_GIT_HASH"), ")",
        "\ntarget:  ", env!("KPI_TARGET"),
    )
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ctx = Invocation {
        config: cli.config,
        offline: cli.offline,
    };

    let result = match cli.command {
        Commands::Schema { json } => report::cmd_schema(&ctx, json),
        Commands::Locate { store, month, json } => report::cmd_locate(&ctx, &store, &month, json),
        Commands::Preview { entry, json } => report::cmd_preview(&ctx, &entry, json),
        Commands::Submit { entry, password, yes, json } => {
            report::cmd_submit(&ctx, &entry, password.as_deref(), yes, json)
        }
        Commands::Aggregate { month, password, json } => {
            aggregate::cmd_aggregate(&ctx, &month, password.as_deref(), json)
        }
        Commands::Token(cmd) => match cmd {
            TokenCommands::Set { token } => token::cmd_set(token),
            TokenCommands::Clear => token::cmd_clear(),
            TokenCommands::Status { json } => token::cmd_status(json),
        },
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// Global flags every command needs.
pub struct Invocation {
    pub config: Option<PathBuf>,
    pub offline: Option<PathBuf>,
}

impl Invocation {
    pub fn settings_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Settings::default_path)
    }

    pub fn load_settings(&self) -> Result<Settings, CliError> {
        let path = self.settings_path();
        Settings::load(&path).map_err(|e| config_error(e, &path))
    }

    /// Settings when a file is present; commands that can run on defaults
    /// pass `None` through.
    pub fn try_load_settings(&self) -> Result<Option<Settings>, CliError> {
        let path = self.settings_path();
        if self.config.is_none() && !path.exists() {
            return Ok(None);
        }
        Settings::load(&path).map(Some).map_err(|e| config_error(e, &path))
    }
}

fn config_error(err: ConfigError, path: &Path) -> CliError {
    let hint = match &err {
        ConfigError::Io { .. } => Some(format!(
            "create {} with at least root_folder_id, or pass --config",
            path.display()
        )),
        _ => None,
    };
    CliError { code: EXIT_CONFIG, message: err.to_string(), hint }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn service_exit_code(err: &ServiceError) -> u8 {
    match err {
        ServiceError::NotAuthenticated => EXIT_NO_TOKEN,
        ServiceError::Auth(_) => EXIT_REMOTE_AUTH,
        e if e.is_retryable() => EXIT_REMOTE_RETRYABLE,
        _ => EXIT_REMOTE,
    }
}

impl From<KpiError> for CliError {
    fn from(err: KpiError) -> Self {
        let code = match &err {
            KpiError::Validation(_) => EXIT_USAGE,
            KpiError::Schema(_) => EXIT_CONFIG,
            KpiError::WorkbookNotFound { .. } => EXIT_WORKBOOK_NOT_FOUND,
            KpiError::FormatMismatch { .. } => EXIT_FORMAT_MISMATCH,
            KpiError::SheetNotFound { .. } => EXIT_SHEET_NOT_FOUND,
            KpiError::RowOutOfRange { .. } => EXIT_ROW_OUT_OF_RANGE,
            KpiError::TemplateMismatch { .. } => EXIT_TEMPLATE_MISMATCH,
            KpiError::AccessDenied(_) => EXIT_ACCESS_DENIED,
            KpiError::Remote(e) => service_exit_code(e),
        };
        let hint = err.hint();
        Self { code, message: err.to_string(), hint }
    }
}

impl From<ServiceError> for CliError {
    fn from(err: ServiceError) -> Self {
        KpiError::Remote(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_errors_map_to_their_codes() {
        let err: CliError = KpiError::WorkbookNotFound {
            name: "2026_01_東門店業績日報表".into(),
            searched: vec!["202601".into(), "root".into()],
        }
        .into();
        assert_eq!(err.code, EXIT_WORKBOOK_NOT_FOUND);
        assert!(err.hint.is_some());

        let err: CliError = KpiError::RowOutOfRange { day: 31, provisioned: 30 }.into();
        assert_eq!(err.code, EXIT_ROW_OUT_OF_RANGE);
    }

    #[test]
    fn remote_errors_split_by_retryability() {
        assert_eq!(CliError::from(ServiceError::Timeout("t".into())).code, EXIT_REMOTE_RETRYABLE);
        assert_eq!(CliError::from(ServiceError::Http(503, "x".into())).code, EXIT_REMOTE_RETRYABLE);
        assert_eq!(CliError::from(ServiceError::Http(400, "x".into())).code, EXIT_REMOTE);
        assert_eq!(CliError::from(ServiceError::Auth("expired".into())).code, EXIT_REMOTE_AUTH);
        assert_eq!(CliError::from(ServiceError::NotAuthenticated).code, EXIT_NO_TOKEN);
    }

    #[test]
    fn access_denied_has_password_hint() {
        let err: CliError = KpiError::AccessDenied("wrong password".into()).into();
        assert_eq!(err.code, EXIT_ACCESS_DENIED);
        assert!(err.hint.unwrap_or_default().contains("--password"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
