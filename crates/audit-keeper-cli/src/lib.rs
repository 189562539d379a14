//! # Audit-Keeper CLI
//!
//! Command-line interface for the Audit-Keeper ledger.
//!
//! This module provides CLI commands for:
//! - Recording audit events
//! - Querying, summarizing and exporting the live log
//! - Verifying entry and chain integrity
//! - Running retention sweeps, archival and purge
//!
//! Command results are written to stdout as pretty-printed JSON. Logs go to
//! stderr so output can be piped.

use audit_keeper_core::{
    AuditEntryId, AuditEventType, AuditLedger, ComplianceType, ConfigError, LedgerConfig,
    LedgerError, LogQuery, Sensitivity, Timestamp,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

// ============================================================================
// CLI Structure
// ============================================================================

/// Audit-Keeper CLI - Tamper-evident audit ledger
#[derive(Debug, Parser)]
#[command(name = "audit-keeper")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tamper-evident audit ledger with compliance retention")]
#[command(
    long_about = "Audit-Keeper records compliance-relevant events in hash-chained stores and ages them out under HIPAA, GDPR and SOC 2 retention schedules"
)]
pub struct Cli {
    /// Configuration file path (yaml, toml or json)
    #[arg(short, long, env = "AUDIT_KEEPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log directory, overriding the configuration
    #[arg(long, env = "AUDIT_KEEPER_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Record an audit event
    Append {
        /// Event type name or integer code
        #[arg(short = 't', long)]
        event_type: AuditEventType,

        /// Event description
        #[arg(short, long)]
        description: String,

        /// Optional metadata, stored verbatim
        #[arg(short, long)]
        metadata: Option<String>,

        /// Sensitivity (public, low, medium, high, critical)
        #[arg(short, long, default_value = "low")]
        sensitivity: Sensitivity,
    },

    /// Query live entries
    Query {
        /// Only entries at or after this RFC 3339 time
        #[arg(long)]
        since: Option<Timestamp>,

        /// Only entries at or before this RFC 3339 time
        #[arg(long)]
        until: Option<Timestamp>,

        /// Filter by event type
        #[arg(short = 't', long)]
        event_type: Option<AuditEventType>,

        /// Filter by compliance type (General, HIPAA, GDPR, SOC2)
        #[arg(short = 'C', long)]
        compliance: Option<ComplianceType>,

        /// Show only the most recent entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show one live entry
    Show {
        /// Entry id
        id: AuditEntryId,
    },

    /// Show live log statistics
    Stats,

    /// Export live entries to a JSON document
    Export {
        /// Output file; defaults to the export directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Filter by event type
        #[arg(short = 't', long)]
        event_type: Option<AuditEventType>,

        /// Filter by compliance type
        #[arg(short = 'C', long)]
        compliance: Option<ComplianceType>,
    },

    /// Verify the integrity of one entry
    Verify {
        /// Entry id
        id: AuditEntryId,
    },

    /// Verify every live store chain
    VerifyChain,

    /// Retention policy commands
    Retention {
        #[command(subcommand)]
        action: RetentionCommands,
    },

    /// Move entries older than a number of days to the archive
    Archive {
        /// Age threshold in days; 0 archives everything
        #[arg(long)]
        older_than_days: u32,
    },

    /// Delete archive files older than a number of days
    Purge {
        /// Age threshold in days; defaults to the longest policy archive window
        #[arg(long)]
        older_than_days: Option<u32>,
    },

    /// List archived entries
    Archived,
}

/// Retention policy commands
#[derive(Debug, Subcommand)]
pub enum RetentionCommands {
    /// Remove expired entries, archiving where the policy requires it
    Apply,

    /// List configured retention policies
    Policies,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Ledger(_) => 2,
            Self::CommandFailed { .. } => 3,
            Self::InvalidArgument { .. } => 4,
            Self::Io(_) => 5,
            Self::Output(_) => 6,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    let config = load_configuration(&cli)?;
    let ledger = AuditLedger::open(&config).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute_command(cli.command, &ledger, &mut out).await
}

/// Initialize logging based on CLI arguments
///
/// `RUST_LOG` takes precedence over `--log-level`.
pub fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::try_new(&cli.log_level).map_err(|e| {
            CliError::InvalidArgument {
                arg: "log-level".to_string(),
                message: e.to_string(),
            }
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = if cli.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| CliError::CommandFailed {
        message: format!("Failed to initialize logging: {}", e),
    })
}

/// Resolve ledger configuration from the file, environment and flags
pub fn load_configuration(cli: &Cli) -> Result<LedgerConfig, CliError> {
    let mut config = LedgerConfig::load(cli.config.as_deref())?;

    if let Some(log_dir) = &cli.log_dir {
        config.log_directory = log_dir.clone();
    } else if config.log_directory == LedgerConfig::default().log_directory {
        if let Some(data_dir) = dirs::data_local_dir() {
            config.log_directory = data_dir.join("audit-keeper").join("audit-logs");
        }
    }

    debug!(log_directory = %config.log_directory.display(), "Configuration resolved");
    Ok(config)
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Execute a command against `ledger`, writing results to `out`
pub async fn execute_command(
    command: Commands,
    ledger: &AuditLedger,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    match command {
        Commands::Append {
            event_type,
            description,
            metadata,
            sensitivity,
        } => {
            let entry = ledger
                .append(event_type, description, metadata, sensitivity)
                .await?;
            if entry.is_none() {
                info!("Audit logging is disabled; nothing recorded");
            }
            print_json(out, &entry)
        }

        Commands::Query {
            since,
            until,
            event_type,
            compliance,
            limit,
        } => {
            let query = build_query(since, until, event_type, compliance)?;
            let mut entries = ledger.get_logs(&query).await;
            if let Some(limit) = limit {
                let skip = entries.len().saturating_sub(limit);
                entries.drain(..skip);
            }
            print_json(out, &entries)
        }

        Commands::Show { id } => match ledger.get_entry(&id).await {
            Some(entry) => print_json(out, &entry),
            None => Err(CliError::CommandFailed {
                message: format!("Entry {} not found", id),
            }),
        },

        Commands::Stats => print_json(out, &ledger.get_statistics().await),

        Commands::Export {
            output,
            event_type,
            compliance,
        } => {
            let query = build_query(None, None, event_type, compliance)?;
            let path = ledger.export_matching(&query, output.as_deref()).await?;
            print_json(out, &json!({ "Path": path }))
        }

        Commands::Verify { id } => {
            let valid = ledger.verify_integrity(&id).await;
            print_json(out, &json!({ "Id": id, "Valid": valid }))?;
            if valid {
                Ok(())
            } else {
                Err(CliError::CommandFailed {
                    message: format!("Entry {} failed integrity verification", id),
                })
            }
        }

        Commands::VerifyChain => {
            let result = ledger.verify_chain().await;
            print_json(out, &result)?;
            if result.is_intact() {
                Ok(())
            } else {
                Err(CliError::CommandFailed {
                    message: "Chain verification found problems".to_string(),
                })
            }
        }

        Commands::Retention { action } => match action {
            RetentionCommands::Apply => {
                let removed = ledger.apply_retention_policies().await;
                print_json(out, &json!({ "Removed": removed }))
            }
            RetentionCommands::Policies => print_json(out, &ledger.policies().list()),
        },

        Commands::Archive { older_than_days } => {
            let archived = ledger.archive_old_logs(older_than_days).await;
            print_json(out, &json!({ "Archived": archived }))
        }

        Commands::Purge { older_than_days } => {
            let purged = match older_than_days {
                Some(days) => ledger.purge_archived_logs(days).await,
                None => ledger.purge_expired_archives().await,
            };
            print_json(out, &json!({ "PurgedFiles": purged }))
        }

        Commands::Archived => print_json(out, &ledger.list_archived_logs().await),
    }
}

fn build_query(
    since: Option<Timestamp>,
    until: Option<Timestamp>,
    event_type: Option<AuditEventType>,
    compliance: Option<ComplianceType>,
) -> Result<LogQuery, CliError> {
    if let (Some(since), Some(until)) = (since, until) {
        if since > until {
            return Err(CliError::InvalidArgument {
                arg: "since".to_string(),
                message: format!("{} is after --until {}", since, until),
            });
        }
    }

    Ok(LogQuery {
        start: since,
        end: until,
        event_type,
        compliance_type: compliance,
    })
}

fn print_json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
