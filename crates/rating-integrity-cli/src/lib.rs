//! Embeddable command surface for rating integrity maintenance.
//!
//! Hosts can drive the tool through:
//! - [`run_cli`] for full parsed CLI execution.
//! - [`run_command_with_db`] for a parsed [`Command`] against a DB path.
//! - [`run_command`] for a parsed [`Command`] against an open [`SqliteEntityStore`].
//!
//! Every command prints one pretty JSON document on stdout. Failures are
//! rendered with [`FailureEnvelope`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rating_integrity_core::{
    aggregate_group, applicable_metrics, diagnose, migrate_placeholders, preview_migration,
    repair_ratings, request_claim, resolve_claim, AggregatedScore, ClaimDecision, EntityStore,
    IntegrityError, Metric, RecordFilter, RecordId, RecordSnapshot, DEFAULT_SAMPLE_LIMIT,
};
use rating_integrity_store_sqlite::SqliteEntityStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const AGGREGATE_CONTRACT_VERSION: &str = "aggregate.v1";
const METRICS_CONTRACT_VERSION: &str = "metrics.v1";

#[derive(Debug, Parser)]
#[command(name = "ri")]
#[command(about = "Rating integrity diagnostics, migration and repair")]
pub struct Cli {
    #[arg(
        long,
        env = "RATING_INTEGRITY_DB",
        default_value = "./rating_integrity.sqlite3"
    )]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Report how every rating's target resolves.
    Diagnose(DiagnoseArgs),
    /// Convert placeholder members into objects and relink their ratings.
    Migrate(MigrateArgs),
    /// Relink ratings from leftover placeholders to same-named objects.
    Repair(RepairArgs),
    /// Mean and count per (object, metric) pair for one group.
    Aggregate(AggregateArgs),
    /// Load a JSON export of the record sets.
    Import(ImportArgs),
    /// List the metrics that apply to an object.
    Metrics(MetricsArgs),
    Claim {
        #[command(subcommand)]
        command: ClaimCommand,
    },
}

impl Command {
    /// Checks every identifier argument without touching a store.
    ///
    /// # Errors
    /// Returns [`IntegrityError::Validation`] when a supplied identifier or
    /// claim token is blank.
    pub fn validate(&self) -> Result<()> {
        match self {
            Command::Diagnose(args) => {
                if let Some(raw) = args.group_id.as_deref() {
                    parse_record_id("group_id", raw)?;
                }
            }
            Command::Aggregate(args) => {
                parse_record_id("group_id", &args.group_id)?;
                if let Some(raw) = args.captain_id.as_deref() {
                    parse_record_id("captain_id", raw)?;
                }
            }
            Command::Metrics(args) => {
                parse_record_id("object_id", &args.object_id)?;
            }
            Command::Claim { command } => match command {
                ClaimCommand::Request(args) => {
                    parse_record_id("object_id", &args.object_id)?;
                    parse_record_id("user_id", &args.user_id)?;
                }
                ClaimCommand::Approve(args) | ClaimCommand::Reject(args) => {
                    parse_record_id("token", &args.token)?;
                }
            },
            Command::Migrate(_) | Command::Repair(_) | Command::Import(_) => {}
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct DiagnoseArgs {
    #[arg(long)]
    group_id: Option<String>,
    #[arg(long, default_value_t = DEFAULT_SAMPLE_LIMIT)]
    sample_limit: usize,
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Count placeholders per group without writing anything.
    #[arg(long)]
    preview: bool,
}

#[derive(Debug, Args)]
pub struct RepairArgs {
    #[arg(long)]
    dry_run: bool,
    #[arg(long, default_value_t = DEFAULT_SAMPLE_LIMIT)]
    sample_limit: usize,
}

#[derive(Debug, Args)]
pub struct AggregateArgs {
    #[arg(long)]
    group_id: String,
    /// Overrides the captain stored on the group record.
    #[arg(long)]
    captain_id: Option<String>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    #[arg(long)]
    file: PathBuf,
}

#[derive(Debug, Args)]
pub struct MetricsArgs {
    #[arg(long)]
    object_id: String,
}

#[derive(Debug, Subcommand)]
pub enum ClaimCommand {
    Request(ClaimRequestArgs),
    Approve(ClaimTokenArgs),
    Reject(ClaimTokenArgs),
}

#[derive(Debug, Args)]
pub struct ClaimRequestArgs {
    #[arg(long)]
    object_id: String,
    #[arg(long)]
    user_id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    image: Option<String>,
}

#[derive(Debug, Args)]
pub struct ClaimTokenArgs {
    #[arg(long)]
    token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateOutput {
    pub contract_version: String,
    pub group_id: RecordId,
    pub scores: Vec<AggregatedScore>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsOutput {
    pub contract_version: String,
    pub object_id: RecordId,
    pub metrics: Vec<Metric>,
}

/// Generic failure shape. `details` carries the partial report of a failed
/// migration or repair, and is `null` otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureEnvelope {
    pub error: String,
    pub details: Value,
}

impl FailureEnvelope {
    #[must_use]
    pub fn from_error(err: &anyhow::Error) -> Self {
        let details = match err.downcast_ref::<IntegrityError>() {
            Some(IntegrityError::MigrationFailed { partial, .. }) => {
                serde_json::to_value(partial.as_ref()).unwrap_or(Value::Null)
            }
            Some(IntegrityError::RepairFailed { partial, .. }) => {
                serde_json::to_value(partial.as_ref()).unwrap_or(Value::Null)
            }
            _ => Value::Null,
        };

        Self {
            error: format!("{err:#}"),
            details,
        }
    }
}

/// Prints the failure envelope for `err` on stdout.
pub fn print_failure(err: &anyhow::Error) {
    let envelope = FailureEnvelope::from_error(err);
    match serde_json::to_string_pretty(&envelope) {
        Ok(body) => println!("{body}"),
        Err(serialize_err) => {
            eprintln!("failed to render error envelope: {serialize_err}; {err:#}");
        }
    }
}

/// Executes a fully parsed CLI invocation.
///
/// # Errors
/// Returns an error when store open/migrate fails or the requested command fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    run_command_with_db(&cli.db, cli.command)
}

/// Executes a parsed command using the provided `SQLite` DB path.
///
/// # Errors
/// Returns an error when store open/migrate fails or the requested command fails.
pub fn run_command_with_db(db_path: &Path, command: Command) -> Result<()> {
    command.validate()?;
    let mut store = SqliteEntityStore::open(db_path)?;
    store.migrate()?;
    tracing::debug!(db = %db_path.display(), "store ready");
    run_command(command, &mut store)
}

/// Executes a parsed command against an existing store handle.
///
/// # Errors
/// Returns an error when argument validation, a store read, or a store write
/// fails.
pub fn run_command(command: Command, store: &mut SqliteEntityStore) -> Result<()> {
    command.validate()?;
    let output = command_output(command, store)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn command_output(command: Command, store: &mut SqliteEntityStore) -> Result<Value> {
    let value = match command {
        Command::Diagnose(args) => {
            let group_id = args
                .group_id
                .as_deref()
                .map(|raw| parse_record_id("group_id", raw))
                .transpose()?;
            serde_json::to_value(diagnose(&*store, group_id.as_ref(), args.sample_limit)?)?
        }
        Command::Migrate(args) => {
            if args.preview {
                serde_json::to_value(preview_migration(&*store)?)?
            } else {
                serde_json::to_value(migrate_placeholders(store)?)?
            }
        }
        Command::Repair(args) => {
            serde_json::to_value(repair_ratings(store, args.sample_limit, args.dry_run)?)?
        }
        Command::Aggregate(args) => {
            let group_id = parse_record_id("group_id", &args.group_id)?;
            let captain_id = args
                .captain_id
                .as_deref()
                .map(|raw| parse_record_id("captain_id", raw))
                .transpose()?;
            let scores = aggregate_group(&*store, &group_id, captain_id.as_ref())?;
            serde_json::to_value(AggregateOutput {
                contract_version: AGGREGATE_CONTRACT_VERSION.to_string(),
                group_id,
                scores,
            })?
        }
        Command::Import(args) => {
            let snapshot = read_snapshot(&args.file)?;
            serde_json::to_value(store.import_snapshot(&snapshot.decode()?)?)?
        }
        Command::Metrics(args) => {
            let object_id = parse_record_id("object_id", &args.object_id)?;
            let Some(object) = store.fetch_object(&object_id)? else {
                return Err(
                    IntegrityError::Validation(format!("object {object_id} not found")).into(),
                );
            };
            let metrics = store.fetch_metrics(&RecordFilter::group(object.group_id.clone()))?;
            serde_json::to_value(MetricsOutput {
                contract_version: METRICS_CONTRACT_VERSION.to_string(),
                metrics: applicable_metrics(&object, &metrics)
                    .into_iter()
                    .cloned()
                    .collect(),
                object_id,
            })?
        }
        Command::Claim { command } => run_claim(command, store)?,
    };

    Ok(value)
}

fn run_claim(command: ClaimCommand, store: &mut SqliteEntityStore) -> Result<Value> {
    let value = match command {
        ClaimCommand::Request(args) => {
            let object_id = parse_record_id("object_id", &args.object_id)?;
            let user_id = parse_record_id("user_id", &args.user_id)?;
            let claim = request_claim(
                store,
                &object_id,
                &user_id,
                args.name.as_deref(),
                args.image.as_deref(),
            )?;
            serde_json::to_value(claim)?
        }
        ClaimCommand::Approve(args) => {
            serde_json::to_value(resolve_claim(store, &args.token, ClaimDecision::Approve)?)?
        }
        ClaimCommand::Reject(args) => {
            serde_json::to_value(resolve_claim(store, &args.token, ClaimDecision::Reject)?)?
        }
    };
    Ok(value)
}

fn read_snapshot(path: &Path) -> Result<RecordSnapshot> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot file {}", path.display()))?;
    serde_json::from_str(&body)
        .with_context(|| format!("failed to parse snapshot file {}", path.display()))
}

fn parse_record_id(field: &str, raw: &str) -> Result<RecordId> {
    let id = RecordId::new(raw.trim());
    if id.is_blank() {
        return Err(IntegrityError::Validation(format!("{field} MUST not be blank")).into());
    }
    Ok(id)
}
