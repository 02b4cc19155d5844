// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! gymflow schedule operator tool.
//!
//! Runs the course lifecycle operations against the partitions under
//! `GYMFLOW_DATA_DIR` and the membership directory at `GYMFLOW_DIRECTORY_PATH`.
//! Course files are JSON documents shaped like [`RecurringCourse`]. Reports are
//! printed to stdout as JSON; logs go to stderr.
//!
//! ```text
//! gymflow-schedule sync --course hiit.json
//! gymflow-schedule regenerate --course hiit.json --weeks 6
//! gymflow-schedule purge --course hiit.json
//! gymflow-schedule entries --kind client --id c1 --from 2024-01-01
//! gymflow-schedule complete --kind client --id c1 --entry 3
//! gymflow-schedule join --gym g1 --client c1
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{error, info};

use gymflow_core::{
    Config, FixedClock, MembershipDirectory, PartitionRegistry, RecurringCourse, ScheduleService,
    SqliteMembershipDirectory, SystemClock, TenantKind, TenantRef,
};

#[derive(Debug, Parser)]
#[command(name = "gymflow-schedule", version, about = "Course schedule fan-out for gymflow")]
struct Cli {
    /// Treat this date as today (YYYY-MM-DD)
    #[arg(long, global = true, env = "GYMFLOW_TODAY")]
    today: Option<NaiveDate>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a course's occurrences into the trainer and member calendars
    Sync {
        /// Course JSON file
        #[arg(long)]
        course: PathBuf,
        /// Override the lookahead window
        #[arg(long)]
        weeks: Option<i32>,
    },
    /// Replace a course's future entries with its current pattern
    Regenerate {
        /// Course JSON file
        #[arg(long)]
        course: PathBuf,
        /// Override the lookahead window
        #[arg(long)]
        weeks: Option<i32>,
    },
    /// Remove a course's future entries
    Purge {
        /// Course JSON file
        #[arg(long)]
        course: PathBuf,
    },
    /// List a tenant's entries
    Entries {
        /// Tenant kind
        #[arg(long, value_enum)]
        kind: KindArg,
        /// Tenant id
        #[arg(long)]
        id: String,
        /// First date (default: today)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last date (default: end of the lookahead window)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Mark one of a tenant's entries completed
    Complete {
        /// Tenant kind
        #[arg(long, value_enum)]
        kind: KindArg,
        /// Tenant id
        #[arg(long)]
        id: String,
        /// Entry id
        #[arg(long)]
        entry: i64,
        /// Mark the entry not completed instead
        #[arg(long)]
        undo: bool,
    },
    /// Add a client to a gym
    Join {
        #[arg(long)]
        gym: String,
        #[arg(long)]
        client: String,
    },
    /// Remove a client from a gym
    Leave {
        #[arg(long)]
        gym: String,
        #[arg(long)]
        client: String,
    },
    /// List a gym's clients
    Members {
        #[arg(long)]
        gym: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Trainer,
    Client,
}

impl From<KindArg> for TenantKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Trainer => TenantKind::Trainer,
            KindArg::Client => TenantKind::Client,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gymflow_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        data_dir = ?config.data_dir,
        directory = ?config.directory_path,
        lookahead_weeks = config.lookahead_weeks,
        fanout_concurrency = config.fanout_concurrency,
        "Configuration loaded"
    );

    let registry = Arc::new(PartitionRegistry::from_config(&config));
    let directory = Arc::new(SqliteMembershipDirectory::from_path(&config.directory_path).await?);

    let result = run(cli, &config, registry.clone(), directory.clone()).await;

    registry.close_all().await;
    directory.close().await;

    result
}

async fn run(
    cli: Cli,
    config: &Config,
    registry: Arc<PartitionRegistry>,
    directory: Arc<SqliteMembershipDirectory>,
) -> Result<()> {
    let service = |weeks: Option<i32>| {
        let builder = ScheduleService::builder()
            .config(config)
            .registry(registry.clone())
            .membership(directory.clone());
        let builder = match cli.today {
            Some(today) => builder.clock(Arc::new(FixedClock(today))),
            None => builder.clock(Arc::new(SystemClock)),
        };
        match weeks {
            Some(weeks) => builder.lookahead_weeks(weeks).build(),
            None => builder.build(),
        }
    };

    match cli.command {
        Command::Sync { course, weeks } => {
            let course = load_course(&course)?;
            let report = service(weeks)?.synchronize(&course).await?;
            if !report.is_complete() {
                eprintln!(
                    "warning: {} client calendar(s) could not be updated",
                    report.failed_tenants.len()
                );
            }
            print_json(&report)
        }
        Command::Regenerate { course, weeks } => {
            let course = load_course(&course)?;
            let report = service(weeks)?.regenerate(&course).await?;
            if let Some(warning) = report.partial_failure() {
                eprintln!("warning: {}", warning);
            }
            print_json(&report)
        }
        Command::Purge { course } => {
            let course = load_course(&course)?;
            let report = service(None)?.purge(&course).await?;
            if let Some(warning) = report.partial_failure() {
                eprintln!("warning: {}", warning);
            }
            print_json(&report)
        }
        Command::Entries { kind, id, from, to } => {
            let tenant = TenantRef::new(kind.into(), id);
            let entries = service(None)?.entries_between(&tenant, from, to).await?;
            print_json(&entries)
        }
        Command::Complete {
            kind,
            id,
            entry,
            undo,
        } => {
            let tenant = TenantRef::new(kind.into(), id);
            let entry = service(None)?.complete_entry(&tenant, entry, !undo).await?;
            print_json(&entry)
        }
        Command::Join { gym, client } => {
            directory.join_gym(&gym, &client).await?;
            info!(gym_id = %gym, client_id = %client, "Client joined gym");
            Ok(())
        }
        Command::Leave { gym, client } => {
            if !directory.leave_gym(&gym, &client).await? {
                eprintln!("warning: '{}' was not a member of '{}'", client, gym);
            }
            Ok(())
        }
        Command::Members { gym } => print_json(&directory.list_client_ids(&gym).await?),
    }
}

fn load_course(path: &Path) -> Result<RecurringCourse> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read course file {:?}", path))?;
    let course: RecurringCourse = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse course file {:?}", path))?;
    Ok(course)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
