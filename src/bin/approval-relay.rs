//! approval-relay CLI: run the relay and inspect its state.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use approval_relay::config::{Config, RunMode};
use approval_relay::db::Db;
use approval_relay::engine::{CycleConfig, Dispatcher, QueueDrain, SyncEngine, Worker};
use approval_relay::render::RendererRegistry;
use approval_relay::source::{HttpInstanceSource, InstanceSource};
use approval_relay::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use approval_relay::workflow::WorkflowRegistry;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "approval-relay", about = "Exactly-once print jobs from approval workflows")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the cycle loop until Ctrl-C
    Serve,
    /// Run one cycle now, ignoring working hours
    Cycle,
    /// List pending jobs
    Tasks,
    /// Re-render the latest job of every workflow kind
    Replay,
    /// Row counts and time ranges per table
    Stats,
    /// Remove state recorded at or after a point in time
    Rollback {
        /// Date (2026-03-01) or RFC 3339 timestamp, UTC
        #[arg(long)]
        since: String,
        /// Actually delete; without this only counts are shown
        #[arg(long)]
        apply: bool,
    },
}

/// Everything a command needs, wired from config.
struct Relay {
    config: Config,
    mode: RunMode,
    db: Arc<Db>,
}

impl Relay {
    async fn open() -> anyhow::Result<Self> {
        let config = Config::from_env()?;
        let mode = RunMode::detect(&std::env::current_dir()?);
        let path = config.database_path_for(&mode);
        let db = Db::connect(&path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        db.migrate().await?;
        db.health_check().await?;
        Ok(Self {
            config,
            mode,
            db: Arc::new(db),
        })
    }

    fn telemetry(&self) -> anyhow::Result<TelemetryGuard> {
        Ok(init_telemetry(TelemetryConfig::new(
            self.config.otel_endpoint.clone(),
            self.config.log_level_for(&self.mode),
        ))?)
    }

    fn drain(&self, workflows: &WorkflowRegistry) -> QueueDrain {
        let renderers = RendererRegistry::from_workflows(workflows, &self.config.scratch_dir);
        info!(kinds = ?renderers.kinds(), "renderers registered");
        QueueDrain::new(Arc::clone(&self.db), Arc::new(renderers), self.mode)
    }

    fn worker(&self) -> anyhow::Result<Worker> {
        let workflows = load_workflows(&self.config.workflow_dir)?;
        let source: Arc<dyn InstanceSource> = Arc::new(HttpInstanceSource::new(
            self.config.require_source_url()?,
            self.config.source_token.clone(),
        )?);
        let drain = self.drain(&workflows);

        Ok(Worker::new(
            Arc::new(workflows),
            Arc::new(SyncEngine::new(Arc::clone(&self.db), Arc::clone(&source))),
            Arc::new(Dispatcher::new(Arc::clone(&self.db), source)),
            drain,
            CycleConfig {
                interval: self.config.cycle_interval,
                work_hours: self.config.work_hours,
                scratch_dir: Some(self.config.scratch_dir.clone()),
                ..Default::default()
            },
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let relay = Relay::open().await?;

    match cli.command {
        Command::Serve => cmd_serve(&relay).await,
        Command::Cycle => cmd_cycle(&relay).await,
        Command::Tasks => cmd_tasks(&relay).await,
        Command::Replay => cmd_replay(&relay).await,
        Command::Stats => cmd_stats(&relay).await,
        Command::Rollback { since, apply } => cmd_rollback(&relay, &since, apply).await,
    }
}

async fn cmd_serve(relay: &Relay) -> anyhow::Result<()> {
    let _guard = relay.telemetry()?;
    info!(
        debug = relay.mode.debug,
        no_print = relay.mode.no_print,
        "approval-relay starting"
    );

    if relay.mode.replay_requested() {
        info!("debug test mode: replaying latest jobs, then exiting");
        return cmd_replay_inner(relay).await;
    }

    let worker = relay.worker()?;
    let w = worker.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        w.shutdown();
    });

    worker.run().await?;
    Ok(())
}

async fn cmd_cycle(relay: &Relay) -> anyhow::Result<()> {
    let _guard = relay.telemetry()?;
    let report = relay.worker()?.run_once().await;

    println!("Workflows:  {}", report.workflows);
    println!("Candidates: {}", report.candidates);
    println!("Enqueued:   {}", report.dispatch.enqueued);
    println!("Errors:     {}", report.dispatch.errors + report.sync_failures);
    match report.drain {
        Some(drain) => println!(
            "Drained:    {} delivered, {} failed, {} unroutable",
            drain.delivered, drain.failed, drain.unroutable
        ),
        None => println!("Drained:    queue unavailable"),
    }
    Ok(())
}

async fn cmd_tasks(relay: &Relay) -> anyhow::Result<()> {
    let tasks = relay.db.list_tasks().await?;
    if tasks.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    println!(
        "{:<6}  {:<24}  {:<11}  {:<16}  {:<30}  CREATED",
        "ID", "INSTANCE", "STATUS", "KIND", "TITLE"
    );
    println!("{}", "-".repeat(110));
    for task in &tasks {
        println!(
            "{:<6}  {:<24}  {:<11}  {:<16}  {:<30}  {}",
            task.id,
            truncate(&task.instance_id, 24),
            task.status,
            truncate(&task.workflow_kind, 16),
            truncate(&task.title, 30),
            task.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("\n{} job(s)", tasks.len());
    Ok(())
}

async fn cmd_replay(relay: &Relay) -> anyhow::Result<()> {
    let _guard = relay.telemetry()?;
    cmd_replay_inner(relay).await
}

async fn cmd_replay_inner(relay: &Relay) -> anyhow::Result<()> {
    let workflows = load_workflows(&relay.config.workflow_dir)?;
    let outcomes = relay.drain(&workflows).replay_latest().await?;

    if outcomes.is_empty() {
        println!("Nothing to replay.");
    }
    for outcome in &outcomes {
        println!(
            "{:<16}  {:<24}  {}",
            outcome.workflow_kind,
            outcome.instance_id,
            if outcome.delivered { "ok" } else { "FAILED" }
        );
    }
    Ok(())
}

async fn cmd_stats(relay: &Relay) -> anyhow::Result<()> {
    println!("{:<16}  {:>8}  {:<17}  NEWEST", "TABLE", "ROWS", "OLDEST");
    for stats in relay.db.table_stats().await? {
        let fmt = |ts: Option<DateTime<Utc>>| {
            ts.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        println!(
            "{:<16}  {:>8}  {:<17}  {}",
            stats.table,
            stats.count,
            fmt(stats.oldest),
            fmt(stats.newest)
        );
    }
    Ok(())
}

async fn cmd_rollback(relay: &Relay, since: &str, apply: bool) -> anyhow::Result<()> {
    let since = parse_since(since)?;
    let report = relay.db.rollback_since(since, !apply).await?;

    let verb = if apply { "Deleted" } else { "Would delete" };
    println!("{verb} rows created at or after {since}:");
    println!("  dedup_records:  {}", report.dedup_records);
    println!("  instance_cache: {}", report.instance_cache);
    println!("  task_queue:     {}", report.task_queue);
    if !apply {
        println!("\nRe-run with --apply to delete.");
    }
    Ok(())
}

fn load_workflows(dir: &Path) -> anyhow::Result<WorkflowRegistry> {
    let workflows = WorkflowRegistry::load_from_dir(dir)?;
    if workflows.is_empty() {
        anyhow::bail!("no workflow files found in {}", dir.display());
    }
    Ok(workflows)
}

fn parse_since(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid --since {s:?}, expected 2026-03-01 or RFC 3339"))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max - 1).chain(std::iter::once('~')).collect()
    } else {
        s.to_string()
    }
}
