mod backend;
mod config;
mod control;
mod dedup;
mod lead;
mod orchestrator;
mod page;
mod pagination;
mod reader;
mod store;
mod timing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use url::Url;

use backend::BackendClient;
use config::Settings;
use control::{ControlMessage, Controller, ProgressEvent};
use dedup::Deduplicator;
use orchestrator::{
    AlwaysDecline, AlwaysProceed, ConfirmGate, Orchestrator, PipelineOptions, PromptGate, RunEnd,
    DEFAULT_EMAIL_TARGET, MAX_PAGES_PER_SESSION,
};
use page::{HttpPages, Page, SnapshotPages};
use reader::ResultReader;
use store::SqliteStore;
use timing::Timing;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Parser)]
#[command(name = "lead_harvester", about = "Search results lead extractor with local dedup")]
struct Cli {
    /// Collection service base URL (env: LEADS_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,
    /// Dedup database path (env: LEADS_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract leads page by page and upload the new ones
    Run {
        #[command(flatten)]
        source: SourceArgs,
        /// Email goal passed along with the run
        #[arg(short = 't', long, default_value_t = DEFAULT_EMAIL_TARGET)]
        target: u32,
    },
    /// Speak the popup protocol: JSON control messages on stdin, acks and progress on stdout
    Listen {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Show backend lead statistics
    Stats,
    /// Download the backend CSV export
    Export {
        #[arg(short, long, default_value = "leads.csv")]
        out: PathBuf,
    },
    /// Show local dedup state
    Seen,
}

#[derive(Args)]
struct SourceArgs {
    /// Live search results URL
    #[arg(long, conflicts_with = "snapshots", required_unless_present = "snapshots")]
    url: Option<String>,
    /// Directory of saved result pages (*.html, replayed in name order)
    #[arg(long)]
    snapshots: Option<PathBuf>,
    /// Re-walk already processed filters without asking
    #[arg(short = 'y', long)]
    yes: bool,
    /// Skip the processed-filters check
    #[arg(long)]
    no_filter_check: bool,
    /// Skip time-in-role/company parsing
    #[arg(long)]
    no_tenure: bool,
    /// Page budget for one run (1-30)
    #[arg(
        long,
        default_value_t = MAX_PAGES_PER_SESSION as u32,
        value_parser = clap::value_parser!(u32).range(1..=MAX_PAGES_PER_SESSION as i64)
    )]
    max_pages: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if let Some(api_base) = cli.api_base {
        settings.api_base = api_base;
    }
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    let result = match cli.command {
        Commands::Run { source, target } => {
            let pb = ProgressBar::new_spinner();
            let gate: Box<dyn ConfirmGate> = if source.yes {
                Box::new(AlwaysProceed)
            } else {
                Box::new(PromptGate::default().suspending(pb.clone()))
            };
            let Some(orch) = build_orchestrator(&settings, &source, gate)? else {
                return Ok(());
            };
            run_once(orch, target, pb).await
        }
        Commands::Listen { source } => {
            // stdin carries the protocol, so there is nobody to prompt
            let gate: Box<dyn ConfirmGate> = if source.yes {
                Box::new(AlwaysProceed)
            } else {
                Box::new(AlwaysDecline)
            };
            let Some(orch) = build_orchestrator(&settings, &source, gate)? else {
                return Ok(());
            };
            listen(orch).await
        }
        Commands::Stats => {
            let s = BackendClient::new(&settings.api_base).stats().await?;
            println!("Total:        {}", s.total_leads);
            println!("Verified:     {}", s.verified_emails);
            println!("Pending:      {}", s.pending_leads);
            println!("Success Rate: {}%", s.conversion_rate);
            Ok(())
        }
        Commands::Export { out } => {
            let n = BackendClient::new(&settings.api_base).export_csv(&out).await?;
            println!("Wrote {} bytes to {}", n, out.display());
            Ok(())
        }
        Commands::Seen => {
            let dedup = Deduplicator::new(Box::new(SqliteStore::open(&settings.db_path)?));
            let (leads, filters) = dedup.counts()?;
            println!("Lead fingerprints: {}", leads);
            println!("Processed filters: {}", filters);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// `None` when the URL is not on the configured site; the user has been told.
fn build_orchestrator(
    settings: &Settings,
    source: &SourceArgs,
    gate: Box<dyn ConfirmGate>,
) -> Result<Option<Orchestrator>> {
    let options = PipelineOptions {
        check_filters: !source.no_filter_check,
        parse_tenure: !source.no_tenure,
        max_pages: source.max_pages as usize,
    };
    let mut reader = ResultReader::new(options.parse_tenure);

    let page: Box<dyn Page> = match (&source.url, &source.snapshots) {
        (Some(raw), _) => {
            let url = Url::parse(raw).with_context(|| format!("Invalid URL {:?}", raw))?;
            if let Err(e) = config::check_context(&url, &settings.site_host) {
                println!("{}", e);
                return Ok(None);
            }
            let client = reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .context("Failed to create HTTP client")?;
            reader = reader.with_base_url(url.clone());
            Box::new(HttpPages::new(client, url))
        }
        (None, Some(dir)) => Box::new(SnapshotPages::open(dir)?),
        (None, None) => anyhow::bail!("Either --url or --snapshots is required"),
    };

    let dedup = Deduplicator::new(Box::new(SqliteStore::open(&settings.db_path)?));
    let uploader = Arc::new(BackendClient::new(&settings.api_base));
    let orch = Orchestrator::new(
        page,
        dedup,
        uploader,
        gate,
        Timing::from_unit(settings.time_unit),
        options,
    )
    .with_reader(reader);
    Ok(Some(orch))
}

/// `pb` is shared with the confirmation prompt, which hides it while asking.
async fn run_once(orch: Orchestrator, target: u32, pb: ProgressBar) -> Result<()> {
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message("Starting extraction...");
    pb.enable_steady_tick(std::time::Duration::from_millis(120));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let controller = Controller::new(orch, tx);
    controller.handle(ControlMessage::Start { email_target: target });

    let done = controller.wait_idle();
    tokio::pin!(done);

    let report = loop {
        tokio::select! {
            Some(ev) = rx.recv() => {
                if let ProgressEvent::Progress { page, total, status } = ev {
                    pb.set_message(status.unwrap_or_else(|| format!("Page {}: {} leads extracted", page, total)));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                controller.stop();
                pb.set_message("Stopping after the current step...");
            }
            report = &mut done => break report,
        }
    };
    pb.finish_and_clear();

    let Some(report) = report else {
        anyhow::bail!("Extraction task did not finish");
    };
    match &report.end {
        RunEnd::Declined => println!("Skipped: these filters were already processed."),
        RunEnd::Failed(e) => println!("Error: {} (saved {} leads before failing)", e, report.total),
        RunEnd::Stopped => println!("Extraction stopped. Saved {} leads over {} pages.", report.total, report.pages),
        _ => println!("Complete! Extracted {} leads over {} pages.", report.total, report.pages),
    }

    if !report.leads.is_empty() {
        println!(
            "\n{:>3} | {:<24} | {:<28} | {:<20} | {:<16}",
            "#", "Name", "Title", "Company", "Tenure"
        );
        println!("{}", "-".repeat(101));
        for (i, l) in report.leads.iter().enumerate() {
            let tenure = if l.recently_hired && l.time_in_role.is_empty() {
                "recently hired"
            } else {
                l.time_in_role.as_str()
            };
            println!(
                "{:>3} | {:<24} | {:<28} | {:<20} | {:<16}",
                i + 1,
                truncate(&l.name, 24),
                truncate(&l.title, 28),
                truncate(&l.company, 20),
                truncate(tenure, 16)
            );
        }
    }
    Ok(())
}

async fn listen(orch: Orchestrator) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let controller = Controller::new(orch, tx);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    // Single writer keeps acks and events from interleaving mid-line.
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.write_all(b"\n").await;
            let _ = stdout.flush().await;
        }
    });

    let event_tx = out_tx.clone();
    let forward = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            match serde_json::to_string(&ev) {
                Ok(line) => {
                    let _ = event_tx.send(line);
                }
                Err(e) => warn!("Failed to encode event: {}", e),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ControlMessage>(line) {
            Ok(msg) => {
                let ack = controller.handle(msg);
                let _ = out_tx.send(serde_json::to_string(&ack)?);
            }
            Err(e) => warn!("Ignoring message {:?}: {}", line, e),
        }
    }

    // Input closed: let a run in progress finish, then flush.
    if controller.is_running() {
        info!("Input closed, waiting for the current run to finish");
    }
    controller.wait_idle().await;
    drop(controller);
    let _ = forward.await;
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
