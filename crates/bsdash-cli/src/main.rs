//! bsdash CLI: serve the dashboard or inspect a QC directory from a terminal.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bsdash::catalog::DashboardConfig;
use bsdash::poller::{FileStatusSource, StatusSource};
use bsdash::stats::format_duration;
use bsdash::status::{summary_text, StageCode};
use bsdash::{Dashboard, EngineConfig, SubjectStatus};
use bsdash_server::{serve, ServerConfig};

#[derive(Parser)]
#[command(
    name = "bsdash",
    about = "🧠 bsdash: live progress dashboard for BrainSuite pipeline runs",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web dashboard server
    Serve {
        /// Path to the QC directory
        #[arg(default_value = "./QC")]
        dir: PathBuf,
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to bind to
        #[arg(long, short, default_value_t = 8080)]
        port: u16,
        /// Status poll interval in milliseconds
        #[arg(long, short, default_value_t = 1000)]
        interval: u64,
        /// Start with polling paused
        #[arg(long)]
        paused: bool,
        /// Also write daily rolling log files to this directory
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Print every subject's status once
    Status {
        /// Path to the QC directory
        #[arg(default_value = "./QC")]
        dir: PathBuf,
    },
    /// Follow a run with terminal progress bars until it ends
    Watch {
        /// Path to the QC directory
        #[arg(default_value = "./QC")]
        dir: PathBuf,
        /// Status poll interval in milliseconds
        #[arg(long, short, default_value_t = 1000)]
        interval: u64,
    },
    /// Show the effective stage and output catalog
    Catalog {
        /// Path to the QC directory
        #[arg(default_value = "./QC")]
        dir: PathBuf,
        /// Output format
        #[arg(long, short, default_value = "table", value_parser = ["table", "yaml", "json"])]
        format: String,
    },
    /// Write a QC exclusion list with every subject included
    ExportTemplate {
        /// Path to the QC directory
        #[arg(default_value = "./QC")]
        dir: PathBuf,
        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// Console logging on stderr, plus a daily rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact();

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "bsdash.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = match &cli.command {
        Commands::Serve { log_dir, .. } => log_dir.clone(),
        _ => None,
    };
    let _guard = init_tracing(log_dir.as_deref());

    match cli.command {
        Commands::Serve {
            dir,
            host,
            port,
            interval,
            paused,
            log_dir: _,
        } => {
            cmd_serve(dir, host, port, interval, paused).await?;
        }
        Commands::Status { dir } => {
            cmd_status(dir)?;
        }
        Commands::Watch { dir, interval } => {
            cmd_watch(dir, interval).await?;
        }
        Commands::Catalog { dir, format } => {
            cmd_catalog(dir, format)?;
        }
        Commands::ExportTemplate { dir, output } => {
            cmd_export_template(dir, output)?;
        }
    }

    Ok(())
}

// ─── Command implementations ──────────────────────────────────────────────────

fn poll_interval(millis: u64) -> Result<Duration> {
    if millis == 0 {
        anyhow::bail!("Poll interval must be positive");
    }
    Ok(Duration::from_millis(millis))
}

fn load_dashboard(dir: &Path) -> Result<Dashboard> {
    if !dir.exists() {
        anyhow::bail!("QC directory not found: {}", dir.display());
    }
    Ok(Dashboard::load(&EngineConfig::new(dir))?)
}

fn poll_once(dashboard: &mut Dashboard, source: &FileStatusSource) {
    let seq = dashboard.next_poll_seq();
    dashboard.apply_poll(seq, source.fetch());
}

async fn cmd_serve(dir: PathBuf, host: String, port: u16, interval: u64, paused: bool) -> Result<()> {
    println!("🧠 BrainSuite Dashboard");
    println!("   QC directory: {}", dir.display());
    println!("   URL:          http://{}:{}", host, port);
    println!("   Polling:      every {} ms{}", interval, if paused { " (paused)" } else { "" });
    println!();

    let config = ServerConfig {
        qc_dir: dir,
        host,
        port,
        poll_interval: poll_interval(interval)?,
        start_paused: paused,
    };
    serve(config).await?;
    Ok(())
}

fn status_cell(status: &SubjectStatus, dashboard: &Dashboard) -> String {
    let summary = summary_text(&status.classify().summary(dashboard.catalog()));
    match status {
        SubjectStatus::Malformed { raw, .. } => format!("{} [{}]", summary, raw),
        _ => summary,
    }
}

fn cmd_status(dir: PathBuf) -> Result<()> {
    let mut dashboard = load_dashboard(&dir)?;
    let source = FileStatusSource::new(&dir);
    poll_once(&mut dashboard, &source);

    if let Some(err) = &dashboard.poll_health().last_error {
        println!("⚠️  Could not read {}: {}", source.describe(), err);
    }

    let view = dashboard.view();
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["Subject", "Progress", "Status"]);
    for (row, status) in view.rows.iter().zip(dashboard.statuses()) {
        let glyphs: String = row.status.glyphs.iter().map(|g| g.symbol.as_str()).collect();
        table.add_row([row.subject.as_str(), &glyphs, &status_cell(status, &dashboard)]);
    }

    println!("{}", view.header.progress.run_parameters);
    println!("{}", table);
    let counts = dashboard.counts();
    println!(
        "{} of {} subjects reported. {}",
        counts.reported,
        counts.total,
        counts.summary_line()
    );
    println!("{}", dashboard.run_info().state_text());
    Ok(())
}

fn completed_stages(status: &SubjectStatus) -> u64 {
    status
        .codes()
        .map(|codes| {
            codes
                .codes()
                .iter()
                .filter(|c| matches!(c, StageCode::Completed | StageCode::NotRun))
                .count() as u64
        })
        .unwrap_or(0)
}

async fn cmd_watch(dir: PathBuf, interval: u64) -> Result<()> {
    let period = poll_interval(interval)?;
    let mut dashboard = load_dashboard(&dir)?;
    let source = Arc::new(FileStatusSource::new(&dir));
    let stages = dashboard.catalog().stage_count() as u64;
    let started = Instant::now();
    info!(source = %source.describe(), interval_ms = interval, "Watching run");

    let multi = MultiProgress::new();
    let overall = multi.add(ProgressBar::new(dashboard.subjects().len() as u64));
    overall.set_style(
        ProgressStyle::with_template("{prefix:>12} [{bar:40.green/white}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    overall.set_prefix("finished");

    let subject_style =
        ProgressStyle::with_template("{prefix:>12} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> ");
    let bars: Vec<ProgressBar> = dashboard
        .subjects()
        .iter()
        .map(|subject| {
            let bar = multi.add(ProgressBar::new(stages));
            bar.set_style(subject_style.clone());
            bar.set_prefix(subject.clone());
            bar
        })
        .collect();

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                overall.abandon_with_message("interrupted");
                break;
            }
            _ = ticker.tick() => {
                let seq = dashboard.next_poll_seq();
                let fetch = Arc::clone(&source);
                let result = tokio::task::spawn_blocking(move || fetch.fetch()).await?;
                dashboard.apply_poll(seq, result);

                for (bar, status) in bars.iter().zip(dashboard.statuses()) {
                    bar.set_position(completed_stages(status));
                    bar.set_message(status_cell(status, &dashboard));
                }
                let counts = *dashboard.counts();
                overall.set_position(counts.finished as u64);
                let stale = match dashboard.poll_health().consecutive_failures {
                    0 => String::new(),
                    n => format!(" (status stale: {} failed polls)", n),
                };
                overall.set_message(format!(
                    "{} {}{}",
                    format_duration(started.elapsed().as_secs_f64()),
                    counts.summary_line(),
                    stale
                ));

                if dashboard.run_info().ended {
                    overall.finish_with_message(dashboard.run_info().state_text());
                    for bar in &bars {
                        bar.finish();
                    }
                    break;
                }
            }
        }
    }
    Ok(())
}

fn cmd_catalog(dir: PathBuf, format: String) -> Result<()> {
    let dashboard = load_dashboard(&dir)?;
    let catalog = dashboard.catalog();

    match format.as_str() {
        "table" => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(["#", "Image", "Stage", "Group", "Description", "Surface", "Shown"]);
            for (i, artifact) in catalog.artifacts.iter().enumerate() {
                table.add_row([
                    i.to_string(),
                    artifact.image.clone(),
                    format!("{} {}", artifact.stage, catalog.stage_name(artifact.stage_index())),
                    catalog.group_name(artifact.group),
                    artifact.description.clone(),
                    if artifact.surface { "✓" } else { "" }.to_string(),
                    if artifact.show { "✓" } else { "" }.to_string(),
                ]);
            }
            println!(
                "{} stages, {} outputs",
                catalog.stage_count(),
                catalog.artifacts.len()
            );
            println!("{}", table);
        }
        // Same shape as the dashboard config document, so the output can be
        // edited and dropped into the QC directory.
        "yaml" | "json" => {
            let config = DashboardConfig {
                contents: Some(catalog.artifacts.clone()),
                stage_names: Some(catalog.stage_names.clone()),
                group_names: Some(catalog.group_names.clone()),
            };
            let content = if format == "yaml" {
                serde_yaml::to_string(&config)?
            } else {
                serde_json::to_string_pretty(&config)?
            };
            println!("{}", content.trim_end());
        }
        _ => anyhow::bail!("Unknown format: {}", format),
    }
    Ok(())
}

fn cmd_export_template(dir: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let dashboard = load_dashboard(&dir)?;
    let content = dashboard.export_annotations();

    match output {
        Some(path) => {
            std::fs::write(&path, &content)?;
            println!(
                "Exported {} subjects to {}",
                dashboard.subjects().len(),
                path.display()
            );
        }
        None => print!("{}", content),
    }
    Ok(())
}
