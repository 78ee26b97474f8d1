use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use imcomp::diff::DiffEvent;
use imcomp::state::params::expand_directories;
use imcomp::state::Params;
use imcomp::{AppContext, CacheSize, Session, Verbosity};

/// Align and compare the image outputs of parallel processing pipelines
#[derive(Parser, Debug)]
#[command(name = "imcomp", author, version, about, long_about = None)]
struct Cli {
    /// Set directories, shell patterns allowed
    directories: Vec<String>,

    /// Report to load and update
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Prefix joined in front of every set directory
    #[arg(long)]
    root_dir: Option<String>,

    /// Walk subdirectories (default: true)
    #[arg(long, value_name = "BOOL")]
    recursive: Option<bool>,

    /// Substrings every file name must contain
    #[arg(long, value_delimiter = ',')]
    filters: Vec<String>,

    /// One suffix per set directory
    #[arg(long, value_delimiter = ',')]
    suffix_list: Vec<String>,

    /// Configuration name or path
    #[arg(short, long)]
    config: Option<String>,

    /// Accepted extensions (default: .jpg,.png)
    #[arg(long, value_delimiter = ',')]
    ext: Vec<String>,

    /// Named set, as name:dir:suffix (repeatable)
    #[arg(long)]
    sets: Vec<String>,

    /// Log the time spent in each phase
    #[arg(long)]
    timing: bool,

    /// Where to save the report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Gzip the saved report
    #[arg(long)]
    compress: bool,

    /// Compute the difference columns
    #[arg(long)]
    diff: bool,

    /// File cache size: bytes, K/M/G suffixed, or percent of memory
    #[arg(long, default_value = "10%")]
    cache_size: CacheSize,

    /// Read images straight from disk
    #[arg(long)]
    no_cache: bool,

    /// Load every image of the table into the cache first
    #[arg(long)]
    prefetch: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Warnings and errors only
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn verbosity(&self) -> Verbosity {
        Verbosity {
            quiet: self.quiet,
            debug: self.verbose >= 1,
            trace: self.verbose >= 2,
            timing: self.timing,
            detailed_timing: self.timing && self.verbose >= 1,
        }
    }

    /// Parameters given on the command line, and the keys they set.
    /// Those keys win over the parameters of a loaded report.
    fn params(&self) -> (Params, HashSet<String>) {
        let mut params = Params::new();
        let mut explicit = HashSet::new();
        let mut set = |key: &str, value: serde_json::Value| {
            params.set(key, value);
            explicit.insert(key.to_string());
        };

        if !self.directories.is_empty() {
            set("directory_list", expand_directories(&self.directories).into());
        }
        if let Some(report) = &self.report {
            set("report", report.to_string_lossy().to_string().into());
        }
        if let Some(root_dir) = &self.root_dir {
            set("root_dir", root_dir.clone().into());
        }
        if let Some(recursive) = self.recursive {
            set("recursive", recursive.into());
        }
        if !self.filters.is_empty() {
            set("filters", self.filters.clone().into());
        }
        if !self.suffix_list.is_empty() {
            set("suffix_list", self.suffix_list.clone().into());
        }
        if let Some(config) = &self.config {
            set("config", config.clone().into());
        }
        if !self.ext.is_empty() {
            set("ext", self.ext.clone().into());
        }
        if !self.sets.is_empty() {
            set("sets", self.sets.clone().into());
        }
        if self.timing {
            set("timing", true.into());
        }
        (params, explicit)
    }
}

fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let verbosity = cli.verbosity();
    init_tracing(verbosity);

    if cli.directories.is_empty() && cli.sets.is_empty() && cli.report.is_none() {
        bail!("nothing to compare: give set directories, --sets or --report");
    }

    let context = AppContext::new(cli.cache_size, verbosity);
    let result = run(&cli, context.clone()).await;
    context.shutdown();
    result
}

async fn run(cli: &Cli, context: AppContext) -> anyhow::Result<()> {
    let (params, explicit) = cli.params();
    let mut session = Session::new(context, params, explicit).context("cannot load the comparison configuration")?;

    if cli.no_cache {
        session.set_cache_enabled(false);
    }

    println!("🔍 Scanning image sets...");
    let rows = session.fill_data().context("cannot build the comparison table")?;
    let layout = session.table().layout();
    println!("🖼️  {}", layout.title);
    for set in session.image_sets() {
        println!("   {} (suffix '{}')", set.directory.display(), set.suffix);
    }
    println!("✅ {} rows, {} columns", rows, layout.columns.len());

    if cli.prefetch && session.context().cache().is_enabled() {
        session.load_files_in_cache();
        println!("📦 {}", session.cache_stats());
    }

    if cli.diff && rows > 0 {
        compute_differences(&mut session).await?;
    }

    print_table(&session);

    let save_path = cli.output.clone().or_else(|| cli.report.clone());
    if save_path.is_some() || cli.diff {
        let written = session
            .write_report(save_path.as_deref(), cli.compress, None)
            .context("cannot save the report")?;
        println!("💾 Report saved to {}", written.display());
    }

    Ok(())
}

async fn compute_differences(session: &mut Session) -> anyhow::Result<()> {
    let mut run = session.compute_differences()?;

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner} image diff [{bar:40}] {pos}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut cancelled = false;
    loop {
        tokio::select! {
            event = run.events.recv() => {
                let Some(event) = event else { break };
                if let DiffEvent::Progress(progress) = &event {
                    bar.set_position(u64::from(*progress));
                }
                session.apply_event(event);
            }
            _ = tokio::signal::ctrl_c(), if !cancelled => {
                bar.println("⏹️  Stopping after the current row...");
                session.cancel_differences();
                cancelled = true;
            }
        }
    }
    run.join().await;
    bar.finish_and_clear();

    if let Some(summary) = session.last_diff() {
        println!("⏱️  Image diff took: {:.1} sec", summary.elapsed.as_secs_f64());
        for failure in &summary.failures {
            eprintln!("⚠️  {} / {}: {}", failure.column, failure.identity, failure.reason);
        }
        if summary.cancelled {
            println!("⏹️  Stopped, {} rows computed", summary.computed);
        }
    }
    Ok(())
}

/// Identity and every non-path column, first rows only
fn print_table(session: &Session) {
    const SHOWN: usize = 20;
    let table = session.table();
    let layout = table.layout();
    let shown: Vec<usize> = (1..layout.columns.len())
        .filter(|&i| layout.columns[i] != layout.input_column && !layout.set_columns.contains(&layout.columns[i]))
        .collect();
    if shown.is_empty() || table.is_empty() {
        return;
    }

    let header: Vec<&str> = shown.iter().map(|&i| layout.columns[i].as_str()).collect();
    println!("{:<40} {}", "identity", header.join("  "));
    for identity in table.identities().take(SHOWN) {
        let Some(cells) = table.row(identity) else { continue };
        let values: Vec<String> = shown.iter().map(|&i| cells[i].to_string()).collect();
        println!("{:<40} {}", identity, values.join("  "));
    }
    if table.len() > SHOWN {
        println!("... {} more rows", table.len() - SHOWN);
    }
}
