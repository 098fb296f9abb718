use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use powgate::config::GateConfig;
use powgate::solver::SolverBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "powgate")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gate in front of an upstream origin
    Serve(ServeArgs),
    /// Solve a challenge offline and print the submission
    Solve(SolveArgs),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Origin base URI, e.g. http://127.0.0.1:8080
    #[arg(long)]
    upstream: Option<String>,

    /// Leading zero bits required of a solution
    #[arg(long)]
    difficulty: Option<u32>,

    /// Trust the first X-Forwarded-For entry (only behind a trusted proxy)
    #[arg(long)]
    secondary: bool,

    /// Seconds to wait for the origin, 0 to disable
    #[arg(long)]
    request_timeout: Option<u64>,

    /// Source code link shown on the challenge page
    #[arg(long)]
    source_url: Option<String>,

    /// Log filter, e.g. "info" or "powgate::audit=info,warn"
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to this file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct SolveArgs {
    /// Base64 fingerprint from the challenge page
    fingerprint: String,

    /// Required leading zero bits
    difficulty: u32,

    /// Worker threads
    #[arg(long, default_value = "1")]
    threads: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Serve(serve) => serve_main(serve),
        Command::Solve(solve) => solve_main(solve),
    }
}

fn serve_main(args: ServeArgs) -> Result<()> {
    init_tracing(&args.log_level, args.log_file.as_ref())?;

    let mut config = match &args.config {
        Some(path) => GateConfig::from_json_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => GateConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(upstream) = args.upstream {
        config.upstream = upstream;
    }
    if let Some(difficulty) = args.difficulty {
        config.difficulty = difficulty;
    }
    if args.secondary {
        config.trust_forwarded_for = true;
    }
    if let Some(secs) = args.request_timeout {
        config.request_timeout_secs = secs;
    }
    if args.source_url.is_some() {
        config.source_url = args.source_url;
    }
    config.validate().context("invalid configuration")?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    runtime
        .block_on(powgate::server::run(config))
        .context("gate stopped with an error")
}

fn init_tracing(log_level: &str, log_file: Option<&PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(log_file) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .context("failed to open log file")?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}

fn solve_main(args: SolveArgs) -> Result<()> {
    let fingerprint = STANDARD
        .decode(args.fingerprint.trim())
        .context("fingerprint is not valid base64")?;
    if fingerprint.is_empty() {
        bail!("fingerprint is empty");
    }

    let progress = Arc::new(AtomicU64::new(0));
    let solver = SolverBuilder::default()
        .difficulty(args.difficulty)
        .threads(args.threads)
        .progress(progress.clone())
        .build_validated()?;

    let started = Instant::now();
    let solution = solver.solve(&fingerprint)?;
    let elapsed = started.elapsed();

    eprintln!(
        "found counter {} after {} candidates in {:.2?}",
        solution.counter,
        progress.load(Ordering::Relaxed),
        elapsed
    );
    println!("{}", solution.submission());
    Ok(())
}
