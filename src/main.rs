use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use vdp_recon_rs::analysis::Reasoner;
use vdp_recon_rs::artifacts::ArtifactStore;
use vdp_recon_rs::config::AgentConfig;
use vdp_recon_rs::control;
use vdp_recon_rs::llm::LocalLlm;
use vdp_recon_rs::pipeline::Orchestrator;
use vdp_recon_rs::queue::{JobResult, ReconJob, ScanProcessor, WorkQueue};
use vdp_recon_rs::runner::{ProcessRunner, ToolLine, ToolRunner};
use vdp_recon_rs::server;
use vdp_recon_rs::types::ScanRequest;

/// vdp-recon-rs — queue-driven recon pipeline (subfinder, amass, httpx, katana) with reports.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "vdp-recon-rs",
    version,
    about = "Queue-driven recon pipeline: subdomain discovery, live probing, crawling and reporting.",
    long_about = None
)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root directory for raw tool output and reports (overrides config).
    #[arg(long = "artifacts-dir")]
    artifacts_dir: Option<PathBuf>,

    /// Always run the pipeline, even if a scan already has artifacts.
    #[arg(long = "no-skip", default_value_t = false)]
    no_skip: bool,

    /// Serve the HTTP control API on this address (e.g. 127.0.0.1:8080).
    #[arg(long)]
    serve: Option<String>,

    /// Echo tool output lines to stdout as they arrive.
    #[arg(long = "stream-tools", default_value_t = false)]
    stream_tools: bool,

    /// Run a single scan for this domain and exit instead of starting the REPL.
    #[arg(long)]
    once: Option<String>,

    /// Focus subdomain for `--once`.
    #[arg(long, requires = "once")]
    focus: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = AgentConfig::load_or_default(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = &cli.artifacts_dir {
        config.artifacts_dir = dir.clone();
    }
    if cli.no_skip {
        config.skip_if_artifacts_exist = false;
    }

    println!("vdp-recon-rs configuration:");
    println!("  artifacts    : {}", config.artifacts_dir.display());
    println!("  skip existing: {}", config.skip_if_artifacts_exist);
    for (name, spec) in config.tools.iter() {
        println!("  {name:<13}: {} (timeout {}s)", spec.binary, spec.timeout_secs);
    }
    println!(
        "  local llm    : {}",
        if config.llm.enabled { config.llm.model.as_str() } else { "<disabled>" }
    );

    let mut runner = ProcessRunner::new();
    if cli.stream_tools {
        let (tx, mut rx) = mpsc::unbounded_channel::<ToolLine>();
        runner = runner.with_observer(tx);
        tokio::spawn(async move {
            while let Some(l) = rx.recv().await {
                println!("[{}] {}", l.tool, l.line);
            }
        });
    }
    let runner: Arc<dyn ToolRunner> = Arc::new(runner);

    let store = ArtifactStore::new(&config.artifacts_dir);
    let orchestrator = Orchestrator::new(config.clone(), store, runner);
    let mut reasoner = Reasoner::new();
    if config.llm.enabled {
        reasoner = reasoner.with_llm(LocalLlm::new(config.llm.clone()));
    }
    let job = Arc::new(ReconJob::new(orchestrator, reasoner));

    if let Some(target) = cli.once {
        let request = ScanRequest {
            target,
            focus: cli.focus,
            scan_name: None,
        };
        match job.process(request).await? {
            JobResult::Reported(path) => println!("Report generated: {}", path.display()),
            JobResult::Skipped => println!("Existing results found; scan skipped."),
        }
        return Ok(());
    }

    let queue = Arc::new(WorkQueue::start(job, config.queue.clone()));
    let cancel = queue.cancel_token();

    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nReceived interrupt, shutting down...");
            cancel_ctrlc.cancel();
        }
    });

    if let Some(bind) = cli.serve {
        let queue = queue.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = server::spawn_server(&bind, queue, cancel).await {
                eprintln!("control API error: {e}");
            }
        });
    }

    control::run_repl(&queue, cancel).await?;

    println!("Shutting down agent...");
    queue.shutdown().await;
    println!("Agent stopped.");
    Ok(())
}
