use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use backend_scout::engine::DiscoveryEngine;
use backend_scout::netdetect;
use backend_scout::server;
use backend_scout::storage::FileStore;
use backend_scout::types::{DiscoveredBackend, DiscoveryReport};
use backend_scout::{normalize, DiscoveryConfig, HttpProber, NextStep};

use ::time::{format_description::well_known, OffsetDateTime};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// backend-scout — find recorder backends on the local network.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "backend-scout",
    version,
    about = "Find recorder backends on the local network: quick checks of known addresses plus a /24 sweep.",
    long_about = None
)]
struct Cli {
    /// File holding persisted candidates and the selected backend.
    #[arg(long, global = true, default_value = "discovery-state.json")]
    state: PathBuf,

    /// Host this client runs on, probed by quick discovery. Defaults to the first local IPv4.
    #[arg(long = "self-host", global = true)]
    self_host: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Probe localhost, the selected backend and every known candidate.
    Discover {
        /// Write results as pretty JSON to this path (optional).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Sweep hosts .1 through .255 of a /24 on port 3000.
    Scan {
        /// First three octets, e.g. 192.168.1. Defaults to the first local /24.
        prefix: Option<String>,

        /// Write results as pretty JSON to this path (optional).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Probe a manually entered address and remember it if a backend answers.
    Add { address: String },
    /// Probe an address and make it the selected backend.
    Select { address: String },
    /// List remembered candidate addresses.
    Candidates,
    /// Serve the discovery API over HTTP.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let self_host = cli.self_host.clone().or_else(detect_self_host);
    let mut config = DiscoveryConfig::default();
    if let Some(host) = self_host {
        config = config.with_self_host(host);
    }
    let prober = HttpProber::new(config.probe_timeout).context("failed to build HTTP client")?;
    let storage = Arc::new(FileStore::new(&cli.state));
    let engine = Arc::new(DiscoveryEngine::new(config, prober, storage));

    match cli.command {
        Command::Discover { output } => {
            let found = engine.quick_discover().await;
            print_results_table(&found);
            write_output(output.as_deref(), &found);
        }
        Command::Scan { prefix, output } => {
            let prefix = match prefix {
                Some(p) => p,
                None => default_prefix()?,
            };
            let mut rx = engine.subscribe_progress();
            let ticker = tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let p = *rx.borrow_and_update();
                    if p.is_running() {
                        eprint!("\rscanned {}/{}", p.completed, p.total);
                    }
                }
            });
            let summary = engine.scan_subnet(&prefix).await;
            ticker.abort();
            eprintln!();
            let summary = summary?;
            println!("{summary}");
            let found = engine.results().await;
            print_results_table(&found);
            write_output(output.as_deref(), &found);
        }
        Command::Add { address } => match engine.add_manual(&address).await? {
            Some(info) => println!("Found {} at {}", info.display_name, info.address),
            None => println!("No backend answered at {}", address.trim()),
        },
        Command::Select { address } => {
            let Some(info) = engine.add_manual(&address).await? else {
                bail!("no backend answered at {}", address.trim());
            };
            let next = engine.select_backend(&info)?;
            println!("Selected {} ({})", info.display_name, info.address);
            match next {
                NextStep::Login => println!("Backend is initialized; log in to continue."),
                NextStep::Initialize => println!("Backend is not initialized; run its setup first."),
            }
        }
        Command::Candidates => {
            let list = engine.candidates().list();
            if list.is_empty() {
                println!("No remembered backends.");
            }
            for address in list {
                println!("{address}");
            }
        }
        Command::Serve { bind } => {
            let shutdown = CancellationToken::new();
            let ctrl_c = shutdown.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                ctrl_c.cancel();
            });
            println!("Discovery API at http://{bind}/api (Ctrl+C to stop)");
            server::spawn_server(&bind, engine, shutdown).await?;
        }
    }

    Ok(())
}

fn detect_self_host() -> Option<String> {
    netdetect::detect_local_ipv4s()
        .ok()
        .and_then(|ips| ips.first().map(|ip| ip.to_string()))
        .filter(|h| normalize(h).is_some())
}

fn default_prefix() -> Result<String> {
    let prefixes = netdetect::detect_local_prefixes().context("failed to detect local networks")?;
    match prefixes.first() {
        Some(p) => Ok(p.to_string()),
        None => bail!("no local IPv4 network detected; pass a prefix such as 192.168.1"),
    }
}

fn print_results_table(results: &[DiscoveredBackend]) {
    if results.is_empty() {
        println!("No backends found. Add one manually or scan a subnet.");
        return;
    }
    let mut name_w = "name".len();
    let mut addr_w = "address".len();
    for b in results {
        name_w = name_w.max(b.info.display_name.chars().count().min(40));
        addr_w = addr_w.max(b.info.address.as_str().len());
    }

    println!(
        "{:<name_w$}  {:<addr_w$}  {:<15}  {}",
        "name", "address", "state", "",
    );
    println!("{:-<name_w$}  {:-<addr_w$}  {:-<15}", "", "", "");
    for b in results {
        let mut name: String = b.info.display_name.chars().take(40).collect();
        if name.is_empty() {
            name = b.info.address.to_string();
        }
        let state = if b.info.initialized {
            "initialized"
        } else {
            "not initialized"
        };
        let badge = if b.is_new { "new" } else { "" };
        println!(
            "{:<name_w$}  {:<addr_w$}  {:<15}  {}",
            name, b.info.address, state, badge,
        );
    }
}

fn write_output(path: Option<&Path>, found: &[DiscoveredBackend]) {
    let Some(path) = path else { return };
    match write_results_json(path, found) {
        Ok(()) => println!("Wrote JSON results to {}", path.display()),
        Err(e) => eprintln!("Failed to write JSON to {}: {e:#}", path.display()),
    }
}

fn write_results_json(path: &Path, found: &[DiscoveredBackend]) -> Result<()> {
    let report = DiscoveryReport {
        generated_at: now_rfc3339(),
        backends: found.to_vec(),
    };
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, &report)?;
    Ok(())
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
