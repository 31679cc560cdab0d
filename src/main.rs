//! twotier-cache - Cache space configuration checker
//!
//! Loads a cache spaces file, builds every space against an in-memory
//! remote store and reports how each one is laid out.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use twotier_cache::{
    CachePriority, CacheRegistry, CacheSpaceConfig, MemoryRemoteStore, RegistryConfig, RemoteStore,
};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Validate a configuration file
    Check { path: Option<PathBuf>, json: bool },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"twotier-cache - Check two-tier cache space configuration

USAGE:
    twotier-cache check [--json] [PATH]
    twotier-cache help

COMMANDS:
    check   Load PATH, build every cache space and print its layout
    help    Show this help message

OPTIONS:
    --json  Print the report as JSON

DEFAULT PATH:
    <config dir>/twotier-cache/spaces.toml

ENVIRONMENT:
    RUST_LOG         Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Help);
    }

    match args[1].as_str() {
        "check" => {
            let mut path = None;
            let mut json = false;
            for arg in &args[2..] {
                match arg.as_str() {
                    "--json" => json = true,
                    flag if flag.starts_with("--") => {
                        return Err(anyhow!("Unknown option: {}", flag));
                    }
                    _ if path.is_some() => {
                        return Err(anyhow!("Usage: twotier-cache check [--json] [PATH]"));
                    }
                    _ => path = Some(PathBuf::from(arg)),
                }
            }
            Ok(Command::Check { path, json })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

/// Layout of one cache space
#[derive(Debug, Serialize)]
struct SpaceReport {
    name: String,
    priority: String,
    strategy: String,
    max_size: u64,
    local_capacity: u64,
    remote_capacity: u64,
    expire_after_write_secs: u64,
    expire_after_access_secs: u64,
}

impl SpaceReport {
    fn from_config(config: &CacheSpaceConfig) -> Result<Self> {
        let (local_capacity, remote_capacity) = match config.priority {
            CachePriority::OnlyLocal => (config.max_size, 0),
            CachePriority::OnlyRemote => (0, config.max_size),
            _ => {
                let capacity = config.capacities()?;
                (capacity.local, capacity.remote)
            }
        };

        Ok(Self {
            name: config.name.clone(),
            priority: format!("{:?}", config.priority),
            strategy: if config.is_two_tier() {
                format!("{:?}", config.change_strategy)
            } else {
                "-".to_string()
            },
            max_size: config.max_size,
            local_capacity,
            remote_capacity,
            expire_after_write_secs: config.expire_after_write.as_secs(),
            expire_after_access_secs: config.expire_after_access.as_secs(),
        })
    }
}

async fn check(path: PathBuf, json: bool) -> Result<()> {
    info!(path = %path.display(), "Checking cache spaces");

    let file = RegistryConfig::load(&path)?;
    let configs = file
        .resolve()
        .with_context(|| format!("Invalid cache space in {:?}", path))?;

    // Build every space so construction-time checks run too. Each space
    // gets its own store so every max-size hint is applied.
    let registry = CacheRegistry::build(
        configs.clone(),
        file.dynamic_fallback,
        |_: &CacheSpaceConfig| -> Arc<dyn RemoteStore<String, serde_json::Value>> {
            Arc::new(MemoryRemoteStore::new())
        },
    )
    .await
    .context("Failed to build cache spaces")?;

    let reports = configs
        .iter()
        .map(SpaceReport::from_config)
        .collect::<Result<Vec<_>>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    println!(
        "{:<20} {:<16} {:<16} {:>8} {:>8} {:>8}",
        "SPACE", "PRIORITY", "STRATEGY", "MAX", "LOCAL", "REMOTE"
    );
    for r in &reports {
        println!(
            "{:<20} {:<16} {:<16} {:>8} {:>8} {:>8}",
            r.name, r.priority, r.strategy, r.max_size, r.local_capacity, r.remote_capacity
        );
    }
    println!(
        "\n{} space(s) OK, dynamic fallback {}",
        registry.len(),
        if file.dynamic_fallback { "on" } else { "off" }
    );

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command
    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    match command {
        Command::Check { path, json } => {
            let path = path.unwrap_or_else(RegistryConfig::default_path);
            if let Err(e) = check(path, json).await {
                error!(error = %e, "Configuration check failed");
                return Err(e);
            }
        }
        Command::Help => {
            print_help();
        }
    }

    Ok(())
}
