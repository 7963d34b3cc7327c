//! cirrid binary entry point.

use clap::{Parser, Subcommand};
use cirrid::table::EntrySource;
use cirrid::config::ConfigSource;
use cirrid::{config, telemetry, Config, DnsServer};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Host DNS daemon routing a zone of logical names to local containers.
#[derive(Parser, Debug)]
#[command(name = "cirrid")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (INI or TOML).
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve DNS and manage the host resolver (default).
    Run,
    /// Build the name table and print it, without touching the host.
    Table,
    /// Write the default configuration file if none exists.
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(Command::InitConfig) = args.command {
        return init_config(&args.config);
    }

    // Load configuration
    let (config, source) = Config::load_with_source(&args.config)?;

    // Initialize telemetry
    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    if source == ConfigSource::BuiltIn {
        warn!(
            path = %args.config.display(),
            "configuration file not found, using built-in defaults"
        );
    }

    match args.command.unwrap_or(Command::Run) {
        Command::Table => print_table(config).await,
        _ => run(config, &args.config).await,
    }
}

async fn run(config: Config, path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        config_file = %path.display(),
        listen_addr = %config.dns.listen_addr,
        zone = %config.zone,
        version = env!("CARGO_PKG_VERSION"),
        "Starting cirrid"
    );

    // Setup graceful shutdown
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });

    let result = DnsServer::new(config).run(cancel).await;

    if let Err(e) = result {
        error!("DNS server error: {}", e);
        return Err(e.into());
    }

    info!("cirrid shutdown complete");
    Ok(())
}

async fn print_table(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let population = DnsServer::new(config).populate().await?;

    for failure in &population.failures {
        warn!(entry = %failure.name, error = %failure.error, "skipped");
    }
    for (key, entry) in population.table.iter() {
        let source = match entry.source {
            EntrySource::Explicit => "explicit",
            EntrySource::Derived => "derived",
        };
        println!("{:<40} {:<15} {}", key.to_string(), entry.address, source);
    }
    Ok(())
}

fn init_config(path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    if config::write_default(path)? {
        println!("wrote {}", path.display());
    } else {
        println!("{} already exists, left unchanged", path.display());
    }
    Ok(())
}

/// Wait for Ctrl+C, or SIGTERM where available.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "cannot listen for SIGTERM"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
