//! peershare-ctl: interactive peershare client.

use anyhow::{Context, Result};

use peershare_core::config::PeershareConfig;
use peershare_ctl::console::Console;
use peershare_services::RegistryClient;

fn print_usage() {
    println!("Usage: peershare-ctl [--server <host:port>]");
    println!();
    println!("Console commands:");
    println!("  register <name>-<host>:<port> <file>...     Share files under an identity");
    println!("  unregister <name>-<host>:<port> <file>...   Stop sharing files");
    println!("  list-files                                  Show every shared file");
    println!("  list-users                                  Show every registered identity");
    println!("  download <name>-<host>:<port> [{{src}},...] [{{dst}},...]");
    println!("                                              Fetch files directly from a peer");
    println!("  disconnect                                  Drop this identity from the registry");
    println!("  quit                                        Leave the console");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = PeershareConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        PeershareConfig::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut server = config.client.server_addr();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--server" => {
                i += 1;
                server = args.get(i).context("--server requires a value")?.clone();
            }
            "help" | "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let client = RegistryClient::connect(&server)
        .await
        .with_context(|| format!("failed to connect to the registry at {server}, is peershared running?"))?;
    println!("Connected to the server at {server}.");

    if let Some(every) = config.client.refresh_interval() {
        client.spawn_refresh(every);
    }

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    Console::new(client, config.transfer.copy_buffer_bytes)
        .run(shutdown_tx.subscribe())
        .await
}
