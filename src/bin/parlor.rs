//! parlor - line-based chat server and console client
//!
//! # Usage
//!
//! ```bash
//! # Run a server on the default port (12345)
//! parlor server
//!
//! # Run a server on a specific port and interface
//! parlor server 4000 --bind 127.0.0.1
//!
//! # Join as alice
//! parlor client localhost 4000 alice
//!
//! # Join and answer the username prompt interactively
//! parlor client localhost
//! ```

use std::net::IpAddr;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{stdin, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use parlor_client::{ChatClient, ClientConfig, ClientEvent};
use parlor_protocol::DEFAULT_PORT;
use parlord::config::ServerConfig;
use parlord::registry::spawn_registry;
use parlord::server::ChatServer;
use parlord::sink::TracingLog;

/// parlor - multi-user chat over plain TCP
#[derive(Parser, Debug)]
#[command(name = "parlor", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the chat server
    Server {
        /// Port to listen on
        #[arg(default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,
    },
    /// Connect to a chat server
    Client {
        /// Server host name or address
        host: String,

        /// Server port
        #[arg(default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Username; asked for interactively when omitted
        username: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Server { port, bind } => run_server(ServerConfig { bind, port }),
        Command::Client {
            host,
            port,
            username,
        } => run_client(ClientConfig {
            host,
            port,
            username,
        }),
    }
}

#[tokio::main]
async fn run_server(config: ServerConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("parlord=info".parse()?)
                .add_directive("parlor=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "parlor server starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry();
    let server = ChatServer::bind(&config, registry, Arc::new(TracingLog), cancel_token)
        .await
        .with_context(|| format!("Could not start server on port {}", config.port))?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("parlor server stopped");
    Ok(())
}

fn run_client(config: ClientConfig) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(chat(config));

    // The stdin reader thread may still be blocked on a read
    runtime.shutdown_background();
    result
}

async fn chat(config: ClientConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let cancel_token = CancellationToken::new();

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                ClientEvent::Connected { addr } => println!("✅ Connected to server {addr}"),
                ClientEvent::Line(line) => println!("{line}"),
                ClientEvent::Disconnected => println!("❌ Disconnected from server."),
            }
        }
    });

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_token.cancel();
        }
    });

    let client = ChatClient::new(config, event_tx, cancel_token);
    let result = client.run(BufReader::new(stdin())).await;

    // Dropping the client closes the event channel so the printer finishes
    drop(client);
    printer.await.context("Output task failed")?;

    result.context("Chat session failed")
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
