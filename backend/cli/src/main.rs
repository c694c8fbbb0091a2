mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use toolkit_gateway::{start_server, GatewayState};
use toolkit_supervisor::ScanSupervisor;

use config::Config;

#[derive(Parser)]
#[command(name = "toolkit")]
#[command(about = "Wildfire toolkit scan supervisor")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the control server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind the HTTP server to
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Show the progress of the current scan
    Status,
    /// Terminate every subprocess of a running server and reset its scan
    Terminate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    toolkit_logging::init_logger(config.log_dir.as_deref(), &config.log_level)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, bind } => {
            let config = Config {
                port: port.unwrap_or(config.port),
                bind_address: bind.unwrap_or(config.bind_address),
                ..config
            };
            run_server(config).await?;
        }
        Commands::Status => query(&config, "/status").await?,
        Commands::Terminate => query(&config, "/terminate-subprocesses").await?,
    }

    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.bind_address, config.port))?;

    let supervisor_config = config.supervisor_config();
    info!(
        addr = %addr,
        program = %supervisor_config.job.program,
        kill_grace_secs = config.kill_grace_secs,
        "Starting toolkit control server"
    );

    let supervisor = Arc::new(ScanSupervisor::new(supervisor_config));
    start_server(addr, GatewayState::new(supervisor)).await
}

async fn query(config: &Config, path: &str) -> Result<()> {
    let url = format!("{}{}", config.base_url(), path);
    match reqwest::Client::new().get(&url).send().await {
        Ok(resp) => {
            let body: serde_json::Value = resp.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Err(_) => {
            println!("Toolkit server is not running at {}", config.base_url());
        }
    }
    Ok(())
}
