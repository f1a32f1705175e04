//! Wazuh MCP Gateway
//!
//! Exposes the Wazuh Manager REST API as LLM tools over HTTP and SSE.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use wazuh_mcp_gateway::{
    cli::{Cli, Command, OutputFormat},
    config::Config,
    gateway::{AppState, Gateway},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command {
        Some(Command::Tools { format }) => print_tools(&config, format),
        Some(Command::Check) => check_clusters(&config).await,
        Some(Command::Serve) | None => return run_server(config).await,
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
    }
    Ok(config)
}

async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        clusters = config.clusters.len(),
        read_only = config.filter.read_only,
        "Starting Wazuh MCP Gateway"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}

/// `tools` subcommand
fn print_tools(config: &Config, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let state = AppState::from_config(config, Vec::new()).context("building tool catalogue")?;
    let tools = state.visible_tools();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }
        OutputFormat::Text => {
            println!("{} of {} tools enabled:\n", tools.len(), state.registry.len());
            for tool in &tools {
                println!(
                    "  {:<26} {:<13} {:<5} {}",
                    tool.name,
                    tool.category,
                    tool.http_method.as_deref().unwrap_or("-"),
                    tool.description
                );
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// `check` subcommand
async fn check_clusters(config: &Config) -> anyhow::Result<ExitCode> {
    let state = AppState::from_config(config, Vec::new()).context("building gateway state")?;
    let clusters = &state.ctx.clusters;

    if clusters.is_empty() {
        println!("No clusters configured. Set WAZUH_API_URL or add a 'clusters' section.");
        return Ok(ExitCode::FAILURE);
    }

    let mut failed = 0usize;
    for cluster in clusters.iter() {
        match state.ctx.auth.force_refresh(&cluster.name).await {
            Ok(token) => println!(
                "✅ {:<16} {}  token valid until {}",
                cluster.name,
                cluster.base_url,
                token.expires_at.to_rfc3339()
            ),
            Err(e) => {
                failed += 1;
                println!("❌ {:<16} {}  {e}", cluster.name, cluster.base_url);
            }
        }
    }

    println!("\n{} of {} clusters reachable", clusters.len() - failed, clusters.len());
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
