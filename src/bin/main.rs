use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;
use instant_mcp::{ServerConfig, create_server, ensure_state_dir, resolve_state_path};

#[derive(Parser)]
#[command(name = "instant-mcp")]
#[command(version)]
#[command(about = "A dynamic MCP server that lets agents register custom commands at runtime")]
struct Cli {
    /// Path to state file (default: ~/.instant-mcp/state.json)
    #[arg(long, env = "INSTANT_MCP_STATE")]
    state_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol; all logging goes to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("instant_mcp=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let state_path = resolve_state_path(cli.state_file)?;
    info!("State file: {}", state_path.display());
    ensure_state_dir(&state_path)?;

    let config = ServerConfig::new(state_path);
    let server = create_server(&config);

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    server
        .run(stdin, stdout)
        .await
        .inspect_err(|e| tracing::error!("Server error: {:#}", e))?;

    Ok(())
}
