//! quantlab - Main Entry Point
//!
//! Runs the HTTP server by default, or a one-off analysis subcommand.

use clap::Parser;
use quantlab::cli::{cmd_correlate, cmd_fit, cmd_info, cmd_serve, cmd_stats, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quantlab=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Info { file }) => {
            cmd_info(&file)?;
        }
        Some(Commands::Stats { file, columns }) => {
            cmd_stats(&file, columns.as_deref())?;
        }
        Some(Commands::Correlate { file, columns, method }) => {
            cmd_correlate(&file, columns.as_deref(), &method)?;
        }
        Some(Commands::Fit { file, x, y, model, params, test_split }) => {
            cmd_fit(&file, x, y, &model, params.as_deref(), test_split)?;
        }
        Some(Commands::Serve { host, port }) => {
            cmd_serve(host, port).await?;
        }
        None => {
            cmd_serve(None, None).await?;
        }
    }

    Ok(())
}
