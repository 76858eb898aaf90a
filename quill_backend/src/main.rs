use anyhow::Result;
use clap::{Parser, Subcommand};
use quill_backend::api;
use quill_backend::config::{QuillConfig, UpstreamConfig};
use quill_backend::telemetry;
use quill_backend::utils;

#[derive(Parser)]
#[command(author, version, about = "Quill blog server")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (Axum) in front of the blog backend
    Serve {
        /// Overrides QUILL_API_PORT
        #[arg(long)]
        port: Option<u16>,
        /// Overrides QUILL_UPSTREAM_URL
        #[arg(long)]
        upstream: Option<String>,
    },
    /// Print the effective configuration and exit
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::print_banner();
    telemetry::init_tracing();

    let args = Args::parse();
    let mut config = QuillConfig::from_env()?;

    match args.command.unwrap_or(Command::Serve {
        port: None,
        upstream: None,
    }) {
        Command::Serve { port, upstream } => {
            if let Some(port) = port {
                config.api_port = port;
            }
            if let Some(upstream) = upstream {
                let timeout = config.upstream.timeout;
                config.upstream = UpstreamConfig::new(upstream)?;
                config.upstream.timeout = timeout;
            }
            tracing::info!(
                port = config.api_port,
                upstream = %config.upstream.base_url,
                secure_cookies = config.cookies.secure,
                "starting Quill HTTP server"
            );
            api::serve_http(config).await
        }
        Command::Config => {
            println!("{config:#?}");
            Ok(())
        }
    }
}
