use clap::{Parser, Subcommand};
use matchbook::{client, config, engine, server};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "matchbook", about = "Matchbook Trading Server")]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the matching engine and its TCP front-end.
    Server,
    /// Open an interactive trading session against a running server.
    Client {
        /// Server address; defaults to the configured host and port.
        #[arg(short, long)]
        addr: Option<String>,
    },
}

fn init_logging(cfg: &config::AppConfig) {
    match cfg.logger.format {
        config::LogFormat::JSON => {
            tracing_subscriber::fmt()
                .json()
                .with_max_level(cfg.logger.level)
                .with_current_span(true)
                .init();
        }
        config::LogFormat::COMPACT => {
            tracing_subscriber::fmt()
                .compact()
                .with_max_level(cfg.logger.level)
                .init();
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = config::AppConfig::load(cli.config_path.as_ref()).expect("could not load config");

    match cli.command {
        Commands::Server => {
            init_logging(&config);

            let cancellation_token = CancellationToken::new();
            let shutdown = cancellation_token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    shutdown.cancel();
                }
            });

            let engine = Arc::new(engine::Engine::new());
            server::start(&config, engine, cancellation_token)
                .await
                .expect("could not start trading server");
        }
        Commands::Client { addr } => {
            let addr =
                addr.unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));
            client::run(&addr).await.expect("client session failed");
        }
    }
}
