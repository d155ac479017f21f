mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use devmem_gateway::GatewayServer;
use devmem_memory::{format_results, HybridSearcher, Retention, SearchQuery};
use devmem_store::Database;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::DevmemConfig;

#[derive(Parser)]
#[command(name = "devmem", about = "Developer observation memory with hybrid search")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "devmem.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and the retention scheduler
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Rebuild the vector index from every stored observation
    Reindex,
    /// Run a hybrid search and print the ranked results
    Search {
        /// Free-text query
        query: String,
        /// Only return observations of this type
        #[arg(long = "type")]
        obs_type: Option<String>,
        /// Only return observations from this project
        #[arg(long)]
        project: Option<String>,
        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Run one retention pass and print the report
    Retention,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = DevmemConfig::load(&cli.config).await?;

    let db = Arc::new(Database::open(config.db_path())?);
    let searcher = Arc::new(HybridSearcher::new(db.clone()).with_weights(config.search.weights()));

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);

            // the vocabulary lives in memory only, so every process starts
            // with a rebuild
            match searcher.rebuild_index().await {
                Ok(documents) => info!(documents, "Initial index built"),
                Err(e) => warn!(error = %e, "Initial index build failed"),
            }

            let scheduler = if config.retention.enabled {
                let retention = Arc::new(Retention::new(db.clone(), config.retention.clone()));
                Some(retention.start_scheduler(config.retention.interval()))
            } else {
                info!("Retention scheduler disabled");
                None
            };

            let app = GatewayServer::build(db.clone(), searcher);
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("devmem listening on {}", addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            if let Some(scheduler) = scheduler {
                scheduler.stop().await;
            }
            info!("devmem stopped");
        }
        Commands::Reindex => {
            let documents = searcher.rebuild_index().await?;
            println!("Indexed {documents} observations.");
        }
        Commands::Search {
            query,
            obs_type,
            project,
            limit,
        } => {
            searcher.rebuild_index().await?;
            let results = searcher
                .search(&SearchQuery {
                    text: query,
                    obs_type,
                    project,
                    limit,
                })
                .await?;
            println!("{}", format_results(&results).trim_end());
        }
        Commands::Retention => {
            let retention = Retention::new(db.clone(), config.retention.clone());
            let report = tokio::task::spawn_blocking(move || retention.run_once()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
