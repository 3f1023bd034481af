//! GraphGate Server - authorizing GraphQL gateway over PostgreSQL.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use graphgate_core::storage::postgres::PgDatabase;
use graphgate_core::{Engine, StatementRegistry, StatementSelector};
use graphgate_server::{statements, Args, Command, Error, RequestHandler, ServerConfig, StdioTransport};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries responses.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "graphgate_server=info,graphgate_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let command = args.command();
    let config = args.into_config();

    match command {
        Command::Serve => serve(config).await?,
        Command::Import { file } => {
            let (_db, store) = statements::open_store(&config.data_path)?;
            let count = statements::import_file(&store, &file)?;
            println!("imported {} statements", count);
        }
        Command::List => {
            let (_db, store) = statements::open_store(&config.data_path)?;
            for line in statements::list(&store)? {
                println!("{}", line);
            }
        }
    }

    Ok(())
}

async fn serve(config: ServerConfig) -> Result<(), Error> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting GraphGate server");
    tracing::info!(
        data_path = %config.data_path.display(),
        roles_file = ?config.roles_file,
        production = config.production,
        "configuration loaded"
    );

    let engine_config = config.engine_config()?;
    let authenticator = config.authenticator()?;

    let (_store_db, store) = statements::open_store(&config.data_path)?;
    let registry = StatementRegistry::from_store(&store)?;
    if registry.is_empty() {
        tracing::warn!("no approved statements, every query will be rejected");
    }

    tracing::info!("connecting to database");
    let db = PgDatabase::connect(&config.database_url, config.max_connections)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    let selector = StatementSelector::locked(Arc::new(registry), config.cursor_codec());
    let engine = Engine::new(engine_config, Arc::new(db), selector)?;
    let handler = Arc::new(
        RequestHandler::new(Arc::new(engine), authenticator)
            .with_request_timeout(config.request_timeout),
    );

    let transport = StdioTransport::stdio(handler);

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(());
    });

    tracing::info!("server ready, reading requests from stdin");
    match transport.run_until_shutdown(shutdown_rx).await {
        Ok(()) => {
            tracing::info!("server shutdown complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "server error");
            Err(e)
        }
    }
}
