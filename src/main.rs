// Deskportal CLI - Service-desk portal requests and settings service
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use deskportal::{
    create_memory_kv_store, default_query, init_logging_with_level, start_server,
    AuthenticatedUser, CatalogQueryEngine, PlainRenderer, ScopeKey, StaticAuthenticator,
    TracedKVStore,
};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Deskportal - service-desk portal requests and settings service",
    long_about = None,
    after_help = "QUICK START:
  1. Start the server:        deskportal serve --port 8080
  2. Fetch recent requests:   curl localhost:8080/recent?projectKey=DESK
  3. Inspect settings:        curl localhost:8080/settings?projectKey=DESK

The bundled adapters hold everything in memory; point the library at your
host platform's capabilities for real deployments."
)]
struct Cli {
    /// Enable verbose logging (DEBUG level). Default is WARN level.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress everything except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP REST API server with the bundled in-memory adapters
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080", env = "DESKPORTAL_PORT")]
        port: u16,
    },

    /// Print the generated default query for a scope
    DefaultQuery {
        /// Project key; omit for the global scope
        #[arg(default_value = "")]
        scope: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Ignore error if already initialized
    let _ = init_logging_with_level(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Serve { port } => {
            let auth = Arc::new(StaticAuthenticator::signed_in(
                AuthenticatedUser::new("portal-admin", "Portal Admin"),
                true,
            ));
            let engine = Arc::new(CatalogQueryEngine::with_demo_data());
            let kv = Arc::new(TracedKVStore::new(create_memory_kv_store()));
            let renderer = Arc::new(PlainRenderer);

            if !cli.quiet {
                println!("deskportal listening on http://0.0.0.0:{port}");
            }
            start_server(auth, engine, kv, renderer, port).await?;
        }
        Commands::DefaultQuery { scope } => {
            let scope = ScopeKey::new(scope);
            println!("{}", default_query(&scope));
        }
    }

    Ok(())
}
