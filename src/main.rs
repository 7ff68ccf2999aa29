mod cli;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use lectern_core::config::Config;
use lectern_core::storage::ArtifactStore;
use lectern_db::pool::init_pool;
use lectern_pipeline::tools::ToolRegistry;
use lectern_pipeline::{Collaborators, Orchestrator, RunnerPool};
use lectern_server::{build_router, AppContext};

async fn start_server(
    host: String,
    port: u16,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    // Load config and apply CLI overrides.
    let mut config = Config::load_or_default(config_path);
    config.server.host = host;
    config.server.port = port;

    for warning in config.validate() {
        tracing::warn!("config: {warning}");
    }

    tracing::info!("Starting Lectern server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    // Initialize storage and database.
    std::fs::create_dir_all(&config.storage.data_dir)?;
    let db_path = config.storage.db_path();
    tracing::info!("Initializing database at {}", db_path.display());
    let db = init_pool(&db_path.to_string_lossy())?;
    let store = ArtifactStore::new(config.storage.artifacts_dir());

    // Discover external tools and wire the pipeline.
    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    for tool in tools.check_all() {
        if tool.available {
            tracing::info!("Found tool {}: {}", tool.name, tool.version.as_deref().unwrap_or("?"));
        } else {
            tracing::warn!("Tool {} not found; related stages will fail", tool.name);
        }
    }

    let collab = Collaborators::production(&config, tools.clone());
    let orchestrator = Orchestrator::new(db.clone(), store.clone(), collab);
    let runner = RunnerPool::start(
        orchestrator,
        db.clone(),
        config.pipeline.max_concurrent_jobs,
        config.pipeline.queue_depth,
    );

    let ctx = AppContext {
        db,
        config: Arc::new(config.clone()),
        store,
        tools,
        runner: runner.clone(),
    };

    let app = build_router(ctx);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    // Stop in-flight runs cooperatively before exiting.
    runner.shutdown();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on the
    // verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "lectern=trace,lectern_pipeline=trace,lectern_db=debug,tower_http=debug".to_string()
        } else {
            "lectern=debug,lectern_pipeline=debug,lectern_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("lectern {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::default();
    let registry = ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in registry.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable all features.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Data dir: {}", config.storage.data_dir.display());
            println!(
                "  Max concurrent jobs: {}",
                config.pipeline.max_concurrent_jobs
            );
            for warning in config.validate() {
                println!("  Warning: {warning}");
            }
        }
        None => {
            println!("No config file specified, using defaults");
            let config = Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Data dir: {}", config.storage.data_dir.display());
        }
    }

    Ok(())
}
