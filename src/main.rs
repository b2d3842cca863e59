use anyhow::{Context, Result};
use bionet::db::{migrate, Db};
use bionet::export::write_gexf;
use bionet::network::{Explorer, ExploreRequest, RelationType, StrategyOverride};
use bionet::service::NetworkServer;
use bionet::watch::{run_config_watcher, DEFAULT_DEBOUNCE_MS};
use bionet::{BionetError, Config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "bionet")]
#[command(version, about = "Explore kinship, association and office networks around a person")]
struct Cli {
    /// Config file (overrides BIONET_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply migrations and check the schema (default)
    Verify,
    /// Explore one person's network and print it as JSON
    Explore {
        /// Person id at the center of the network
        root: i64,
        /// Degrees of separation, 1 to 3
        #[arg(short, long, default_value = "2")]
        depth: u32,
        /// Relation types to follow (kinship, association, office); all when omitted
        #[arg(short = 't', long = "relation", value_delimiter = ',')]
        relations: Vec<RelationType>,
        /// Also find relations among already-discovered people
        #[arg(long)]
        reciprocal: bool,
        /// auto, naive, optimized or workerpool
        #[arg(long, default_value = "auto", value_parser = parse_override)]
        strategy: StrategyOverride,
        #[arg(long)]
        node_cap_per_level: Option<usize>,
        #[arg(long)]
        total_node_cap: Option<usize>,
        /// Also write the network as GEXF to this path
        #[arg(long)]
        gexf: Option<PathBuf>,
    },
    /// Serve JSON-RPC on stdio and reload [strategy] when the config file changes
    Serve {
        /// Debounce delay in milliseconds before applying a config change
        #[arg(long, default_value_t = DEFAULT_DEBOUNCE_MS)]
        debounce_ms: u64,
        /// Don't watch the config file
        #[arg(long)]
        no_watch: bool,
    },
}

fn parse_override(raw: &str) -> std::result::Result<StrategyOverride, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_lowercase()))
        .map_err(|_| format!("unknown strategy '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(path) = &cli.config {
        std::env::set_var("BIONET_CONFIG", path);
    }

    let config = Config::load()?;

    // Logs go to stderr so stdout stays clean for JSON output.
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.bionet.log_level.as_str()),
    )
    .init();

    match cli.command.unwrap_or(Command::Verify) {
        Command::Verify => run_schema_verification(&config).await?,
        Command::Explore {
            root,
            depth,
            relations,
            reciprocal,
            strategy,
            node_cap_per_level,
            total_node_cap,
            gexf,
        } => {
            let mut request = ExploreRequest::new(root, depth)
                .include_reciprocal(reciprocal)
                .strategy(strategy);
            if !relations.is_empty() {
                request = request.relation_types(relations);
            }
            request.node_cap_per_level = node_cap_per_level;
            request.total_node_cap = total_node_cap;
            run_explore(&config, request, gexf).await?;
        }
        Command::Serve {
            debounce_ms,
            no_watch,
        } => run_server(&config, debounce_ms, no_watch).await?,
    }

    Ok(())
}

async fn prepare_database(config: &Config) -> Result<Db> {
    let db = Db::new(config.db_path());
    db.with_connection(migrate::run_migrations)
        .await
        .with_context(|| format!("Failed to migrate {}", config.db_path().display()))?;
    Ok(db)
}

async fn run_explore(config: &Config, request: ExploreRequest, gexf: Option<PathBuf>) -> Result<()> {
    prepare_database(config).await?;
    let explorer = Explorer::from_config(config);

    let doc = match explorer.explore(&request).await {
        Ok(doc) => doc,
        Err(BionetError::EntityNotFound(id)) => anyhow::bail!("No person with id {} in the database", id),
        Err(e) => return Err(e.into()),
    };

    if let Some(path) = gexf {
        let xml = write_gexf(&doc)?;
        std::fs::write(&path, xml).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("GEXF written to {}", path.display());
    }

    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

async fn run_server(config: &Config, debounce_ms: u64, no_watch: bool) -> Result<()> {
    prepare_database(config).await?;
    let explorer = Explorer::from_config(config);
    let shutdown = CancellationToken::new();

    let watcher = if no_watch {
        None
    } else {
        Some(tokio::spawn(run_config_watcher(
            Config::config_path(),
            explorer.strategy_config().clone(),
            debounce_ms,
            shutdown.clone(),
        )))
    };

    let server = NetworkServer::new(explorer, shutdown.clone());
    let result = server.run().await;

    shutdown.cancel();
    if let Some(handle) = watcher {
        match handle.await {
            Ok(Err(e)) => log::warn!("Config watcher stopped with error: {}", e),
            Err(e) => log::warn!("Config watcher task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }
    result?;
    Ok(())
}

/// Run migrations, then check that every table the traversal reads exists.
async fn run_schema_verification(config: &Config) -> Result<()> {
    log::info!("Starting bionet v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());

    let db = prepare_database(config).await?;

    let (missing, applied, persons) = db
        .with_connection(|conn| {
            let missing = migrate::missing_tables(conn)?;
            let applied = migrate::get_applied_migrations(conn)?;
            let persons: i64 = conn.query_row("SELECT COUNT(*) FROM persons", [], |row| row.get(0))?;
            Ok((missing, applied, persons))
        })
        .await?;

    if !missing.is_empty() {
        anyhow::bail!("Missing tables: {}", missing.join(", "));
    }
    log::info!("✓ {} migrations applied", applied.len());
    log::info!("✓ All {} required tables present", migrate::REQUIRED_TABLES.len());
    log::info!("✓ {} persons loaded", persons);
    Ok(())
}
