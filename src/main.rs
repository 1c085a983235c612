use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use txscope::engine::memory::MemoryEngine;
use txscope::{
    ConfigBag, DataSource, EngineHandle, EntityDescriptor, NamedDataSource, PersistenceConfig,
    PersistencePlugin, TaskContext, resolve_dialect,
};

#[derive(Parser)]
#[command(name = "txscope")]
#[command(about = "Inspect persistence configuration and unit-of-work wiring")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the effective persistence configuration
    Config {
        #[arg(long)]
        file: PathBuf,
    },
    /// Resolve the dialect for a driver
    Dialect {
        #[arg(long)]
        driver: String,
        #[arg(long)]
        file: Option<PathBuf>,
        /// Dialect override, takes precedence over the file
        #[arg(long)]
        dialect: Option<String>,
    },
    /// Initialize against an in-memory engine and run one unit of work
    Check {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        data_source: Option<String>,
        #[arg(long = "entity")]
        entities: Vec<String>,
        #[arg(long, default_value_t = false)]
        readonly: bool,
    },
}

#[derive(Serialize)]
struct CheckReport {
    enabled: bool,
    initialized: bool,
    dialect: Option<String>,
    entities: usize,
    commits: usize,
    rollbacks: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Config { file } => {
            let config = load_config(&file)?;
            print_json(&config.to_bag())
        }
        Command::Dialect {
            driver,
            file,
            dialect,
        } => {
            let mut config = match file {
                Some(path) => load_config(&path)?,
                None => PersistenceConfig::new(),
            };
            if let Some(dialect) = dialect {
                config = config.dialect(&dialect);
            }
            let resolved = resolve_dialect(&driver, &config)?;
            println!("{}", resolved);
            Ok(())
        }
        Command::Check {
            file,
            data_source,
            entities,
            readonly,
        } => check(&file, data_source, entities, readonly).await,
    }
}

async fn check(
    file: &Path,
    data_source: Option<String>,
    entities: Vec<String>,
    readonly: bool,
) -> Result<()> {
    let config = load_config(file)?;
    let engine = MemoryEngine::new();
    let handle = Arc::new(EngineHandle::new(config, Arc::new(engine.builder())));
    let plugin = PersistencePlugin::new(handle);

    let data_source = data_source.map(|name| Arc::new(NamedDataSource::new(name)) as Arc<dyn DataSource>);
    let descriptors = entities.into_iter().map(EntityDescriptor::entity);
    plugin
        .on_application_start(descriptors, data_source)
        .await
        .context("persistence initialization failed")?;

    let ctx = TaskContext::labelled("check");
    plugin
        .run_in_unit_of_work(&ctx, readonly, async { Ok::<_, anyhow::Error>(()) })
        .await
        .map_err(|e| anyhow!("unit of work failed: {}", e))?;

    let settings = engine.last_settings();
    let report = CheckReport {
        enabled: plugin.handle().is_enabled(),
        initialized: plugin.handle().is_initialized().await,
        dialect: settings.as_ref().map(|s| s.dialect.to_string()),
        entities: settings.as_ref().map_or(0, |s| s.entities.len()),
        commits: engine.commits(),
        rollbacks: engine.rollbacks(),
    };
    plugin.on_application_stop().await;

    print_json(&report)
}

fn load_config(path: &Path) -> Result<PersistenceConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let bag = ConfigBag::from_json_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    PersistenceConfig::from_bag(&bag).context("invalid persistence configuration")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
