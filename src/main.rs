use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use tree_reconciler::config::{Config, DEFAULT_CONFIG_PATH};
use tree_reconciler::observability::{self, metrics};
use tree_reconciler::pipeline::processing::identifier::IdentifierNormalizer;
use tree_reconciler::ReconcileUseCase;

#[derive(Parser)]
#[command(name = "tree_reconciler")]
#[command(about = "Reconciles tree-inventory field stores with the registry sheets")]
#[command(version)]
struct Cli {
    /// Directory for the rotated JSON log file
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, reconcile and write every map artifact
    Run {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Override output.dir from the config
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Point photo paths at the thumbnail folder
        #[arg(long)]
        thumbnails: bool,
    },
    /// Print the canonical form of tree codes
    NormalizeId {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Load and validate a config file without touching any source
    CheckConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = observability::init_logging(&cli.log_dir);

    match cli.command {
        Commands::Run {
            config,
            output_dir,
            thumbnails,
        } => {
            let mut config = Config::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            if let Some(dir) = output_dir {
                config.output.dir = dir;
            }
            if thumbnails {
                config.output.thumbnails_enabled = true;
            }
            run(config).await?;
        }
        Commands::NormalizeId { config, codes } => {
            // Fall back to the built-in prefixes when no config file exists.
            let identifiers = if config.exists() {
                Config::load(&config)?.identifiers
            } else {
                Config::default().identifiers
            };
            let normalizer = IdentifierNormalizer::new(&identifiers);
            for code in codes {
                println!("{}\t{}", code, normalizer.normalize(&code));
            }
        }
        Commands::CheckConfig { config } => {
            let loaded = Config::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            println!("✅ {} is valid\n", config.display());
            print!("{}", toml::to_string_pretty(&loaded)?);
        }
    }
    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    metrics::init();
    let pushgateway = config.metrics.pushgateway_url.clone();
    let job = config.metrics.job.clone();

    let use_case = ReconcileUseCase::from_config(config)?;
    let result = use_case.run().await;

    if let Some(url) = pushgateway {
        let instance = match &result {
            Ok(report) => report.summary.run_id.to_string(),
            Err(_) => "failed".to_string(),
        };
        metrics::push_to_gateway(&url, &job, &instance).await;
    }

    match result {
        Ok(report) => {
            let summary = &report.summary;
            info!("Reconciliation finished");
            println!("\n📊 Reconciliation results (run {}):", summary.run_id);
            println!("   Stores used: {}", summary.stores.used.len());
            println!("   Stores skipped: {}", summary.stores.skipped.len());
            println!("   Rows extracted: {}", summary.records.extracted);
            println!("   Canonical trees: {}", summary.records.canonical_trees);
            println!(
                "   Registry trees: {} ({} dead, {} alive)",
                summary.registry.geotagged, summary.registry.dead, summary.registry.alive
            );
            println!("   Heat buckets: {}", summary.heatmap.buckets);
            for path in &report.written {
                println!("   Wrote {}", path.display());
            }
            Ok(())
        }
        Err(e) => {
            error!("Reconciliation failed: {}", e);
            Err(e.into())
        }
    }
}
