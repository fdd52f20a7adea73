use agroview::view::{GroupBy, SaccoSummary, aggregate, compute_stats};
use agroview::{
    DerivedViewStore, Entity, EntityId, EntityKind, Exclusion, FilterSpec, PollingScheduler,
    RestSource, SortKey, StaticSource, StoreConfig,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agroview")]
#[command(about = "Derived views over agricultural platform data")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a filtered, sorted list as JSON lines
    View {
        #[arg(long)]
        kind: EntityKind,
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "")]
        search: String,
        /// Categorical filter, `field=value`
        #[arg(long = "filter")]
        filters: Vec<String>,
        #[arg(long)]
        exclude_owner: Option<String>,
        #[arg(long, default_value = "")]
        sort: String,
    },
    /// Marketplace stats for one viewer's posts
    Stats {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        viewer: String,
    },
    /// Chart buckets
    Aggregate {
        #[arg(long)]
        kind: EntityKind,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        by: String,
        #[arg(long)]
        related: Option<PathBuf>,
        #[arg(long, default_value = "regions")]
        related_kind: EntityKind,
        #[arg(long, default_value = "name")]
        label: String,
    },
    /// SACCO member dashboard totals
    Sacco {
        #[arg(long)]
        memberships: PathBuf,
        #[arg(long)]
        loans: PathBuf,
    },
    /// Poll the platform API and log transitions until Ctrl-C
    Watch {
        #[arg(long, value_delimiter = ',', required = true)]
        kinds: Vec<EntityKind>,
        #[arg(long)]
        interval_ms: Option<u64>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::View {
            kind,
            input,
            search,
            filters,
            exclude_owner,
            sort,
        } => {
            let mut spec = FilterSpec::new()
                .search(&search)
                .sort(SortKey::from_option(&sort));
            for filter in &filters {
                let (field, value) = filter
                    .split_once('=')
                    .ok_or_else(|| anyhow!("filter '{}' is not field=value", filter))?;
                spec = spec.filter(field.trim(), value);
            }
            if let Some(owner) = exclude_owner {
                spec = spec.exclude(Exclusion::owned_by(EntityId::new(owner)));
            }

            let entities = load(kind, &input).await?;
            for entity in spec.apply(&entities, kind.schema()) {
                println!("{}", serde_json::to_string(&entity)?);
            }
            Ok(())
        }
        Command::Stats { input, viewer } => {
            let posts = load(EntityKind::Posts, &input).await?;
            let stats = compute_stats(&posts, EntityKind::Posts.schema(), &EntityId::new(viewer));
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Command::Aggregate {
            kind,
            input,
            by,
            related,
            related_kind,
            label,
        } => {
            let entities = load(kind, &input).await?;
            let groups = match related {
                Some(path) => {
                    let related = load(related_kind, &path).await?;
                    aggregate(
                        &entities,
                        GroupBy::Related {
                            field: &by,
                            related: &related,
                            label_field: &label,
                        },
                    )
                }
                None => aggregate(&entities, GroupBy::Field(&by)),
            };
            println!("{}", serde_json::to_string_pretty(&groups)?);
            Ok(())
        }
        Command::Sacco { memberships, loans } => {
            let loaded = try_join_all([
                load(EntityKind::Memberships, &memberships),
                load(EntityKind::LoanApplications, &loans),
            ])
            .await?;
            let summary = SaccoSummary::compute(&loaded[0], &loaded[1]);
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Watch {
            kinds,
            interval_ms,
            config,
        } => watch(kinds, interval_ms, config.as_deref()).await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agroview=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Decode a JSON file through the store, exactly as a fetch would be.
async fn load(kind: EntityKind, path: &Path) -> Result<Vec<Entity>> {
    let source = StaticSource::new();
    source
        .load_file(kind, path)
        .await
        .with_context(|| format!("Failed to read {} from '{}'", kind, path.display()))?;

    let store = DerivedViewStore::new(StoreConfig::default())?;
    store
        .refresh(kind, &source)
        .await
        .with_context(|| format!("Failed to decode {} from '{}'", kind, path.display()))?;
    Ok(store.entities(kind).await)
}

async fn watch(kinds: Vec<EntityKind>, interval_ms: Option<u64>, config: Option<&Path>) -> Result<()> {
    let mut config = match config {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config '{}'", path.display()))?;
            StoreConfig::from_json(&raw)?
        }
        None => StoreConfig::from_env().context("failed to load configuration")?,
    };
    if let Some(interval_ms) = interval_ms {
        config = config.poll_interval(Duration::from_millis(interval_ms));
    }

    let source = RestSource::from_config(&config)?;
    let interval = config.poll_interval;
    let store = Arc::new(DerivedViewStore::new(config)?);
    let mut changes = store.subscribe();

    let mut scheduler = PollingScheduler::new(Arc::clone(&store), Arc::new(source));
    scheduler.start(interval, &kinds)?;
    info!(kinds = ?kinds, interval_ms = interval.as_millis() as u64, "watching");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    error!(error = %err, "unable to listen for ctrl+c");
                }
                break;
            }
            change = changes.recv() => match change {
                Ok(change) => {
                    let count = store.entities(change.kind).await.len();
                    info!(kind = %change.kind, revision = change.revision, reason = ?change.reason, entities = count, "store changed");
                }
                Err(err) => {
                    error!(error = %err, "change stream interrupted");
                }
            },
        }
    }

    scheduler.cancel();
    let stats = scheduler.stats();
    info!(ticks = stats.ticks, started = stats.started, skipped = stats.skipped, "scheduler stopped");
    Ok(())
}
