use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use glam::Vec3;
use strata_common::Requirement;
use strata_persist::FileStore;
use strata_stream::{InterestConfig, InterestManager, Subscriber};
use strata_world::{FlatGenerator, MemoryStore, NullLighting, ProviderConfig, RegionProvider, Store};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strata-cli", about = "CLI tool for strata worlds")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate info
    Info,
    /// Walk subscribers through a flat world and report streaming stats
    Simulate {
        /// Number of subscribers
        #[arg(short, long, default_value = "2")]
        subscribers: usize,
        /// Number of ticks to run
        #[arg(short, long, default_value = "200")]
        ticks: u64,
        /// Blocks each subscriber moves per tick
        #[arg(long, default_value = "1.0")]
        speed: f32,
        /// Tier subscribers ask for
        #[arg(short, long, value_enum, default_value_t = Tier::Generate)]
        requirement: Tier,
        /// Persist regions in this directory instead of memory
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
        /// Interest config JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Store read worker threads
        #[arg(long, default_value = "2")]
        io_threads: usize,
    },
    /// Count the regions and columns in a store directory
    Inspect {
        /// Store directory
        data_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Tier {
    Cached,
    Load,
    Generate,
    Populate,
    Light,
}

impl From<Tier> for Requirement {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Cached => Requirement::Cached,
            Tier::Load => Requirement::Load,
            Tier::Generate => Requirement::Generate,
            Tier::Populate => Requirement::Populate,
            Tier::Light => Requirement::Light,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("strata-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", strata_common::crate_info());
            println!("world: {}", strata_world::crate_info());
            println!("persist: {}", strata_persist::crate_info());
            println!("stream: {}", strata_stream::crate_info());
        }
        Commands::Simulate {
            subscribers,
            ticks,
            speed,
            requirement,
            data_dir,
            config,
            io_threads,
        } => {
            let requirement = Requirement::from(requirement);
            let config = match config {
                Some(path) => InterestConfig::from_json_file(&path)?,
                None => InterestConfig::default(),
            };
            let store: Arc<dyn Store> = match &data_dir {
                Some(dir) => Arc::new(FileStore::open(dir)?),
                None => Arc::new(MemoryStore::new()),
            };
            let provider = RegionProvider::try_new(
                ProviderConfig {
                    io_threads,
                    ..ProviderConfig::default()
                },
                Box::new(FlatGenerator::default()),
                Box::new(NullLighting),
                store,
            )?;
            let mut manager = InterestManager::new(config, provider)?;

            println!(
                "Simulating {subscribers} subscribers for {ticks} ticks at tier {requirement}"
            );
            let mut walkers = Vec::with_capacity(subscribers);
            for i in 0..subscribers {
                let start = Vec3::new(0.0, 8.0, i as f32 * 256.0);
                let s = Subscriber::new(start).with_requirement(requirement);
                manager.add_subscriber(s);
                walkers.push((s.id, start));
            }

            let mut kinds: BTreeMap<&'static str, usize> = BTreeMap::new();
            let mut generated = 0;
            for tick in 0..ticks {
                for (id, position) in &mut walkers {
                    position.x += speed;
                    manager.on_subscriber_moved(*id, *position);
                }
                let stats = manager.update_waiting(Duration::from_millis(2));
                generated += stats.generated;
                for delivery in manager.drain_messages() {
                    *kinds.entry(delivery.message.kind()).or_default() += 1;
                }
                if tick % 50 == 0 {
                    tracing::info!(
                        tick,
                        pending_generation = stats.pending_generation,
                        pending_send = stats.pending_send,
                        "simulation progress"
                    );
                }
            }

            println!("{manager}");
            println!("{}", manager.provider());
            println!("Generated by interest: {generated}");
            for (kind, count) in &kinds {
                println!("  {kind}: {count}");
            }
            let timer = manager.timer();
            println!(
                "Tick time: avg {:?}, min {:?}, max {:?} over {} ticks",
                timer.average(),
                timer.min(),
                timer.max(),
                timer.count()
            );

            for (id, _) in &walkers {
                manager.remove_subscriber(*id);
            }
            let saved = manager.provider_mut().save_all();
            let stats = manager.provider().stats();
            println!(
                "Saved {saved} records ({} read failures, {} save failures)",
                stats.read_failures, stats.save_failures
            );
        }
        Commands::Inspect { data_dir } => {
            let store = FileStore::open(&data_dir)?;
            println!("Store: {}", store.root().display());
            println!(
                "Format: {} v{}",
                store.meta().format,
                store.meta().schema_version
            );
            println!("Regions: {}", store.region_count()?);
            println!("Columns: {}", store.column_count()?);
        }
    }

    Ok(())
}
