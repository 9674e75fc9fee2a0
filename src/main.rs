use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use brownclaw_ingest::config::{self, IngestConfig};
use brownclaw_ingest::ingest::fetch::HttpFetcher;
use brownclaw_ingest::ingest::{Ingestor, Session};
use brownclaw_ingest::inventory;
use brownclaw_ingest::logging;
use brownclaw_ingest::stations;
use brownclaw_ingest::store::{PgStore, StationStore};
use brownclaw_ingest::sweep::{self, SweepOptions};

/// Hydrometric station ingestion for BrownClaw
#[derive(Parser, Debug)]
#[command(name = "brownclaw-ingest")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./sources.toml when present)
    #[arg(short, long, env = "BROWNCLAW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured sources in the order they are tried
    Sources,

    /// Acquire one station and print its record as JSON
    Fetch {
        /// WSC station number, e.g. 05BH004
        station_id: String,
    },

    /// Acquire many stations
    Sweep {
        /// Comma-separated station ids (defaults to the reference stations)
        #[arg(long, value_delimiter = ',')]
        stations: Vec<String>,

        /// Sweep every station in the official station inventory
        #[arg(long, conflicts_with = "stations")]
        discover: bool,

        /// With --discover, only stations in this province or territory (e.g. AB)
        #[arg(long, requires = "discover")]
        province: Option<String>,

        /// Maximum concurrent requests
        #[arg(long)]
        concurrency: Option<usize>,

        /// Write the full JSON report here
        #[arg(long)]
        report: Option<PathBuf>,

        /// Store acquired records in PostgreSQL (needs DATABASE_URL)
        #[arg(long)]
        persist: bool,
    },
}

fn load_config(path: Option<&Path>) -> Result<IngestConfig> {
    let mut config = match path {
        Some(path) => IngestConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None if Path::new(config::DEFAULT_CONFIG_PATH).exists() => {
            IngestConfig::load(Path::new(config::DEFAULT_CONFIG_PATH))
                .context("Failed to load sources.toml")?
        }
        None => IngestConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    logging::init_logging(&config.log_level, config.log_file.as_deref())
        .context("Failed to open log file")?;

    let registry = config.registry()?;

    if let Command::Sources = cli.command {
        for d in registry.iter() {
            println!("{:>4}  {:<20} {:<24} {}", d.priority, d.name, d.shape.as_str(), d.url_template);
        }
        return Ok(());
    }

    let fetcher =
        HttpFetcher::new(config.fetch_config()).context("Failed to build HTTP client")?;
    let ingestor = Ingestor::new(registry, fetcher, config.fallback_policy());

    match cli.command {
        Command::Sources => {}

        Command::Fetch { station_id } => {
            let mut session = Session::new();
            match ingestor.acquire(&station_id, &mut session) {
                Ok(acquisition) => {
                    println!("{}", serde_json::to_string_pretty(&acquisition)?);
                    let record = &acquisition.record;
                    if !record.has_readings() {
                        warn!(station = %record.station_id, "No current discharge or level reading");
                    }
                    if let Some(station) = stations::find_station(&record.station_id) {
                        info!(
                            section = station.section,
                            difficulty = station.difficulty,
                            latitude = station.latitude,
                            longitude = station.longitude,
                            "Reference station {}",
                            station.name
                        );
                        if let Some(discharge) = record.discharge_cms {
                            info!(
                                "{:.1} m³/s is {} for {}",
                                discharge,
                                station.runnable.condition(discharge),
                                station.section
                            );
                        }
                    }
                }
                Err(err) => {
                    for attempt in err.attempts() {
                        eprintln!("  {:<20} {}", attempt.source, attempt.outcome);
                    }
                    return Err(err).with_context(|| format!("Failed to acquire {}", station_id));
                }
            }
        }

        Command::Sweep {
            stations: requested,
            discover,
            province,
            concurrency,
            report,
            persist,
        } => {
            let station_ids = if discover {
                let entries = inventory::load_inventory(ingestor.fetcher(), &config.inventory)
                    .with_context(|| format!("Failed to load {}", config.inventory.url))?;
                let selected: Vec<String> = inventory::select(&entries, province.as_deref())
                    .map(|entry| entry.station_id.clone())
                    .collect();
                if selected.is_empty() {
                    bail!("No stations selected from the inventory");
                }
                sweep::dedup_station_ids(selected)
            } else if requested.is_empty() {
                sweep::dedup_station_ids(stations::all_station_ids())
            } else {
                sweep::dedup_station_ids(requested)
            };

            let options = SweepOptions {
                concurrency_limit: concurrency.unwrap_or(config.concurrency_limit),
                ..Default::default()
            };
            if options.concurrency_limit == 0 {
                bail!("--concurrency must be at least 1");
            }

            let sweep_report = sweep::run_sweep(&ingestor, &station_ids, &options);
            sweep::print_summary(&sweep_report);
            logging::log_sweep_summary(&sweep_report.summary);

            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&sweep_report)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Report written to {}", path.display());
            }

            if persist {
                let url = std::env::var(config::ENV_DATABASE_URL)
                    .context("--persist needs DATABASE_URL")?;
                let mut store = PgStore::connect(&url).context("Failed to connect to database")?;
                store.ensure_schema()?;
                let mut stored = 0;
                for record in sweep_report.records() {
                    store.put(record, sweep_report.finished_at)?;
                    stored += 1;
                }
                info!("Stored {} station documents", stored);
            }
        }
    }

    Ok(())
}
