// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Flagmetrics CLI
//!
//! Command-line interface for ingesting client metrics and querying the
//! aggregated store.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use flagmetrics_core::{HourBucket, MetricEvent, MetricsConfig};
use flagmetrics_storage::{BatchToken, ClientMetricsStore, MetricsFilter};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "flagmetrics")]
#[command(about = "Flagmetrics - feature flag usage metrics store", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database file, overrides the configuration
    #[arg(short, long, env = "FLAGMETRICS_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Output as JSON (machine-readable)
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a JSON array of metric events
    Ingest {
        /// Events file
        file: PathBuf,

        /// Idempotency token; a token that was already applied is skipped
        #[arg(long)]
        token: Option<BatchToken>,
    },

    /// Hourly metrics with variants for one feature
    Feature {
        name: String,

        /// Lookback window in hours
        #[arg(long)]
        hours: Option<u32>,
    },

    /// Lifetime totals per environment for one feature
    Totals { name: String },

    /// Apps that reported a feature inside the window
    SeenApps {
        feature: String,

        #[arg(long)]
        hours: Option<u32>,
    },

    /// Features reported by an app inside the window
    SeenToggles {
        app: String,

        #[arg(long)]
        hours: Option<u32>,
    },

    /// List hourly rows
    List {
        #[arg(long)]
        feature: Option<String>,

        #[arg(long)]
        app: Option<String>,

        #[arg(long)]
        environment: Option<String>,

        /// Only hours at or after this instant (RFC 3339)
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Delete hourly metrics older than the retention horizon
    Sweep {
        /// Horizon in hours (defaults to the configured retention)
        #[arg(long)]
        hours: Option<u32>,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "flagmetrics=debug"
    } else {
        "flagmetrics=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<MetricsConfig> {
    let mut config =
        MetricsConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(path) = &cli.db_path {
        config.storage.db_path = path.clone();
    }
    Ok(config)
}

/// Read and validate a JSON array of events.
fn load_events(path: &Path) -> Result<Vec<MetricEvent>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let events: Vec<MetricEvent> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse events in {}", path.display()))?;
    for (i, event) in events.iter().enumerate() {
        event
            .validate()
            .with_context(|| format!("Invalid event at index {i}"))?;
    }
    Ok(events)
}

fn print_names(names: &[String], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(names)?);
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let store = ClientMetricsStore::from_config(&config).with_context(|| {
        format!("Failed to open database at {}", config.storage.db_path.display())
    })?;
    let default_hours = config.query.default_hours_back;

    match cli.command {
        Commands::Ingest { file, token } => {
            let events = load_events(&file)?;
            info!(events = events.len(), file = %file.display(), "ingesting");

            match token {
                Some(token) => {
                    let outcome = store.batch_insert_metrics_once(token, &events)?;
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&outcome)?);
                    } else if outcome.is_duplicate() {
                        println!("Batch {token} was already applied, nothing written");
                    } else {
                        println!("✓ Ingested {} events (batch {token})", events.len());
                    }
                }
                None => {
                    store.batch_insert_metrics(&events)?;
                    store.batch_insert_total_metrics(&events)?;
                    if cli.json {
                        println!("{}", serde_json::json!({ "events": events.len() }));
                    } else {
                        println!("✓ Ingested {} events", events.len());
                    }
                }
            }
        }

        Commands::Feature { name, hours } => {
            let hours = hours.unwrap_or(default_hours);
            let metrics = store.get_metrics_for_feature_toggle(&name, hours)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&metrics)?);
            } else {
                println!("{} hourly rows for {} in the last {}h", metrics.len(), name, hours);
                for m in &metrics {
                    let variants = m
                        .variants
                        .iter()
                        .map(|(v, c)| format!("{v}={c}"))
                        .collect::<Vec<_>>()
                        .join(" ");
                    println!(
                        "  {}  app={} env={} yes={} no={} {}",
                        m.timestamp, m.app_name, m.environment, m.yes, m.no, variants
                    );
                }
            }
        }

        Commands::Totals { name } => {
            let totals = store.get_total_count_for_toggle(&name)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&totals)?);
            } else {
                for t in &totals {
                    println!("{}\t{}", t.environment, t.total);
                }
            }
        }

        Commands::SeenApps { feature, hours } => {
            let apps =
                store.get_seen_apps_for_feature_toggle(&feature, hours.unwrap_or(default_hours))?;
            print_names(&apps, cli.json)?;
        }

        Commands::SeenToggles { app, hours } => {
            let toggles = store.get_seen_toggles_for_app(&app, hours.unwrap_or(default_hours))?;
            print_names(&toggles, cli.json)?;
        }

        Commands::List {
            feature,
            app,
            environment,
            since,
            limit,
        } => {
            let mut filter = MetricsFilter::new();
            filter.feature_name = feature;
            filter.app_name = app;
            filter.environment = environment;
            filter.since = since.map(HourBucket::floor);
            filter.limit = limit;

            let records = store.get_all(&filter)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for r in &records {
                    println!(
                        "{}  {} app={} env={} yes={} no={}",
                        r.timestamp, r.feature_name, r.app_name, r.environment, r.yes, r.no
                    );
                }
            }
        }

        Commands::Sweep { hours } => {
            let hours = hours.unwrap_or(config.retention.hourly_hours);
            let stats = store.clear_metrics(hours)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "✓ Swept {} rows older than {}h ({} hourly, {} variant, {} batch tokens)",
                    stats.total_deleted(),
                    hours,
                    stats.hourly_deleted,
                    stats.variants_deleted,
                    stats.tokens_deleted
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["flagmetrics", "--json", "feature", "checkout", "--hours", "6"])
            .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Feature { name, hours } => {
                assert_eq!(name, "checkout");
                assert_eq!(hours, Some(6));
            }
            _ => panic!("expected feature command"),
        }

        let cli = Cli::try_parse_from([
            "flagmetrics",
            "ingest",
            "events.json",
            "--token",
            "67e55044-10b1-426f-9247-bb680e5fe0c8",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Ingest { token: Some(_), .. }));

        assert!(Cli::try_parse_from(["flagmetrics", "ingest", "e.json", "--token", "nope"]).is_err());
    }

    #[test]
    fn test_load_events() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"featureName":"f1","appName":"a1","environment":"prod",
                 "timestamp":"2024-03-10T10:05:00Z","yes":3,"no":1,"variants":{{"A":2}}}}]"#
        )
        .unwrap();

        let events = load_events(file.path()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].yes, 3);
        assert_eq!(events[0].variants().collect::<Vec<_>>(), vec![("A", 2)]);
    }

    #[test]
    fn test_load_events_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"featureName":"","appName":"a1","environment":"prod","timestamp":"2024-03-10T10:05:00Z"}}]"#
        )
        .unwrap();

        assert!(load_events(file.path()).is_err());
    }
}
