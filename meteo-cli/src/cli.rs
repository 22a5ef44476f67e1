use anyhow::Context;
use clap::{Parser, Subcommand};
use inquire::{Confirm, Select, Text};
use meteo_core::{AggregationService, Config, Coordinates, LocationCandidate, SearchOutcome};
use tracing::debug;

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "meteo", version, about = "Weather for your favorite places")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Edit API endpoints and timeout interactively.
    Configure,

    /// Look up a city, show its weather and optionally save it.
    Search {
        /// City name, e.g. "Paris".
        query: String,
    },

    /// Show the favorites list, with the current location first when given.
    List {
        /// Latitude of the device's position.
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude of the device's position.
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// Detailed weather for one location.
    Detail {
        name: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Save a location as favorite.
    Add {
        name: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Remove a saved favorite.
    Remove { name: String },
}

struct CandidateChoice(LocationCandidate);

impl std::fmt::Display for CandidateChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&output::candidate_line(&self.0))
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure()?,
            Command::Search { query } => search(&open_service()?, &query).await?,
            Command::List { lat, lon } => {
                let here = lat.zip(lon).map(|(lat, lon)| Coordinates::new(lat, lon));
                list(&open_service()?, here).await;
            }
            Command::Detail { name, lat, lon } => {
                let detail = open_service()?
                    .forecast_detail(&name, Coordinates::new(lat, lon))
                    .await
                    .with_context(|| format!("Failed to fetch weather for {name}"))?;
                println!("{}", output::detail_block(&detail));
            }
            Command::Add { name, lat, lon } => {
                if open_service()?.add_favorite(&name, Coordinates::new(lat, lon)).await? {
                    println!("Added {name} to favorites.");
                } else {
                    println!("{name} is already a favorite.");
                }
            }
            Command::Remove { name } => {
                if open_service()?.remove_favorite(&name)? {
                    println!("Removed {name}.");
                } else {
                    println!("{name} is not a removable favorite.");
                }
            }
        }

        Ok(())
    }
}

fn open_service() -> anyhow::Result<AggregationService> {
    let config = Config::load()?;
    debug!(?config, "Loaded configuration");
    AggregationService::from_config(&config)
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    config.forecast_base_url =
        Text::new("Forecast API base URL:").with_default(&config.forecast_base_url).prompt()?;
    config.geocoding_base_url =
        Text::new("Geocoding API base URL:").with_default(&config.geocoding_base_url).prompt()?;

    let timeout = Text::new("Request timeout (seconds):")
        .with_default(&config.timeout_secs.to_string())
        .prompt()?;
    config.timeout_secs =
        timeout.trim().parse().with_context(|| format!("Invalid timeout: {timeout}"))?;

    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn search(service: &AggregationService, query: &str) -> anyhow::Result<()> {
    let candidates = match service.search_city(query).await.context("City search failed")? {
        SearchOutcome::Found(candidates) => candidates,
        SearchOutcome::NoMatch => {
            println!("No city found for \"{query}\".");
            return Ok(());
        }
    };

    let choices: Vec<CandidateChoice> = candidates.into_iter().map(CandidateChoice).collect();
    let CandidateChoice(candidate) = Select::new("Pick a city:", choices).prompt()?;

    let conditions = service
        .select_candidate_and_fetch(&candidate)
        .await
        .with_context(|| format!("Failed to fetch weather for {}", candidate.display_label()))?;
    println!("{}", output::conditions_line(&conditions));

    if !service.is_favorite(&conditions.label)?
        && Confirm::new("Add to favorites?").with_default(false).prompt()?
    {
        service.add_favorite(&conditions.label, conditions.coordinates).await?;
        println!("Added {} to favorites.", conditions.label);
    }

    Ok(())
}

async fn list(service: &AggregationService, here: Option<Coordinates>) {
    if let Some(coordinates) = here {
        if let Err(err) = service.refresh_current_location(coordinates).await {
            eprintln!("{}", output::failure_notice(meteo_core::CURRENT_LOCATION_LABEL, &err));
        }
    }

    for report in service.refresh_saved_favorites().await {
        if let Err(err) = &report.result {
            eprintln!("{}", output::failure_notice(&report.name, err));
        }
    }

    let favorites = service.favorites();
    if favorites.is_empty() {
        println!("No favorites yet. Try `meteo search <city>`.");
        return;
    }
    for conditions in &favorites {
        println!("{}", output::conditions_line(conditions));
    }
}
