use std::{io::IsTerminal, time::Duration};

use airwatch_core::{
    Config, Coordinates, Session, SessionState, SessionView, config::MAX_REFRESH_MINUTES,
    refresh_periodically, session_from_config,
};
use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use inquire::{Confirm, CustomType, Select, Text};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "airwatch", version, about = "Real-time air quality for your location")]
pub struct Cli {
    /// Print debug logs to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// A position to use instead of detecting one.
#[derive(Debug, Clone, Copy, Args)]
pub struct PositionArgs {
    /// Latitude in decimal degrees.
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Longitude in decimal degrees.
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lon: Option<f64>,
}

impl PositionArgs {
    fn coordinates(&self) -> anyhow::Result<Option<Coordinates>> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                    bail!("Position ({lat}, {lon}) is out of range.");
                }
                Ok(Some(Coordinates::new(lat, lon)))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show air quality for your current location.
    Show {
        #[command(flatten)]
        position: PositionArgs,
    },

    /// Show air quality for a place, e.g. "Chennai, India".
    Search {
        #[arg(required = true, num_args = 1..)]
        place: Vec<String>,
    },

    /// Show air quality and keep it updated until interrupted.
    Watch {
        #[command(flatten)]
        position: PositionArgs,

        /// Minutes between refreshes; defaults to the configured interval.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_REFRESH_MINUTES))]
        every: Option<u64>,
    },

    /// Configure access token, default city and a fixed location.
    Configure,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = Config::load()?;
        tracing::debug!(command = ?self.command, "running command");

        match self.command {
            Command::Show { position } => {
                let session = session_from_config(&config, position.coordinates()?)?;
                session.start().await;
                settle(&session).await?;
                println!("{}", render::render(&session.snapshot()));
            }
            Command::Search { place } => {
                let place = place.join(" ");
                let session = session_from_config(&config, None)?;
                if !session.manual_search(&place).await {
                    bail!("Nothing to search for.\nHint: pass a place such as \"Chennai, India\".");
                }
                settle(&session).await?;
                println!("{}", render::render(&session.snapshot()));
            }
            Command::Watch { position, every } => {
                let period = every
                    .map(|m| Duration::from_secs(m * 60))
                    .unwrap_or_else(|| config.refresh_interval());

                let session = session_from_config(&config, position.coordinates()?)?;
                session.start().await;
                settle(&session).await?;
                println!("{}", render::render(&session.snapshot()));

                tokio::select! {
                    _ = refresh_periodically(&session, period, |state: &SessionState| {
                        println!("\n{}", render::render(state));
                    }) => {}
                    res = tokio::signal::ctrl_c() => {
                        res.context("Failed to listen for Ctrl-C")?;
                    }
                }
            }
            Command::Configure => configure(config)?,
        }

        Ok(())
    }
}

/// Recover from a hard failure interactively until there is a reading to show
/// or the user quits.
async fn settle(session: &Session) -> anyhow::Result<()> {
    const RETRY: &str = "Retry";
    const SEARCH: &str = "Search for a city";
    const QUIT: &str = "Quit";

    loop {
        let state = session.snapshot();
        let SessionView::HardError(err) = state.view() else {
            return Ok(());
        };

        if !std::io::stdin().is_terminal() {
            bail!("{}\nHint: run `airwatch search \"City, Country\"`.", err.message);
        }

        println!("{}", render::render(&state));

        match Select::new("What next?", vec![RETRY, SEARCH, QUIT]).prompt()? {
            RETRY => {
                session.retry().await;
            }
            SEARCH => {
                let place = Text::new("City:")
                    .with_help_message("Use the \"City, Country\" format, e.g. \"Chennai, India\"")
                    .prompt()?;
                session.manual_search(&place).await;
            }
            _ => bail!("{}", err.message),
        }
    }
}

fn configure(mut config: Config) -> anyhow::Result<()> {
    let token = Text::new("WAQI access token:")
        .with_default(config.token())
        .with_help_message("Get one at https://aqicn.org/data-platform/token/")
        .prompt()?;
    config.token = Some(token.trim().to_string());

    let city = Text::new("Default city:")
        .with_default(config.default_city())
        .with_help_message("Used when your location cannot be detected")
        .prompt()?;
    config.default_city = Some(city.trim().to_string());

    let fixed = Confirm::new("Use a fixed location instead of detecting it?")
        .with_default(config.location.is_some())
        .prompt()?;

    config.location = if fixed {
        let latitude = CustomType::<f64>::new("Latitude:")
            .with_error_message("Please enter a number")
            .prompt()?;
        let longitude = CustomType::<f64>::new("Longitude:")
            .with_error_message("Please enter a number")
            .prompt()?;
        Some(airwatch_core::config::LocationConfig { latitude, longitude })
    } else {
        None
    };

    config.validate()?;
    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}
