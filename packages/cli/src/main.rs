#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the crash hotspot pipeline.
//!
//! Each subcommand runs one stage over the artifacts under the configured
//! data directory; `run` chains them. Without a subcommand an interactive
//! picker is shown. Log output goes through
//! [`crash_hotspots_cli_utils::init_logger`] so it never tears progress
//! bars.

mod stages;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use crash_hotspots_config::PipelineConfig;
use crash_hotspots_config::paths::DataPaths;
use dialoguer::{Confirm, Select};

use crate::stages::{Context, Stage};

#[derive(Parser)]
#[command(
    name = "crash_hotspots",
    about = "Chicago traffic crash hotspot research pipeline"
)]
struct Cli {
    /// TOML config file (falls back to `CRASH_HOTSPOTS_CONFIG`, then
    /// `hotspots.toml` when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Command-line overrides applied on top of the loaded config.
#[derive(Args)]
struct Overrides {
    /// Data directory holding `raw/`, `processed/`, and `results/`
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Maximum crash-to-intersection distance in meters
    #[arg(long, global = true)]
    snap_tolerance_m: Option<f64>,
    /// History window in days
    #[arg(long, global = true)]
    history_days: Option<i64>,
    /// Recent window in days
    #[arg(long, global = true)]
    recent_days: Option<i64>,
    /// Prediction window in days
    #[arg(long, global = true)]
    predict_days: Option<i64>,
    /// Fraction of intersections labeled hotspots per cutoff
    #[arg(long, global = true)]
    hotspot_top_pct: Option<f64>,
    /// Neighbors per intersection in the spatial weights
    #[arg(long, global = true)]
    k_neighbors: Option<usize>,
    /// Permutations for Moran's I pseudo p-values
    #[arg(long, global = true)]
    permutations: Option<usize>,
}

impl Overrides {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.data_dir {
            config.paths.data_dir.clone_from(dir);
        }
        if let Some(v) = self.snap_tolerance_m {
            config.snap.tolerance_m = v;
        }
        if let Some(v) = self.history_days {
            config.windows.history_days = v;
        }
        if let Some(v) = self.recent_days {
            config.windows.recent_days = v;
        }
        if let Some(v) = self.predict_days {
            config.windows.predict_days = v;
        }
        if let Some(v) = self.hotspot_top_pct {
            config.label.hotspot_top_pct = v;
        }
        if let Some(v) = self.k_neighbors {
            config.spatial.k_neighbors = v;
        }
        if let Some(v) = self.permutations {
            config.spatial.permutations = v;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Download crash, people, boundary, census, and OSM data
    Download {
        /// Re-download files that already exist
        #[arg(long)]
        force: bool,
    },
    /// Clean the raw crash and people tables
    Clean,
    /// Build the intersection network and centrality scores
    Network,
    /// Snap crashes to the nearest intersection
    Snap,
    /// Build the temporal feature table with hotspot labels
    Features,
    /// Check artifacts for leakage and regressions (non-zero exit on failure)
    Validate,
    /// Train and evaluate the hotspot classifier
    Model,
    /// Spatial autocorrelation and inequality statistics
    Spatial,
    /// Render the map layer and Markdown report
    Report,
    /// Run every stage in order
    Run {
        /// Include the download stage
        #[arg(long)]
        download: bool,
        /// Re-download files that already exist
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

/// Entries of the interactive picker.
enum Choice {
    RunAll,
    Stage(Stage),
    ShowConfig,
}

impl Choice {
    fn all() -> Vec<Self> {
        std::iter::once(Self::RunAll)
            .chain(Stage::ALL.iter().map(|&s| Self::Stage(s)))
            .chain(std::iter::once(Self::ShowConfig))
            .collect()
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::RunAll => "Run full pipeline",
            Self::Stage(stage) => stage.label(),
            Self::ShowConfig => "Show effective configuration",
        }
    }
}

#[allow(clippy::future_not_send)]
async fn interactive(ctx: &mut Context<'_>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Crash Hotspots Pipeline");
    println!();

    let choices = Choice::all();
    let labels: Vec<&str> = choices.iter().map(Choice::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match &choices[idx] {
        Choice::RunAll => {
            let include_download = Confirm::new()
                .with_prompt("Include the download stage?")
                .default(false)
                .interact()?;
            let stages: Vec<Stage> = Stage::ALL
                .iter()
                .copied()
                .filter(|&s| include_download || s != Stage::Download)
                .collect();
            stages::run_all(&stages, ctx).await
        }
        Choice::Stage(Stage::Download) => {
            ctx.force = Confirm::new()
                .with_prompt("Re-download files that already exist?")
                .default(false)
                .interact()?;
            stages::run(Stage::Download, ctx).await
        }
        Choice::Stage(stage) => stages::run(*stage, ctx).await,
        Choice::ShowConfig => {
            print!("{}", ctx.config.to_toml_string()?);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = crash_hotspots_cli_utils::init_logger();
    let cli = Cli::parse();

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    cli.overrides.apply(&mut config);
    config.validate()?;

    let mut ctx = Context {
        config: &config,
        paths: DataPaths::new(&config.paths.data_dir),
        multi: &multi,
        force: false,
    };

    let Some(command) = cli.command else {
        return interactive(&mut ctx).await;
    };

    match command {
        Commands::Download { force } => {
            ctx.force = force;
            stages::run(Stage::Download, &ctx).await?;
        }
        Commands::Clean => stages::run(Stage::Clean, &ctx).await?,
        Commands::Network => stages::run(Stage::Network, &ctx).await?,
        Commands::Snap => stages::run(Stage::Snap, &ctx).await?,
        Commands::Features => stages::run(Stage::Features, &ctx).await?,
        Commands::Validate => stages::run(Stage::Validate, &ctx).await?,
        Commands::Model => stages::run(Stage::Model, &ctx).await?,
        Commands::Spatial => stages::run(Stage::Spatial, &ctx).await?,
        Commands::Report => stages::run(Stage::Report, &ctx).await?,
        Commands::Run { download, force } => {
            ctx.force = force;
            let stages: Vec<Stage> = Stage::ALL
                .iter()
                .copied()
                .filter(|&s| download || s != Stage::Download)
                .collect();
            stages::run_all(&stages, &ctx).await?;
        }
        Commands::Config => print!("{}", config.to_toml_string()?),
    }

    Ok(())
}
