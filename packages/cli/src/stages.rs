//! Pipeline stages and their execution.

use std::time::Instant;

use crash_hotspots_cli_utils::{IndicatifProgress, MultiProgress};
use crash_hotspots_config::PipelineConfig;
use crash_hotspots_config::paths::DataPaths;
use crash_hotspots_config::progress::ProgressCallback as _;
use crash_hotspots_geography::ingest as census;

/// One step of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Clean,
    Network,
    Snap,
    Features,
    Validate,
    Model,
    Spatial,
    Report,
}

impl Stage {
    pub const ALL: &[Self] = &[
        Self::Download,
        Self::Clean,
        Self::Network,
        Self::Snap,
        Self::Features,
        Self::Validate,
        Self::Model,
        Self::Spatial,
        Self::Report,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Download => "Download raw data",
            Self::Clean => "Clean crash and people tables",
            Self::Network => "Build road network and centrality",
            Self::Snap => "Snap crashes to intersections",
            Self::Features => "Build temporal features",
            Self::Validate => "Validate artifacts",
            Self::Model => "Train and evaluate hotspot model",
            Self::Spatial => "Spatial statistics and inequality",
            Self::Report => "Render map layer and report",
        }
    }
}

/// What every stage needs: configuration, artifact paths, and the
/// terminal to draw progress on.
pub struct Context<'a> {
    pub config: &'a PipelineConfig,
    pub paths: DataPaths,
    pub multi: &'a MultiProgress,
    /// Re-download files that already exist.
    pub force: bool,
}

/// Runs one stage.
///
/// # Errors
///
/// Returns the stage's error, or a validation failure when any check
/// fails.
#[allow(clippy::future_not_send)]
pub async fn run(stage: Stage, ctx: &Context<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    log::info!("=== {} ===", stage.label());
    let config = ctx.config;
    let paths = &ctx.paths;

    match stage {
        Stage::Download => download(ctx).await?,
        Stage::Clean => {
            let summary = crash_hotspots_ingest::run_clean(paths, &config.clean)?;
            log::info!(
                "Kept {} of {} crashes ({} dropped)",
                summary.crashes.kept,
                summary.crashes.input_rows,
                summary.crashes.dropped()
            );
        }
        Stage::Network => {
            let progress = IndicatifProgress::work_bar(ctx.multi, "Computing centrality", "sources");
            let summary = crash_hotspots_network::run(paths, &config.network, &progress)?;
            log::info!(
                "Network has {} intersections and {} edges",
                summary.nodes,
                summary.edges
            );
        }
        Stage::Snap => {
            let progress = IndicatifProgress::work_bar(ctx.multi, "Snapping crashes", "crashes");
            let run = crash_hotspots_ingest::run_snap(paths, &config.snap, &progress)?;
            log::info!(
                "Matched {} of {} crashes ({:.1}%) within {} m",
                run.matched_count,
                run.crash_count,
                run.match_rate * 100.0,
                run.tolerance_m
            );
        }
        Stage::Features => {
            let progress = IndicatifProgress::work_bar(ctx.multi, "Aggregating windows", "cutoffs");
            crash_hotspots_features::run(paths, config, &progress)?;
        }
        Stage::Validate => {
            let report = crash_hotspots_validate::run(paths, config)?;
            if !report.passed() {
                let failed: Vec<&str> = report.failures().map(|c| c.name.as_str()).collect();
                return Err(format!("validation failed: {}", failed.join(", ")).into());
            }
        }
        Stage::Model => {
            crash_hotspots_analysis::model::run(paths, config)?;
        }
        Stage::Spatial => {
            crash_hotspots_analysis::spatial::run(paths, config)?;
        }
        Stage::Report => crash_hotspots_analysis::report::run(paths)?,
    }

    log::info!(
        "{} finished in {:.1}s",
        stage.label(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Runs `stages` in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the first stage error.
#[allow(clippy::future_not_send)]
pub async fn run_all(stages: &[Stage], ctx: &Context<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let steps = IndicatifProgress::stages_bar(ctx.multi, stages.len() as u64);
    for &stage in stages {
        steps.set_message(stage.label().to_string());
        run(stage, ctx).await?;
        steps.inc(1);
    }
    steps.finish("Pipeline complete".to_string());
    log::info!(
        "Pipeline finished in {:.1}s, results in {}",
        start.elapsed().as_secs_f64(),
        ctx.paths.results_dir().display()
    );
    Ok(())
}

#[allow(clippy::future_not_send)]
async fn download(ctx: &Context<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let download = &ctx.config.download;
    let paths = &ctx.paths;
    let client = crash_hotspots_source::build_client()?;

    let progress = IndicatifProgress::rows_bar(ctx.multi, "Crashes");
    crash_hotspots_source::download_crashes(&client, download, paths, ctx.force, &progress).await?;
    let progress = IndicatifProgress::rows_bar(ctx.multi, "People");
    crash_hotspots_source::download_people(&client, download, paths, ctx.force, &progress).await?;
    crash_hotspots_source::download_community_areas(&client, download, paths, ctx.force).await?;
    let progress = IndicatifProgress::download_bar(ctx.multi, "OSM extract");
    crash_hotspots_source::download_osm(&client, download, paths, ctx.force, &progress).await?;

    let census_client = census::build_client()?;
    let tracts = paths.tracts_geojson();
    if ctx.force || !tracts.exists() {
        census::download_tracts(
            &census_client,
            &download.state_fips,
            &download.county_fips,
            &tracts,
        )
        .await?;
    } else {
        log::info!("{} already exists, skipping", tracts.display());
    }

    let acs = paths.acs_raw();
    if ctx.force || !acs.exists() {
        let key = std::env::var(&download.census_api_key_env).ok();
        census::download_acs(
            &census_client,
            download.acs_year,
            &download.state_fips,
            key.as_deref(),
            &acs,
        )
        .await?;
    } else {
        log::info!("{} already exists, skipping", acs.display());
    }
    Ok(())
}
