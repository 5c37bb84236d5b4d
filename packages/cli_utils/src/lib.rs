#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing shared by the crash hotspot binaries.
//!
//! [`IndicatifProgress`] renders [`ProgressCallback`] updates as
//! `indicatif` bars: bytes and transfer rate for the OSM extract, rows
//! for portal exports, and units per second for the compute stages.
//! [`init_logger`] routes `log` output through the same
//! [`MultiProgress`] so log lines and bars never interleave.

use std::sync::Arc;
use std::time::Duration;

use crash_hotspots_config::progress::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// Spinner shown until a stage reports its total.
const SPINNER: &str = "{spinner:.cyan} {msg} {human_pos}";

/// Byte transfers (the OSM extract): size and throughput.
const BYTES: &str =
    "  {msg} {wide_bar:.cyan/dim} {bytes}/{total_bytes} {binary_bytes_per_sec} [{eta}]";

/// Paged Socrata exports and compute loops: counted units with a rate.
fn counted_template(unit: &str) -> String {
    format!("  {{msg}} {{wide_bar:.yellow/dim}} {{human_pos}}/{{human_len}} {unit} {{per_sec}} [{{eta}}]")
}

/// The top-level bar: stages done out of stages selected, with the
/// running stage as the message.
const STAGES: &str = "Pipeline {wide_bar:.green/dim} {pos}/{len} {msg} [{elapsed_precise}]";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// An `indicatif` [`ProgressBar`] that implements [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Style applied once `set_total()` provides a length.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    fn spinner(multi: &MultiProgress, message: &str, bar_style: ProgressStyle) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template(SPINNER)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());
        Self { bar, bar_style }
    }

    /// A byte download whose size comes from `Content-Length`, when the
    /// server sends one.
    #[must_use]
    pub fn download_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::spinner(multi, message, style(BYTES)))
    }

    /// A paged portal export counted in rows. The total is the row cap,
    /// so it stays a spinner for uncapped pulls.
    #[must_use]
    pub fn rows_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::spinner(
            multi,
            message,
            style(&counted_template("rows")),
        ))
    }

    /// A compute loop over `unit`s (crashes snapped, centrality sources,
    /// window cutoffs), showing units per second once the total is known.
    #[must_use]
    pub fn work_bar(multi: &MultiProgress, message: &str, unit: &str) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::spinner(multi, message, style(&counted_template(unit))))
    }

    fn stages(multi: &MultiProgress, total: u64) -> Self {
        let bar = multi.add(ProgressBar::new(total));
        let bar_style = style(STAGES);
        bar.set_style(bar_style.clone());
        Self { bar, bar_style }
    }

    /// The pipeline bar over the selected stages.
    #[must_use]
    pub fn stages_bar(multi: &MultiProgress, total: u64) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::stages(multi, total))
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style.clone());
    }

    fn set_position(&self, pos: u64) {
        self.bar.set_position(pos);
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Installs `pretty_env_logger` behind `indicatif-log-bridge`.
///
/// `RUST_LOG` controls the filter and defaults to `info` when unset.
/// Returns the [`MultiProgress`] every progress bar must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    if std::env::var_os("RUST_LOG").is_some() {
        builder.parse_env("RUST_LOG");
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }
    let logger = builder.build();
    let level = logger.filter();

    // Already set when called twice, e.g. from tests.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use indicatif::ProgressDrawTarget;

    use super::*;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn every_template_parses() {
        for template in [
            SPINNER.to_string(),
            BYTES.to_string(),
            STAGES.to_string(),
            counted_template("crashes"),
        ] {
            assert!(
                ProgressStyle::with_template(&template).is_ok(),
                "{template}"
            );
        }
        assert!(counted_template("cutoffs").contains("{human_len} cutoffs {per_sec}"));
    }

    #[test]
    fn total_resets_position_and_length() {
        let multi = hidden();
        let snap = IndicatifProgress::spinner(
            &multi,
            "Snapping crashes",
            style(&counted_template("crashes")),
        );
        snap.inc(7);
        snap.set_total(40);
        assert_eq!(snap.bar.position(), 0);
        assert_eq!(snap.bar.length(), Some(40));
        snap.inc(3);
        assert_eq!(snap.bar.position(), 3);
        snap.finish("done".to_string());
        assert!(snap.bar.is_finished());
    }

    #[test]
    fn stages_bar_starts_with_known_length() {
        let multi = hidden();
        let steps = IndicatifProgress::stages(&multi, 9);
        assert_eq!(steps.bar.length(), Some(9));
        steps.set_message("snap".to_string());
        steps.inc(1);
        assert_eq!(steps.bar.position(), 1);
        assert_eq!(steps.bar.message(), "snap");
    }
}
