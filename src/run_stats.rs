//! Track stats for the whole svclust run
//!

use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use unwrap::unwrap;

pub const RUN_STATS_FILENAME: &str = "run.stats.json";

#[derive(Default, Deserialize, Serialize)]
pub struct VariantSetStats {
    /// Variant set label, also used as the output subdirectory name
    pub label: String,

    pub variant_count: usize,
    pub requested_run_count: usize,
    pub completed_run_count: usize,

    /// Error message of each failed run
    pub failed_runs: Vec<String>,

    pub best_run: usize,
    pub best_run_cluster_count: usize,
    pub convergence_warning_count: usize,
    pub sampling_time_secs: f64,
}

#[derive(Default, Deserialize, Serialize)]
pub struct ClusterRunStats {
    pub sample_name: String,
    pub purity: f64,
    pub ploidy: f64,
    pub variant_sets: Vec<VariantSetStats>,
}

/// Write run_stats structure out in json format
pub fn write_cluster_run_stats(output_dir: &Utf8Path, run_stats: &ClusterRunStats) {
    let filename = output_dir.join(RUN_STATS_FILENAME);

    info!("Writing run statistics to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create run statistics json file: '{filename}'"
    );

    serde_json::to_writer_pretty(&f, &run_stats).unwrap();
}
