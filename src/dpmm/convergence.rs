use serde::Serialize;

/// Mean cluster counts of adjacent retained-sample windows differing by more than this are
/// reported as unconverged
const MAX_CLUSTER_COUNT_DRIFT: f64 = 1.0;

/// Fraction of the variant count above which the mean number of new clusters opened per sweep
/// is reported as unconverged
const MAX_NEW_CLUSTER_RATE: f64 = 0.1;

/// Minimum retained samples needed to compare cluster count windows
const MIN_DRIFT_SAMPLES: usize = 8;

/// Non-fatal indication that a sampler run may not have converged
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ConvergenceWarning {
    ClusterCountDrift {
        previous_window_mean: f64,
        final_window_mean: f64,
    },
    FrequentNewClusters {
        mean_new_clusters_per_sweep: f64,
        variant_count: usize,
    },
}

impl std::fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClusterCountDrift {
                previous_window_mean,
                final_window_mean,
            } => write!(
                f,
                "cluster count still changing at end of sampling (mean {previous_window_mean:.2} -> {final_window_mean:.2} over the last two quarters of retained samples)"
            ),
            Self::FrequentNewClusters {
                mean_new_clusters_per_sweep,
                variant_count,
            } => write!(
                f,
                "new clusters opened at a mean rate of {mean_new_clusters_per_sweep:.2} per sweep over the final iterations ({variant_count} variants)"
            ),
        }
    }
}

/// Per-iteration sampler statistics
#[derive(Clone, Debug, Default, Serialize)]
pub struct SamplerTrace {
    /// Active cluster count at the end of each iteration
    pub cluster_counts: Vec<usize>,

    /// Number of clusters opened during each iteration's reassignment sweep
    pub new_cluster_counts: Vec<usize>,
}

fn mean(x: &[usize]) -> f64 {
    x.iter().sum::<usize>() as f64 / x.len() as f64
}

/// Check a finished run for signs of non-convergence
///
/// # Arguments
/// * `retained_cluster_counts` - Cluster count of each retained posterior sample, in order
///
pub fn check_convergence(
    retained_cluster_counts: &[usize],
    trace: &SamplerTrace,
    variant_count: usize,
) -> Vec<ConvergenceWarning> {
    let mut warnings = Vec::new();

    let sample_count = retained_cluster_counts.len();
    if sample_count >= MIN_DRIFT_SAMPLES {
        let quarter = sample_count / 4;
        let final_window = &retained_cluster_counts[sample_count - quarter..];
        let previous_window = &retained_cluster_counts[sample_count - 2 * quarter..sample_count - quarter];
        let final_window_mean = mean(final_window);
        let previous_window_mean = mean(previous_window);
        if (final_window_mean - previous_window_mean).abs() > MAX_CLUSTER_COUNT_DRIFT {
            warnings.push(ConvergenceWarning::ClusterCountDrift {
                previous_window_mean,
                final_window_mean,
            });
        }
    }

    let iteration_count = trace.new_cluster_counts.len();
    if iteration_count > 0 && variant_count > 0 {
        let tail = std::cmp::max(1, iteration_count / 10);
        let mean_new_clusters_per_sweep =
            mean(&trace.new_cluster_counts[iteration_count - tail..]);
        if mean_new_clusters_per_sweep > MAX_NEW_CLUSTER_RATE * variant_count as f64 {
            warnings.push(ConvergenceWarning::FrequentNewClusters {
                mean_new_clusters_per_sweep,
                variant_count,
            });
        }
    }

    warnings
}
