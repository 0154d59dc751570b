//! Fit one variant set: concurrent sampler runs followed by per-run post-processing
//!

use std::collections::HashSet;
use std::sync::mpsc::channel;

use log::{info, warn};

use crate::cluster_config::ClusterConfig;
use crate::cluster_merge::merge_overlapping_clusters;
use crate::cluster_model::{ClusterModel, ModelScore};
use crate::cocluster::{CoclusterMatrix, compute_cocluster_matrix};
use crate::dpmm::{ObservationSet, SamplerRun, run_sampler};
use crate::errors::{ClusterError, ClusterResult, invalid_input};
use crate::map_estimate::{
    MapEstimate, ModelSelectionEntry, ModelStage, estimate_map, select_best_run,
    select_max_posterior_sample,
};
use crate::summary::{ClusterSummary, VariantSummary, summarize_clusters, summarize_variants};
use crate::variant::Variant;

/// All results of one successful sampler run
pub struct RunFit {
    pub run: SamplerRun,

    pub map_estimate: Option<MapEstimate>,

    /// Final representative configuration, after MAP refinement and merging where enabled
    pub model: ClusterModel,

    /// Log posterior of the highest posterior retained sample
    pub max_ln_posterior: f64,

    pub model_selection: Vec<ModelSelectionEntry>,
    pub variant_summaries: Vec<VariantSummary>,
    pub cluster_summaries: Vec<ClusterSummary>,
    pub cocluster: Option<CoclusterMatrix>,
}

#[derive(Clone, Debug)]
pub struct FailedRun {
    pub run_index: usize,
    pub error: ClusterError,
}

pub struct VariantSetFit {
    /// Successful runs in run index order
    pub runs: Vec<RunFit>,

    pub failed_runs: Vec<FailedRun>,

    /// Run index of the best run
    pub best_run: usize,
}

impl VariantSetFit {
    pub fn best(&self) -> Option<&RunFit> {
        self.runs.iter().find(|x| x.run.run_index == self.best_run)
    }

    pub fn model_selection(&self) -> impl Iterator<Item = &ModelSelectionEntry> {
        self.runs.iter().flat_map(|x| x.model_selection.iter())
    }
}

fn check_variant_set(variants: &[Variant]) -> ClusterResult<()> {
    if variants.is_empty() {
        return Err(invalid_input("input", "no variants available for clustering"));
    }
    let mut ids = HashSet::new();
    for variant in variants {
        variant.check_likelihood_terms()?;
        if !ids.insert(variant.id.as_str()) {
            return Err(invalid_input(&variant.id, "duplicated variant id"));
        }
    }
    Ok(())
}

/// Run all requested sampler restarts on a shared worker pool
///
/// Returns the result of each run, sorted by run index
///
fn run_all_samplers(
    variants: &[Variant],
    observations: &ObservationSet,
    config: &ClusterConfig,
) -> Vec<(usize, ClusterResult<SamplerRun>)> {
    let n_runs = config.sampler.n_runs;
    let worker_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(std::cmp::min(config.thread_count, n_runs))
        .build()
        .unwrap();

    let (tx, rx) = channel();

    worker_pool.scope(move |scope| {
        for run_index in 0..n_runs {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let result = run_sampler(variants, observations, &config.sampler, run_index);
                tx.send((run_index, result)).unwrap();
            });
        }
    });

    let mut results = rx.into_iter().collect::<Vec<_>>();
    results.sort_by_key(|x| x.0);
    results
}

/// Separate successful runs from failed runs, keeping run index order
///
/// A failed run is logged and recorded without affecting any other run. An error is only
/// returned if no run succeeded.
///
fn split_run_results(
    results: Vec<(usize, ClusterResult<SamplerRun>)>,
    requested: usize,
) -> ClusterResult<(Vec<SamplerRun>, Vec<FailedRun>)> {
    let mut runs = Vec::new();
    let mut failed_runs = Vec::new();
    for (run_index, result) in results {
        match result {
            Ok(run) => runs.push(run),
            Err(error) => {
                warn!("Sampler run {run_index} failed: {error}");
                failed_runs.push(FailedRun { run_index, error });
            }
        }
    }

    if runs.is_empty() {
        let first_error = failed_runs
            .first()
            .map(|x| x.error.to_string())
            .unwrap_or_default();
        return Err(ClusterError::AllRunsFailed {
            requested,
            first_error,
        });
    }
    Ok((runs, failed_runs))
}

/// Derive the representative configuration, summaries and reports of one completed run
///
fn process_run(
    run: SamplerRun,
    variants: &[Variant],
    observations: &ObservationSet,
    config: &ClusterConfig,
) -> RunFit {
    let run_index = run.run_index;
    for warning in run.warnings.iter() {
        warn!("Sampler run {run_index} may not have converged: {warning}");
    }

    // Retained sample count is validated to be non-zero before sampling
    let best_sample = select_max_posterior_sample(&run.samples).unwrap();
    let max_ln_posterior = best_sample.ln_posterior;

    let mut model_selection = Vec::new();
    let (mut model, map_estimate) = if config.use_map {
        let estimate = estimate_map(&run.samples, observations, config.map_max_rounds).unwrap();
        info!(
            "Run {run_index}: MAP estimate from iteration {} has {} clusters after {} refinement rounds, BIC {:.2}",
            estimate.source_iteration,
            estimate.score.cluster_count,
            estimate.rounds,
            estimate.score.bic
        );
        model_selection.push(ModelSelectionEntry {
            run_index,
            stage: ModelStage::Map,
            score: estimate.score.clone(),
        });
        (estimate.model.clone(), Some(estimate))
    } else {
        (ClusterModel::from_sample(best_sample), None)
    };

    if config.merge_clusters {
        let merged =
            merge_overlapping_clusters(&model, observations, config.merge_credible_level);
        if merged.cluster_count() < model.cluster_count() {
            info!(
                "Run {run_index}: merged {} clusters into {}",
                model.cluster_count(),
                merged.cluster_count()
            );
            if config.use_map {
                model_selection.push(ModelSelectionEntry {
                    run_index,
                    stage: ModelStage::Merged,
                    score: ModelScore::new(&merged, observations),
                });
            }
            model = merged;
        }
    }

    let variant_summaries = summarize_variants(variants, &model, &run.samples);
    let cluster_summaries =
        summarize_clusters(&model, &run.samples, config.summary_credible_level);
    let cocluster = config.cocluster_matrix.then(|| {
        let ids = variants.iter().map(|x| x.id.as_str()).collect::<Vec<_>>();
        compute_cocluster_matrix(&run.samples, &ids, config.thread_count)
    });

    RunFit {
        run,
        map_estimate,
        model,
        max_ln_posterior,
        model_selection,
        variant_summaries,
        cluster_summaries,
        cocluster,
    }
}

/// With MAP enabled select the minimum BIC run, otherwise the run with the highest posterior
/// retained sample
///
fn get_best_run_index(runs: &[RunFit], use_map: bool) -> usize {
    let best = if use_map {
        let entries = runs
            .iter()
            .flat_map(|x| x.model_selection.iter().cloned())
            .collect::<Vec<_>>();
        select_best_run(&entries)
    } else {
        runs.iter()
            .rev()
            .max_by(|a, b| a.max_ln_posterior.total_cmp(&b.max_ln_posterior))
            .map(|x| x.run.run_index)
    };
    best.unwrap_or(runs[0].run.run_index)
}

/// Cluster one variant set by CCF
///
/// The configuration and variants are validated before any sampling begins. Independent runs
/// execute concurrently, and a failed run does not abort its siblings. The fit only fails if
/// every run fails.
///
pub fn fit_variant_set(variants: &[Variant], config: &ClusterConfig) -> ClusterResult<VariantSetFit> {
    config.validate()?;
    check_variant_set(variants)?;

    let sampler_config = &config.sampler;
    let observations =
        ObservationSet::new(variants, sampler_config.likelihood, sampler_config.grid_size)?;

    info!(
        "Starting {} sampler runs over {} variants, {} iterations per run",
        sampler_config.n_runs,
        variants.len(),
        sampler_config.n_iter
    );
    let results = run_all_samplers(variants, &observations, config);
    let (runs, failed_runs) = split_run_results(results, sampler_config.n_runs)?;
    info!(
        "Completed {} of {} sampler runs",
        runs.len(),
        sampler_config.n_runs
    );

    let runs = runs
        .into_iter()
        .map(|run| process_run(run, variants, &observations, config))
        .collect::<Vec<_>>();

    let best_run = get_best_run_index(&runs, config.use_map);
    info!("Best run: {best_run}");

    Ok(VariantSetFit {
        runs,
        failed_runs,
        best_run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_config::SamplerConfig;
    use crate::dpmm::SamplerTrace;
    use crate::features::{SampleContext, build_variant_set};
    use crate::variant::{RawVariantRecord, VariantKind};

    fn get_variants(data: &[(u64, u64)]) -> Vec<Variant> {
        data.iter()
            .enumerate()
            .map(|(i, &(s, t))| Variant::new(&format!("v{i}"), s, t, 1.0).unwrap())
            .collect()
    }

    fn get_config(n_iter: usize, burn: usize, thin: usize) -> ClusterConfig {
        ClusterConfig {
            sampler: SamplerConfig {
                n_iter,
                burn,
                thin,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_two_similar_variants_cocluster() {
        let variants = get_variants(&[(50, 100), (50, 100), (10, 100)]);
        let mut config = get_config(3000, 500, 5);
        config.sampler.n_runs = 4;
        config.thread_count = 2;
        config.cocluster_matrix = true;
        let fit = fit_variant_set(&variants, &config).unwrap();
        assert!(fit.failed_runs.is_empty());
        assert_eq!(fit.runs.len(), 4);

        // Pool the co-clustering probabilities of all runs
        let mean_cocluster = |id1: &str, id2: &str| {
            fit.runs
                .iter()
                .map(|x| x.cocluster.as_ref().unwrap().get_by_id(id1, id2).unwrap())
                .sum::<f64>()
                / fit.runs.len() as f64
        };
        for x in fit.runs.iter() {
            assert_eq!(x.run.samples.len(), 500);
        }
        assert!(mean_cocluster("v0", "v1") > 0.8);
        assert!(1.0 - mean_cocluster("v0", "v2") > 0.8);
        assert!(1.0 - mean_cocluster("v1", "v2") > 0.8);
    }

    #[test]
    fn test_identical_variants_converge_to_one_cluster() {
        let variants = get_variants(&[(30, 60); 8]);
        let config = get_config(1000, 200, 2);
        let fit = fit_variant_set(&variants, &config).unwrap();

        let samples = &fit.best().unwrap().run.samples;
        let single_cluster_count = samples.iter().filter(|x| x.cluster_count() == 1).count();
        assert!(2 * single_cluster_count > samples.len());
    }

    #[test]
    fn test_zero_iterations_is_configuration_error() {
        let variants = get_variants(&[(50, 100)]);
        let config = get_config(0, 0, 1);
        let result = fit_variant_set(&variants, &config);
        assert!(matches!(result, Err(ClusterError::Configuration { .. })));
    }

    #[test]
    fn test_support_above_depth_is_input_error() {
        let raw = RawVariantRecord {
            id: "bad".to_string(),
            kind: VariantKind::Sv,
            support: 10,
            depth: 5,
            major_cn: None,
            minor_cn: None,
            classification: None,
        };
        let result = build_variant_set(&[raw], &SampleContext::default());
        assert!(matches!(result, Err(ClusterError::InputValidation { .. })));

        // Directly constructed variants are rejected in the same way
        assert!(matches!(
            Variant::new("bad", 10, 5, 1.0),
            Err(ClusterError::InputValidation { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut variants = get_variants(&[(50, 100), (20, 100)]);
        variants[1].id = "v0".to_string();
        let result = fit_variant_set(&variants, &get_config(10, 0, 1));
        assert!(matches!(result, Err(ClusterError::InputValidation { .. })));
    }

    #[test]
    fn test_multiple_runs_with_map_and_merge() {
        let mut data = vec![(20, 100); 6];
        data.extend(vec![(70, 100); 6]);
        let variants = get_variants(&data);
        let mut config = get_config(300, 100, 2);
        config.sampler.n_runs = 3;
        config.thread_count = 2;
        config.use_map = true;
        config.merge_clusters = true;
        let fit = fit_variant_set(&variants, &config).unwrap();

        assert_eq!(fit.runs.len(), 3);
        let run_indices = fit.runs.iter().map(|x| x.run.run_index).collect::<Vec<_>>();
        assert_eq!(run_indices, vec![0, 1, 2]);
        assert!(fit.model_selection().all(|x| x.score.bic.is_finite()));

        let best = fit.best().unwrap();
        assert!(best.map_estimate.is_some());
        assert_eq!(best.model.cluster_count(), 2);
        assert_eq!(best.model.labels[0], best.model.labels[5]);
        assert_ne!(best.model.labels[0], best.model.labels[6]);
        approx::assert_abs_diff_eq!(best.model.ccf[best.model.labels[0]], 0.2, epsilon = 0.02);
        assert_eq!(best.variant_summaries.len(), 12);
        assert_eq!(best.cluster_summaries.len(), 2);
    }

    #[test]
    fn test_runs_are_reproducible_across_thread_counts() {
        let variants = get_variants(&[(10, 50), (30, 60), (5, 40), (45, 50)]);
        let mut config = get_config(200, 50, 1);
        config.sampler.n_runs = 2;
        config.thread_count = 1;
        let fit1 = fit_variant_set(&variants, &config).unwrap();
        config.thread_count = 2;
        let fit2 = fit_variant_set(&variants, &config).unwrap();
        for (a, b) in fit1.runs.iter().zip(fit2.runs.iter()) {
            assert_eq!(a.run.samples, b.run.samples);
        }
    }

    fn completed_run(run_index: usize) -> SamplerRun {
        SamplerRun {
            run_index,
            seed: run_index as u64,
            samples: Vec::new(),
            trace: SamplerTrace::default(),
            warnings: Vec::new(),
        }
    }

    fn degenerate_run_error(iteration: usize) -> ClusterError {
        ClusterError::NumericDegeneracy {
            id: "v0".to_string(),
            iteration,
            msg: "all cluster assignment probabilities are zero or undefined".to_string(),
        }
    }

    #[test]
    fn test_failed_run_does_not_affect_other_runs() {
        let results = vec![
            (0, Ok(completed_run(0))),
            (1, Err(degenerate_run_error(7))),
            (2, Ok(completed_run(2))),
        ];
        let (runs, failed_runs) = split_run_results(results, 3).unwrap();

        let run_indices = runs.iter().map(|x| x.run_index).collect::<Vec<_>>();
        assert_eq!(run_indices, vec![0, 2]);
        assert_eq!(failed_runs.len(), 1);
        assert_eq!(failed_runs[0].run_index, 1);
        assert!(matches!(
            failed_runs[0].error,
            ClusterError::NumericDegeneracy { iteration: 7, .. }
        ));
    }

    #[test]
    fn test_all_runs_failed() {
        let results = vec![
            (0, Err(degenerate_run_error(3))),
            (1, Err(degenerate_run_error(5))),
        ];
        let result = split_run_results(results, 2);
        match result {
            Err(ClusterError::AllRunsFailed {
                requested,
                first_error,
            }) => {
                assert_eq!(requested, 2);
                assert!(first_error.contains("v0"));
            }
            _ => panic!("expected all runs to fail"),
        }
    }
}
