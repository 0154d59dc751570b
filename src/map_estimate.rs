//! Maximum a posteriori configuration selection and re-optimization
//!

use itertools::Itertools;
use serde::Serialize;

use crate::cluster_model::{ClusterModel, ModelScore};
use crate::dpmm::{ObservationSet, PosteriorSample};
use crate::likelihood::{LikelihoodModel, ReadSupportTerms};

/// Width of the final bracket in the CCF maximum likelihood search
const CCF_SEARCH_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Debug, Serialize)]
pub struct MapEstimate {
    /// Iteration of the posterior sample the estimate started from
    pub source_iteration: usize,

    pub model: ClusterModel,
    pub score: ModelScore,

    /// Number of conditional mode rounds run during re-optimization
    pub rounds: usize,
}

/// Find the retained sample with the highest joint log posterior
///
/// Ties are resolved in favor of the earliest sample.
///
pub fn select_max_posterior_sample(samples: &[PosteriorSample]) -> Option<&PosteriorSample> {
    samples
        .iter()
        .rev()
        .max_by(|a, b| a.ln_posterior.total_cmp(&b.ln_posterior))
}

/// Maximize a unimodal function on the interval [lower, upper]
fn golden_section_max(f: impl Fn(f64) -> f64, lower: f64, upper: f64) -> f64 {
    let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
    let (mut a, mut b) = (lower, upper);
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);
    while b - a > CCF_SEARCH_TOLERANCE {
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = f(d);
        }
    }
    (a + b) / 2.0
}

/// Maximum likelihood CCF of a group of variants sharing one cluster
pub fn max_likelihood_ccf(model: &LikelihoodModel, members: &[&ReadSupportTerms]) -> f64 {
    golden_section_max(
        |ccf| model.ln_likelihood_sum(members.iter().copied(), ccf),
        0.0,
        1.0,
    )
}

fn optimize_cluster_ccfs(model: &mut ClusterModel, observations: &ObservationSet) {
    model.ccf = model
        .member_terms(observations)
        .iter()
        .map(|x| max_likelihood_ccf(&observations.model, x))
        .collect();
}

/// Reassign every variant to the cluster maximizing ln(cluster size) + variant log-likelihood
///
/// Cluster sizes and CCFs are held at their values from the start of the round. A variant only
/// moves on a strict improvement.
///
/// Returns true if any assignment changed.
///
fn reassign_variants(model: &mut ClusterModel, observations: &ObservationSet) -> bool {
    let ln_sizes = model
        .cluster_sizes()
        .iter()
        .map(|&x| (x as f64).ln())
        .collect::<Vec<_>>();
    let score = |variant_index: usize, label: usize| {
        ln_sizes[label] + observations.ln_likelihood(variant_index, model.ccf[label])
    };

    let new_labels = model
        .labels
        .iter()
        .enumerate()
        .map(|(variant_index, &current)| {
            let mut best = (current, score(variant_index, current));
            for label in 0..model.cluster_count() {
                let x = score(variant_index, label);
                if x > best.1 {
                    best = (label, x);
                }
            }
            best.0
        })
        .collect::<Vec<_>>();

    if new_labels == model.labels {
        return false;
    }
    *model = ClusterModel::from_sparse_labels(&new_labels, &model.ccf);
    true
}

/// Refine a configuration against the data by iterated conditional modes
///
/// Each round sets every cluster CCF to its maximum likelihood value and then reassigns
/// variants, until assignments stop changing or `max_rounds` is reached. Clusters left empty are
/// dropped.
///
/// Returns the refined model and the number of rounds run
///
pub fn reoptimize(
    mut model: ClusterModel,
    observations: &ObservationSet,
    max_rounds: usize,
) -> (ClusterModel, usize) {
    for round in 0..max_rounds {
        optimize_cluster_ccfs(&mut model, observations);
        if !reassign_variants(&mut model, observations) {
            return (model, round + 1);
        }
    }
    optimize_cluster_ccfs(&mut model, observations);
    (model, max_rounds)
}

/// Select the highest posterior sample of a run and refine it against the data
///
pub fn estimate_map(
    samples: &[PosteriorSample],
    observations: &ObservationSet,
    max_rounds: usize,
) -> Option<MapEstimate> {
    let sample = select_max_posterior_sample(samples)?;
    let (model, rounds) = reoptimize(ClusterModel::from_sample(sample), observations, max_rounds);
    let score = ModelScore::new(&model, observations);
    Some(MapEstimate {
        source_iteration: sample.iteration,
        model,
        score,
        rounds,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ModelStage {
    Map,
    Merged,
}

/// One row of the model selection report
#[derive(Clone, Debug, Serialize)]
pub struct ModelSelectionEntry {
    pub run_index: usize,
    pub stage: ModelStage,
    pub score: ModelScore,
}

/// Find the run with minimum BIC, using the last reported stage of each run
///
pub fn select_best_run(entries: &[ModelSelectionEntry]) -> Option<usize> {
    entries
        .iter()
        .chunk_by(|x| x.run_index)
        .into_iter()
        .filter_map(|(_, run_entries)| run_entries.last())
        .min_by(|a, b| a.score.bic.total_cmp(&b.score.bic))
        .map(|x| x.run_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::Variant;

    fn get_observations(data: &[(u64, u64)]) -> ObservationSet {
        let variants = data
            .iter()
            .enumerate()
            .map(|(i, &(s, t))| Variant::new(&format!("v{i}"), s, t, 1.0).unwrap())
            .collect::<Vec<_>>();
        ObservationSet::new(&variants, LikelihoodModel::Binomial, 100).unwrap()
    }

    fn sample(iteration: usize, ln_posterior: f64) -> PosteriorSample {
        PosteriorSample {
            iteration,
            labels: vec![0],
            ccf: vec![0.5],
            alpha: 1.0,
            ln_likelihood: 0.0,
            ln_posterior,
        }
    }

    #[test]
    fn test_select_max_posterior_sample() {
        let samples = vec![sample(0, -10.0), sample(1, -3.0), sample(2, -3.0), sample(3, -7.0)];
        assert_eq!(select_max_posterior_sample(&samples).unwrap().iteration, 1);
        assert!(select_max_posterior_sample(&[]).is_none());
    }

    #[test]
    fn test_max_likelihood_ccf() {
        let observations = get_observations(&[(30, 100), (10, 100)]);
        let members = observations.terms.iter().collect::<Vec<_>>();
        let ccf = max_likelihood_ccf(&LikelihoodModel::Binomial, &members);
        approx::assert_abs_diff_eq!(ccf, 0.2, epsilon = 1e-4);

        let observations = get_observations(&[(0, 100)]);
        let members = observations.terms.iter().collect::<Vec<_>>();
        let ccf = max_likelihood_ccf(&LikelihoodModel::Binomial, &members);
        approx::assert_abs_diff_eq!(ccf, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_reoptimize_moves_misassigned_variant() {
        let observations = get_observations(&[(50, 100), (50, 100), (50, 100), (10, 100)]);
        let model = ClusterModel {
            labels: vec![0, 0, 1, 1],
            ccf: vec![0.5, 0.3],
        };
        let (model, rounds) = reoptimize(model, &observations, 20);
        assert_eq!(model.labels, vec![0, 0, 0, 1]);
        approx::assert_abs_diff_eq!(model.ccf[0], 0.5, epsilon = 1e-4);
        approx::assert_abs_diff_eq!(model.ccf[1], 0.1, epsilon = 1e-4);
        assert_eq!(rounds, 2);
    }

    #[test]
    fn test_reoptimize_drops_empty_cluster() {
        let observations = get_observations(&[(50, 100), (50, 100), (50, 100)]);
        let model = ClusterModel {
            labels: vec![0, 0, 1],
            ccf: vec![0.5, 0.5],
        };
        let (model, _) = reoptimize(model, &observations, 20);
        assert_eq!(model.cluster_count(), 1);
        assert_eq!(model.labels, vec![0, 0, 0]);
    }

    #[test]
    fn test_reoptimize_never_lowers_likelihood_on_stable_assignment() {
        let observations = get_observations(&[(20, 100), (25, 100), (80, 100)]);
        let model = ClusterModel {
            labels: vec![0, 0, 1],
            ccf: vec![0.4, 0.6],
        };
        let start = model.ln_likelihood(&observations);
        let (model, _) = reoptimize(model, &observations, 20);
        assert!(model.ln_likelihood(&observations) >= start);
    }

    #[test]
    fn test_select_best_run() {
        let entry = |run_index, stage, bic| ModelSelectionEntry {
            run_index,
            stage,
            score: ModelScore {
                cluster_count: 1,
                ln_likelihood: 0.0,
                aic: 0.0,
                bic,
            },
        };
        let entries = vec![
            entry(0, ModelStage::Map, 10.0),
            entry(0, ModelStage::Merged, 12.0),
            entry(1, ModelStage::Map, 11.0),
            entry(2, ModelStage::Map, 15.0),
        ];
        assert_eq!(select_best_run(&entries), Some(1));
        assert_eq!(ModelStage::Merged.to_string(), "merged");
    }
}
