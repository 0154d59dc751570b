//! Per-variant and per-cluster summaries of a fitted run
//!

use std::collections::HashMap;

use serde::Serialize;

use crate::cluster_model::ClusterModel;
use crate::dpmm::PosteriorSample;
use crate::prob_utils::sorted_quantile;
use crate::variant::{Variant, VariantKind};

#[derive(Clone, Debug, Serialize)]
pub struct VariantSummary {
    pub id: String,
    pub kind: VariantKind,

    /// Cluster label in the representative model
    pub cluster: usize,

    /// CCF of the variant's cluster in the representative model
    pub ccf: f64,

    /// Mean over retained samples of the CCF of the variant's cluster
    pub posterior_mean_ccf: f64,

    /// Mean over retained samples of the fraction of the variant's representative cluster mates
    /// sharing its cluster
    ///
    /// For a variant alone in its representative cluster, this is the fraction of samples in
    /// which it is alone.
    pub assignment_probability: f64,

    pub multiplicity: u32,
    pub successes: u64,
    pub trials: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub size: usize,
    pub ccf: f64,

    /// Mean over retained samples of the mean member CCF
    pub posterior_mean_ccf: f64,

    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// Fraction of representative cluster mates sharing each variant's cluster, for one sample
fn accumulate_assignment_support(
    sample: &PosteriorSample,
    members: &[Vec<usize>],
    support: &mut [f64],
) {
    let mut sample_cluster_sizes = HashMap::new();
    for &label in sample.labels.iter() {
        *sample_cluster_sizes.entry(label).or_insert(0usize) += 1;
    }

    let mut label_counts = HashMap::new();
    for cluster_members in members {
        label_counts.clear();
        for &x in cluster_members {
            *label_counts.entry(sample.labels[x]).or_insert(0usize) += 1;
        }
        let mate_count = cluster_members.len() - 1;
        for &x in cluster_members {
            let label = sample.labels[x];
            support[x] += if mate_count == 0 {
                if sample_cluster_sizes[&label] == 1 { 1.0 } else { 0.0 }
            } else {
                (label_counts[&label] - 1) as f64 / mate_count as f64
            };
        }
    }
}

pub fn summarize_variants(
    variants: &[Variant],
    model: &ClusterModel,
    samples: &[PosteriorSample],
) -> Vec<VariantSummary> {
    let members = model.cluster_members();
    let sample_count = samples.len() as f64;

    let mut ccf_total = vec![0.0; variants.len()];
    let mut support = vec![0.0; variants.len()];
    for sample in samples {
        for (variant_index, total) in ccf_total.iter_mut().enumerate() {
            *total += sample.variant_ccf(variant_index);
        }
        accumulate_assignment_support(sample, &members, &mut support);
    }

    variants
        .iter()
        .enumerate()
        .map(|(i, variant)| {
            let cluster = model.labels[i];
            let (posterior_mean_ccf, assignment_probability) = if samples.is_empty() {
                (model.ccf[cluster], 1.0)
            } else {
                (ccf_total[i] / sample_count, support[i] / sample_count)
            };
            VariantSummary {
                id: variant.id.clone(),
                kind: variant.kind,
                cluster,
                ccf: model.ccf[cluster],
                posterior_mean_ccf,
                assignment_probability,
                multiplicity: variant.multiplicity,
                successes: variant.successes,
                trials: variant.trials,
            }
        })
        .collect()
}

/// Summarize each representative cluster, with a central credible interval at `credible_level`
/// taken from the per-sample mean CCF of the cluster's members
///
pub fn summarize_clusters(
    model: &ClusterModel,
    samples: &[PosteriorSample],
    credible_level: f64,
) -> Vec<ClusterSummary> {
    let tail = (1.0 - credible_level) / 2.0;
    model
        .cluster_members()
        .iter()
        .enumerate()
        .map(|(cluster, members)| {
            let ccf = model.ccf[cluster];
            let mut member_means = samples
                .iter()
                .map(|sample| {
                    members.iter().map(|&x| sample.variant_ccf(x)).sum::<f64>()
                        / members.len() as f64
                })
                .collect::<Vec<_>>();
            let (posterior_mean_ccf, ci_lower, ci_upper) = if member_means.is_empty() {
                (ccf, ccf, ccf)
            } else {
                member_means.sort_by(|a, b| a.total_cmp(b));
                (
                    member_means.iter().sum::<f64>() / member_means.len() as f64,
                    sorted_quantile(&member_means, tail),
                    sorted_quantile(&member_means, 1.0 - tail),
                )
            };
            ClusterSummary {
                cluster,
                size: members.len(),
                ccf,
                posterior_mean_ccf,
                ci_lower,
                ci_upper,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(labels: Vec<usize>, ccf: Vec<f64>) -> PosteriorSample {
        PosteriorSample {
            iteration: 0,
            labels,
            ccf,
            alpha: 1.0,
            ln_likelihood: 0.0,
            ln_posterior: 0.0,
        }
    }

    fn get_variants() -> Vec<Variant> {
        (0..4)
            .map(|i| Variant::new(&format!("v{i}"), 10, 40, 0.5).unwrap())
            .collect()
    }

    #[test]
    fn test_summarize_variants() {
        let model = ClusterModel {
            labels: vec![0, 0, 0, 1],
            ccf: vec![0.5, 0.2],
        };
        let samples = vec![
            sample(vec![0, 0, 0, 1], vec![0.4, 0.2]),
            sample(vec![0, 0, 1, 1], vec![0.6, 0.2]),
        ];
        let summaries = summarize_variants(&get_variants(), &model, &samples);
        assert_eq!(summaries.len(), 4);

        // Variant 0 shares with both mates, then with one of two
        approx::assert_abs_diff_eq!(summaries[0].assignment_probability, 0.75);
        // Variant 2 shares with both mates, then with neither
        approx::assert_abs_diff_eq!(summaries[2].assignment_probability, 0.5);
        // Variant 3 is alone in the first sample only
        approx::assert_abs_diff_eq!(summaries[3].assignment_probability, 0.5);

        approx::assert_abs_diff_eq!(summaries[0].posterior_mean_ccf, 0.5);
        approx::assert_abs_diff_eq!(summaries[2].posterior_mean_ccf, 0.3);
        assert_eq!(summaries[3].cluster, 1);
        approx::assert_abs_diff_eq!(summaries[3].ccf, 0.2);
        assert_eq!(summaries[1].id, "v1");
    }

    #[test]
    fn test_summarize_clusters() {
        let model = ClusterModel {
            labels: vec![0, 0, 1, 1],
            ccf: vec![0.5, 0.2],
        };
        let samples = (0..101)
            .map(|i| sample(vec![0, 0, 1, 1], vec![i as f64 / 100.0, 0.2]))
            .collect::<Vec<_>>();
        let summaries = summarize_clusters(&model, &samples, 0.9);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].size, 2);
        approx::assert_abs_diff_eq!(summaries[0].posterior_mean_ccf, 0.5, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(summaries[0].ci_lower, 0.05, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(summaries[0].ci_upper, 0.95, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(summaries[1].ci_lower, 0.2, epsilon = 1e-9);
    }
}
