use serde::Serialize;

use crate::dpmm::{ObservationSet, PosteriorSample, canonical_labels, label_sizes};
use crate::likelihood::ReadSupportTerms;

/// A single clustering configuration of a variant set
///
/// Labels are contiguous, so every cluster has at least one member.
///
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClusterModel {
    /// Cluster label of each variant
    pub labels: Vec<usize>,

    /// CCF of each cluster label
    pub ccf: Vec<f64>,
}

impl ClusterModel {
    pub fn from_sample(sample: &PosteriorSample) -> Self {
        Self {
            labels: sample.labels.clone(),
            ccf: sample.ccf.clone(),
        }
    }

    /// Build a model from labels which may skip values, dropping unused labels
    ///
    pub fn from_sparse_labels(labels: &[usize], ccf: &[f64]) -> Self {
        let (labels, ids) = canonical_labels(labels);
        let ccf = ids.iter().map(|&x| ccf[x]).collect();
        Self { labels, ccf }
    }

    pub fn variant_count(&self) -> usize {
        self.labels.len()
    }

    pub fn cluster_count(&self) -> usize {
        self.ccf.len()
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        label_sizes(&self.labels, self.cluster_count())
    }

    /// Variant indices of each cluster
    pub fn cluster_members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.cluster_count()];
        for (variant_index, &label) in self.labels.iter().enumerate() {
            members[label].push(variant_index);
        }
        members
    }

    pub fn ln_likelihood(&self, observations: &ObservationSet) -> f64 {
        observations.total_ln_likelihood(&self.labels, &self.ccf)
    }

    /// Likelihood terms of each cluster's members
    pub fn member_terms<'a>(&self, observations: &'a ObservationSet) -> Vec<Vec<&'a ReadSupportTerms>> {
        self.cluster_members()
            .into_iter()
            .map(|x| x.into_iter().map(|i| &observations.terms[i]).collect())
            .collect()
    }
}

/// Information criteria of a fitted model
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelScore {
    pub cluster_count: usize,
    pub ln_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
}

impl ModelScore {
    /// Score a model, counting one free parameter per cluster
    pub fn new(model: &ClusterModel, observations: &ObservationSet) -> Self {
        let k = model.cluster_count() as f64;
        let n = model.variant_count() as f64;
        let ln_likelihood = model.ln_likelihood(observations);
        Self {
            cluster_count: model.cluster_count(),
            ln_likelihood,
            aic: 2.0 * k - 2.0 * ln_likelihood,
            bic: k * n.ln() - 2.0 * ln_likelihood,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::likelihood::LikelihoodModel;
    use crate::variant::Variant;

    #[test]
    fn test_from_sparse_labels() {
        let model = ClusterModel::from_sparse_labels(&[3, 1, 3, 1], &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(model.labels, vec![0, 1, 0, 1]);
        assert_eq!(model.ccf, vec![0.4, 0.2]);
        assert_eq!(model.cluster_members(), vec![vec![0, 2], vec![1, 3]]);
    }

    #[test]
    fn test_model_score() {
        let variants = vec![
            Variant::new("a", 50, 100, 1.0).unwrap(),
            Variant::new("b", 10, 100, 1.0).unwrap(),
        ];
        let observations = ObservationSet::new(&variants, LikelihoodModel::Binomial, 50).unwrap();
        let model = ClusterModel {
            labels: vec![0, 1],
            ccf: vec![0.5, 0.1],
        };
        let score = ModelScore::new(&model, &observations);
        let ln_l = model.ln_likelihood(&observations);
        assert_eq!(score.cluster_count, 2);
        approx::assert_abs_diff_eq!(score.aic, 4.0 - 2.0 * ln_l, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(score.bic, 2.0 * 2f64.ln() - 2.0 * ln_l, epsilon = 1e-9);
    }
}
