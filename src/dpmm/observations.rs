use crate::errors::{ClusterError, ClusterResult};
use crate::likelihood::{CcfGrid, GridPosterior, LikelihoodModel, ReadSupportTerms};
use crate::variant::Variant;

/// Likelihood terms and new-cluster quantities for a fixed variant set
///
/// This is computed once per variant set and shared read-only by all sampler runs.
///
pub struct ObservationSet {
    pub model: LikelihoodModel,
    pub grid: CcfGrid,
    pub terms: Vec<ReadSupportTerms>,

    /// Log marginal likelihood of each variant alone in a cluster with a prior-drawn CCF
    pub new_cluster_ln_marginal: Vec<f64>,

    /// CCF posterior of each variant alone in a cluster
    pub new_cluster_posterior: Vec<GridPosterior>,
}

impl ObservationSet {
    pub fn new(
        variants: &[Variant],
        model: LikelihoodModel,
        grid_size: usize,
    ) -> ClusterResult<Self> {
        let grid = CcfGrid::new(grid_size);
        let terms = variants
            .iter()
            .map(ReadSupportTerms::from_variant)
            .collect::<Vec<_>>();

        let mut new_cluster_ln_marginal = Vec::with_capacity(variants.len());
        let mut new_cluster_posterior = Vec::with_capacity(variants.len());
        for (variant, variant_terms) in variants.iter().zip(terms.iter()) {
            let ln_marginal = grid.ln_marginal(&model, std::iter::once(variant_terms));
            let posterior = grid.posterior(&model, std::iter::once(variant_terms));
            match posterior {
                Some(posterior) if ln_marginal.is_finite() => {
                    new_cluster_ln_marginal.push(ln_marginal);
                    new_cluster_posterior.push(posterior);
                }
                _ => {
                    return Err(ClusterError::NumericDegeneracy {
                        id: variant.id.clone(),
                        iteration: 0,
                        msg: "prior-integrated likelihood underflow".to_string(),
                    });
                }
            }
        }

        Ok(Self {
            model,
            grid,
            terms,
            new_cluster_ln_marginal,
            new_cluster_posterior,
        })
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn ln_likelihood(&self, variant_index: usize, ccf: f64) -> f64 {
        self.model.ln_likelihood(&self.terms[variant_index], ccf)
    }

    /// Total log-likelihood of all variants given a cluster label per variant and CCF per label
    ///
    pub fn total_ln_likelihood(&self, labels: &[usize], ccf: &[f64]) -> f64 {
        labels
            .iter()
            .enumerate()
            .map(|(variant_index, &label)| self.ln_likelihood(variant_index, ccf[label]))
            .sum()
    }
}
