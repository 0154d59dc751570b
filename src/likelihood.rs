//! Read count likelihood of a variant given the CCF of its cluster
//!

use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::function::beta::ln_beta;
use statrs::function::factorial::ln_binomial;

use crate::prob_utils::{ln_sum_exp, normalize_ln_distro, sample_index_from_distro};
use crate::variant::Variant;

/// Expected read fractions are clamped this far inside (0,1) so that every CCF has a finite
/// likelihood
const READ_FRACTION_MARGIN: f64 = 1e-8;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum LikelihoodModel {
    Binomial,

    /// Beta-binomial read sampling with the given precision (sum of the beta shape parameters)
    BetaBinomial { precision: f64 },
}

/// Per-variant likelihood terms, precomputed once per variant set
#[derive(Clone, Debug)]
pub struct ReadSupportTerms {
    pub successes: u64,
    pub failures: u64,
    pub scale: f64,
    ln_coefficient: f64,
}

impl ReadSupportTerms {
    pub fn from_variant(variant: &Variant) -> Self {
        Self {
            successes: variant.successes,
            failures: variant.trials - variant.successes,
            scale: variant.scale,
            ln_coefficient: ln_binomial(variant.trials, variant.successes),
        }
    }

    pub fn trials(&self) -> u64 {
        self.successes + self.failures
    }

    /// Expected supporting read fraction at the given CCF
    pub fn read_fraction(&self, ccf: f64) -> f64 {
        (ccf * self.scale).clamp(READ_FRACTION_MARGIN, 1.0 - READ_FRACTION_MARGIN)
    }
}

impl LikelihoodModel {
    pub fn ln_likelihood(&self, terms: &ReadSupportTerms, ccf: f64) -> f64 {
        let p = terms.read_fraction(ccf);
        let k = terms.successes as f64;
        let f = terms.failures as f64;
        match self {
            LikelihoodModel::Binomial => terms.ln_coefficient + k * p.ln() + f * (1.0 - p).ln(),
            LikelihoodModel::BetaBinomial { precision } => {
                let a = p * precision;
                let b = (1.0 - p) * precision;
                terms.ln_coefficient + ln_beta(k + a, f + b) - ln_beta(a, b)
            }
        }
    }

    /// Joint log-likelihood of several variants sharing one CCF
    pub fn ln_likelihood_sum<'a>(
        &self,
        terms: impl IntoIterator<Item = &'a ReadSupportTerms>,
        ccf: f64,
    ) -> f64 {
        terms
            .into_iter()
            .map(|x| self.ln_likelihood(x, ccf))
            .sum()
    }
}

/// Midpoint grid over the CCF range [0,1], used for prior integration and grid posteriors
#[derive(Clone, Debug)]
pub struct CcfGrid {
    points: Vec<f64>,
}

impl CcfGrid {
    pub fn new(size: usize) -> Self {
        assert!(size > 1);
        let width = 1.0 / size as f64;
        Self {
            points: (0..size).map(|i| (i as f64 + 0.5) * width).collect(),
        }
    }

    fn cell_width(&self) -> f64 {
        1.0 / self.points.len() as f64
    }

    /// Unnormalized log posterior at each grid point, under a uniform CCF prior
    pub fn ln_posterior<'a>(
        &self,
        model: &LikelihoodModel,
        terms: impl Iterator<Item = &'a ReadSupportTerms> + Clone,
    ) -> Vec<f64> {
        self.points
            .iter()
            .map(|&x| model.ln_likelihood_sum(terms.clone(), x))
            .collect()
    }

    /// Log marginal likelihood of the given variants sharing a single CCF drawn from the uniform prior
    ///
    pub fn ln_marginal<'a>(
        &self,
        model: &LikelihoodModel,
        terms: impl Iterator<Item = &'a ReadSupportTerms> + Clone,
    ) -> f64 {
        ln_sum_exp(&self.ln_posterior(model, terms)) + self.cell_width().ln()
    }

    /// Normalized grid posterior for the CCF shared by the given variants
    ///
    /// Returns None if the posterior cannot be normalized.
    ///
    pub fn posterior<'a>(
        &self,
        model: &LikelihoodModel,
        terms: impl Iterator<Item = &'a ReadSupportTerms> + Clone,
    ) -> Option<GridPosterior> {
        let mut pdf = self.ln_posterior(model, terms);
        normalize_ln_distro(&mut pdf)?;
        Some(GridPosterior { pdf })
    }
}

/// A CCF posterior discretized over the cells of a `CcfGrid`
#[derive(Clone, Debug)]
pub struct GridPosterior {
    pdf: Vec<f64>,
}

impl GridPosterior {
    fn cell_width(&self) -> f64 {
        1.0 / self.pdf.len() as f64
    }

    pub fn mean(&self) -> f64 {
        let width = self.cell_width();
        self.pdf
            .iter()
            .enumerate()
            .map(|(i, p)| p * (i as f64 + 0.5) * width)
            .sum()
    }

    /// Central credible interval at the given level
    ///
    /// Bounds are resolved to cell edges, so the interval always covers at least the requested
    /// posterior mass.
    ///
    pub fn credible_interval(&self, level: f64) -> (f64, f64) {
        let tail = (1.0 - level) / 2.0;
        let width = self.cell_width();

        let mut cumulative = 0.0;
        let mut lower = 0.0;
        for (i, p) in self.pdf.iter().enumerate() {
            if cumulative + p > tail {
                lower = i as f64 * width;
                break;
            }
            cumulative += p;
        }

        let mut cumulative = 0.0;
        let mut upper = 1.0;
        for (i, p) in self.pdf.iter().enumerate().rev() {
            if cumulative + p > tail {
                upper = (i + 1) as f64 * width;
                break;
            }
            cumulative += p;
        }
        (lower, upper)
    }

    /// Draw a CCF value, uniform within the selected cell
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let index = sample_index_from_distro(&self.pdf, rng.gen_range(0.0..1.0));
        (index as f64 + rng.gen_range(0.0..1.0)) * self.cell_width()
    }
}
