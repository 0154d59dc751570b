//! Immutable configuration of one clustering job
//!
//! A `ClusterConfig` is built once from the command-line settings, validated before any sampling
//! begins, and then passed by reference to every engine component.
//!

use serde::{Deserialize, Serialize};

use crate::errors::{ClusterResult, invalid_config};
use crate::likelihood::LikelihoodModel;

/// Gamma prior on the DP concentration parameter, in shape/rate form
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct GammaPrior {
    pub shape: f64,
    pub rate: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SamplerConfig {
    /// DP concentration parameter, the initial value if `alpha_prior` is set
    pub alpha: f64,

    /// If set, the concentration parameter is resampled every iteration under this prior
    pub alpha_prior: Option<GammaPrior>,

    pub n_iter: usize,
    pub burn: usize,
    pub thin: usize,

    /// Number of independent sampler restarts
    pub n_runs: usize,

    /// Base random seed, run `i` is seeded with `seed + i`
    pub seed: u64,

    pub likelihood: LikelihoodModel,

    /// Number of cells in the CCF grid used for prior integration and grid posteriors
    pub grid_size: usize,

    /// Print per-run sampler progress directly to stderr
    #[serde(default)]
    pub debug: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            alpha_prior: None,
            n_iter: 10000,
            burn: 0,
            thin: 1,
            n_runs: 1,
            seed: 5_318_008,
            likelihood: LikelihoodModel::Binomial,
            grid_size: 200,
            debug: false,
        }
    }
}

impl SamplerConfig {
    /// Number of posterior samples retained by each run
    pub fn retained_sample_count(&self) -> usize {
        if self.thin == 0 || self.burn >= self.n_iter {
            0
        } else {
            (self.n_iter - self.burn).div_ceil(self.thin)
        }
    }

    /// True if the 0-indexed iteration is retained as a posterior sample
    pub fn is_retained(&self, iteration: usize) -> bool {
        iteration >= self.burn && (iteration - self.burn) % self.thin == 0
    }

    pub fn run_seed(&self, run_index: usize) -> u64 {
        self.seed.wrapping_add(run_index as u64)
    }

    pub fn validate(&self) -> ClusterResult<()> {
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(invalid_config(format!(
                "concentration parameter must be positive, got {}",
                self.alpha
            )));
        }
        if let Some(prior) = &self.alpha_prior
            && !(prior.shape > 0.0 && prior.rate > 0.0)
        {
            return Err(invalid_config(format!(
                "concentration prior shape and rate must be positive, got {} and {}",
                prior.shape, prior.rate
            )));
        }
        if self.n_iter == 0 {
            return Err(invalid_config("iteration count must be greater than 0"));
        }
        if self.thin == 0 {
            return Err(invalid_config("thinning interval must be greater than 0"));
        }
        if self.retained_sample_count() == 0 {
            return Err(invalid_config(format!(
                "burn-in of {} iterations leaves no retained samples from {} iterations",
                self.burn, self.n_iter
            )));
        }
        if self.n_runs == 0 {
            return Err(invalid_config("run count must be greater than 0"));
        }
        if self.grid_size < 2 {
            return Err(invalid_config("CCF grid size must be at least 2"));
        }
        if let LikelihoodModel::BetaBinomial { precision } = self.likelihood
            && !(precision.is_finite() && precision > 0.0)
        {
            return Err(invalid_config(format!(
                "beta-binomial precision must be positive, got {precision}"
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ClusterConfig {
    pub sampler: SamplerConfig,

    /// Run MAP selection with re-optimization and report information criteria
    pub use_map: bool,

    /// Maximum number of iterated conditional mode rounds in MAP re-optimization
    pub map_max_rounds: usize,

    pub merge_clusters: bool,

    /// Credible level of the intervals which must overlap for two clusters to merge
    pub merge_credible_level: f64,

    /// Credible level reported in cluster summaries
    pub summary_credible_level: f64,

    pub cocluster_matrix: bool,

    /// Worker threads used for concurrent runs and co-clustering accumulation
    pub thread_count: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            use_map: false,
            map_max_rounds: 20,
            merge_clusters: false,
            merge_credible_level: 0.95,
            summary_credible_level: 0.95,
            cocluster_matrix: false,
            thread_count: 1,
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> ClusterResult<()> {
        self.sampler.validate()?;
        for (level, label) in [
            (self.merge_credible_level, "merge"),
            (self.summary_credible_level, "summary"),
        ] {
            if !(level > 0.0 && level < 1.0) {
                return Err(invalid_config(format!(
                    "{label} credible level must be in (0,1), got {level}"
                )));
            }
        }
        if self.thread_count == 0 {
            return Err(invalid_config("thread count must be greater than 0"));
        }
        Ok(())
    }
}
