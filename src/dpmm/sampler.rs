use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Serialize;

use super::arena::ClusterArena;
use super::cluster_update::{resample_cluster_ccf, resample_concentration};
use super::convergence::{ConvergenceWarning, SamplerTrace, check_convergence};
use super::observations::ObservationSet;
use super::partition::{canonical_labels, label_sizes, ln_ewens_prior};
use crate::cluster_config::SamplerConfig;
use crate::errors::{ClusterError, ClusterResult};
use crate::likelihood::ReadSupportTerms;
use crate::log_utils::debug_msg;
use crate::prob_utils::{normalize_ln_distro, sample_index_from_distro};
use crate::variant::Variant;

/// Bounds for the pooled CCF estimate used to initialize the starting cluster
const INITIAL_CCF_RANGE: (f64, f64) = (0.001, 0.999);

/// Snapshot of the sampler state at one retained iteration
///
/// Cluster labels are contiguous and ordered by first appearance in variant order, so two
/// samples describing the same partition have identical labels.
///
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PosteriorSample {
    pub iteration: usize,

    /// Cluster label of each variant
    pub labels: Vec<usize>,

    /// CCF of each cluster label
    pub ccf: Vec<f64>,

    /// Concentration parameter at this iteration
    pub alpha: f64,

    pub ln_likelihood: f64,

    /// Joint log posterior: data log-likelihood plus the log CRP partition prior
    pub ln_posterior: f64,
}

impl PosteriorSample {
    pub fn cluster_count(&self) -> usize {
        self.ccf.len()
    }

    /// CCF of the cluster holding the given variant
    pub fn variant_ccf(&self, variant_index: usize) -> f64 {
        self.ccf[self.labels[variant_index]]
    }
}

/// Complete output of one independent sampler run
#[derive(Clone, Debug, Serialize)]
pub struct SamplerRun {
    pub run_index: usize,
    pub seed: u64,
    pub samples: Vec<PosteriorSample>,
    pub trace: SamplerTrace,
    pub warnings: Vec<ConvergenceWarning>,
}

/// Gibbs sampler over the Dirichlet process mixture for one run
///
/// The sampler exclusively owns the assignment state for the duration of its run, and only
/// immutable snapshots leave it.
///
pub struct DpmmSampler<'a> {
    variants: &'a [Variant],
    observations: &'a ObservationSet,
    config: &'a SamplerConfig,
    rng: Xoshiro256PlusPlus,
    arena: ClusterArena,

    /// Cluster id of each variant
    assignment: Vec<usize>,
    alpha: f64,

    ln_probs: Vec<f64>,
    candidates: Vec<usize>,
    members: Vec<Vec<usize>>,
}

impl<'a> DpmmSampler<'a> {
    /// Set up the cold start state: every variant in one cluster at the pooled CCF estimate
    ///
    pub fn new(
        variants: &'a [Variant],
        observations: &'a ObservationSet,
        config: &'a SamplerConfig,
        seed: u64,
    ) -> Self {
        assert_eq!(variants.len(), observations.len());
        assert!(!variants.is_empty());

        let total_successes = variants.iter().map(|x| x.successes as f64).sum::<f64>();
        let total_scaled_trials = variants
            .iter()
            .map(|x| x.trials as f64 * x.scale)
            .sum::<f64>();
        let initial_ccf = if total_scaled_trials > 0.0 {
            (total_successes / total_scaled_trials).clamp(INITIAL_CCF_RANGE.0, INITIAL_CCF_RANGE.1)
        } else {
            0.5
        };

        let mut arena = ClusterArena::default();
        let id = arena.create_with_member(initial_ccf);
        for _ in 1..variants.len() {
            arena.add_member(id);
        }

        Self {
            variants,
            observations,
            config,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            arena,
            assignment: vec![id; variants.len()],
            alpha: config.alpha,
            ln_probs: Vec::new(),
            candidates: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Move one variant to a cluster drawn from its conditional distribution
    ///
    /// Returns true if the variant opened a new cluster
    ///
    fn reassign_variant(&mut self, variant_index: usize, iteration: usize) -> ClusterResult<bool> {
        let observations = self.observations;
        self.arena.remove_member(self.assignment[variant_index]);

        self.candidates.clear();
        self.candidates.extend_from_slice(self.arena.active_ids());

        // The CRP normalization constant (N - 1 + alpha) is shared by all options and cancels
        self.ln_probs.clear();
        for &id in self.candidates.iter() {
            self.ln_probs.push(
                (self.arena.size(id) as f64).ln()
                    + observations.ln_likelihood(variant_index, self.arena.ccf(id)),
            );
        }
        self.ln_probs
            .push(self.alpha.ln() + observations.new_cluster_ln_marginal[variant_index]);

        if normalize_ln_distro(&mut self.ln_probs).is_none() {
            return Err(ClusterError::NumericDegeneracy {
                id: self.variants[variant_index].id.clone(),
                iteration,
                msg: "all cluster assignment probabilities are zero or undefined".to_string(),
            });
        }

        let choice = sample_index_from_distro(&self.ln_probs, self.rng.gen_range(0.0..1.0));
        let is_new_cluster = choice == self.candidates.len();
        let id = if is_new_cluster {
            let ccf = observations.new_cluster_posterior[variant_index].sample(&mut self.rng);
            self.arena.create_with_member(ccf)
        } else {
            let id = self.candidates[choice];
            self.arena.add_member(id);
            id
        };
        self.assignment[variant_index] = id;
        Ok(is_new_cluster)
    }

    /// Reassign every variant in input order
    ///
    /// Returns the number of clusters opened during the sweep
    ///
    fn sweep(&mut self, iteration: usize) -> ClusterResult<usize> {
        let mut new_cluster_count = 0;
        for variant_index in 0..self.variants.len() {
            if self.reassign_variant(variant_index, iteration)? {
                new_cluster_count += 1;
            }
        }
        Ok(new_cluster_count)
    }

    fn update_cluster_ccfs(&mut self) {
        let observations = self.observations;
        for x in self.members.iter_mut() {
            x.clear();
        }
        self.members.resize_with(self.arena.slot_count(), Vec::new);
        for (variant_index, &id) in self.assignment.iter().enumerate() {
            self.members[id].push(variant_index);
        }

        self.candidates.clear();
        self.candidates.extend_from_slice(self.arena.active_ids());
        for &id in self.candidates.iter() {
            let member_terms = self.members[id]
                .iter()
                .map(|&x| &observations.terms[x])
                .collect::<Vec<&ReadSupportTerms>>();
            let ccf = resample_cluster_ccf(
                &observations.model,
                &observations.grid,
                &member_terms,
                self.arena.ccf(id),
                &mut self.rng,
            );
            self.arena.set_ccf(id, ccf);
        }
    }

    fn snapshot(&self, iteration: usize) -> PosteriorSample {
        let (labels, ids) = canonical_labels(&self.assignment);
        let ccf = ids.iter().map(|&id| self.arena.ccf(id)).collect::<Vec<_>>();
        let ln_likelihood = self.observations.total_ln_likelihood(&labels, &ccf);
        let sizes = label_sizes(&labels, ids.len());
        let ln_posterior = ln_likelihood + ln_ewens_prior(self.alpha, &sizes);
        PosteriorSample {
            iteration,
            labels,
            ccf,
            alpha: self.alpha,
            ln_likelihood,
            ln_posterior,
        }
    }

    /// Run the full iteration budget
    pub fn run(mut self, run_index: usize, seed: u64) -> ClusterResult<SamplerRun> {
        let n_iter = self.config.n_iter;
        let variant_count = self.variants.len();
        let progress_interval = std::cmp::max(1, n_iter / 10);

        let mut samples = Vec::with_capacity(self.config.retained_sample_count());
        let mut trace = SamplerTrace {
            cluster_counts: Vec::with_capacity(n_iter),
            new_cluster_counts: Vec::with_capacity(n_iter),
        };

        for iteration in 0..n_iter {
            let new_cluster_count = self.sweep(iteration)?;
            self.update_cluster_ccfs();
            if let Some(prior) = &self.config.alpha_prior {
                self.alpha = resample_concentration(
                    self.alpha,
                    self.arena.active_count(),
                    variant_count,
                    prior,
                    &mut self.rng,
                );
            }

            trace.cluster_counts.push(self.arena.active_count());
            trace.new_cluster_counts.push(new_cluster_count);

            if self.config.is_retained(iteration) {
                samples.push(self.snapshot(iteration));
            }

            if (iteration + 1) % progress_interval == 0 {
                debug_msg!(
                    self.config.debug,
                    "Run {run_index}: completed iteration {}/{n_iter}, active clusters: {}",
                    iteration + 1,
                    self.arena.active_count()
                );
            }
        }

        let retained_cluster_counts = samples.iter().map(|x| x.cluster_count()).collect::<Vec<_>>();
        let warnings = check_convergence(&retained_cluster_counts, &trace, variant_count);

        Ok(SamplerRun {
            run_index,
            seed,
            samples,
            trace,
            warnings,
        })
    }
}

/// Execute one independent sampler run over a variant set
///
pub fn run_sampler(
    variants: &[Variant],
    observations: &ObservationSet,
    config: &SamplerConfig,
    run_index: usize,
) -> ClusterResult<SamplerRun> {
    let seed = config.run_seed(run_index);
    DpmmSampler::new(variants, observations, config, seed).run(run_index, seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::likelihood::LikelihoodModel;

    fn get_config(n_iter: usize, burn: usize, thin: usize) -> SamplerConfig {
        SamplerConfig {
            n_iter,
            burn,
            thin,
            ..Default::default()
        }
    }

    fn get_variants(data: &[(u64, u64)]) -> Vec<Variant> {
        data.iter()
            .enumerate()
            .map(|(i, &(s, t))| Variant::new(&format!("v{i}"), s, t, 1.0).unwrap())
            .collect()
    }

    fn fit(variants: &[Variant], config: &SamplerConfig, run_index: usize) -> SamplerRun {
        let observations =
            ObservationSet::new(variants, config.likelihood, config.grid_size).unwrap();
        run_sampler(variants, &observations, config, run_index).unwrap()
    }

    #[test]
    fn test_retained_sample_count() {
        let variants = get_variants(&[(10, 50), (30, 60), (5, 40)]);
        let config = get_config(53, 10, 4);
        let run = fit(&variants, &config, 0);
        assert_eq!(run.samples.len(), config.retained_sample_count());
        assert_eq!(run.samples[0].iteration, 10);
        assert_eq!(run.samples[1].iteration, 14);
        assert_eq!(run.trace.cluster_counts.len(), 53);
    }

    #[test]
    fn test_every_variant_has_one_assignment() {
        let variants = get_variants(&[(10, 50), (30, 60), (5, 40), (45, 50), (0, 30)]);
        let config = get_config(200, 50, 3);
        let run = fit(&variants, &config, 0);
        for sample in run.samples.iter() {
            assert_eq!(sample.labels.len(), variants.len());
            assert!(sample.labels.iter().all(|&x| x < sample.cluster_count()));
            let sizes = label_sizes(&sample.labels, sample.cluster_count());
            assert_eq!(sizes.iter().sum::<usize>(), variants.len());
            assert!(sizes.iter().all(|&x| x > 0));
            assert!(sample.ccf.iter().all(|x| (0.0..=1.0).contains(x)));
        }
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let variants = get_variants(&[(10, 50), (30, 60), (5, 40), (45, 50)]);
        let config = get_config(300, 20, 2);
        let run1 = fit(&variants, &config, 0);
        let run2 = fit(&variants, &config, 0);
        assert_eq!(run1.samples, run2.samples);
        assert_eq!(run1.trace.cluster_counts, run2.trace.cluster_counts);

        // Different run index gives an independent chain:
        let run3 = fit(&variants, &config, 1);
        assert_ne!(run1.seed, run3.seed);
        assert_ne!(run1.samples, run3.samples);
    }

    #[test]
    fn test_well_separated_groups() {
        let mut data = vec![(20, 100); 10];
        data.extend(vec![(80, 100); 10]);
        let variants = get_variants(&data);
        let config = get_config(400, 100, 1);
        let run = fit(&variants, &config, 0);

        let separated = run
            .samples
            .iter()
            .filter(|x| x.labels[0] != x.labels[10])
            .count();
        assert!(separated as f64 > 0.95 * run.samples.len() as f64);

        let last = run.samples.last().unwrap();
        approx::assert_abs_diff_eq!(last.variant_ccf(0), 0.2, epsilon = 0.05);
        approx::assert_abs_diff_eq!(last.variant_ccf(10), 0.8, epsilon = 0.05);
    }

    #[test]
    fn test_concentration_resampling() {
        let variants = get_variants(&[(10, 50), (30, 60), (5, 40), (45, 50)]);
        let mut config = get_config(100, 0, 1);
        config.alpha_prior = Some(crate::cluster_config::GammaPrior {
            shape: 1.0,
            rate: 1.0,
        });
        let run = fit(&variants, &config, 0);
        assert!(run.samples.iter().all(|x| x.alpha > 0.0));
        assert!(run.samples.iter().any(|x| x.alpha != config.alpha));
    }

    #[test]
    fn test_beta_binomial_sampler() {
        let variants = get_variants(&[(10, 50), (30, 60), (5, 40)]);
        let mut config = get_config(100, 10, 1);
        config.likelihood = LikelihoodModel::BetaBinomial { precision: 100.0 };
        let run = fit(&variants, &config, 0);
        assert_eq!(run.samples.len(), 90);
    }

    #[test]
    fn test_undefined_assignment_distribution_aborts_run() {
        let variants = get_variants(&[(10, 50), (30, 60)]);
        let mut config = get_config(10, 0, 1);
        let observations =
            ObservationSet::new(&variants, config.likelihood, config.grid_size).unwrap();

        // An undefined concentration makes the new cluster weight NaN for every variant
        config.alpha = f64::NAN;
        let result = run_sampler(&variants, &observations, &config, 0);
        match result {
            Err(ClusterError::NumericDegeneracy { id, iteration, .. }) => {
                assert_eq!(id, "v0");
                assert_eq!(iteration, 0);
            }
            _ => panic!("expected a numeric degeneracy error"),
        }
    }
}
