//! Per-iteration parameter updates: cluster CCF values and the concentration parameter
//!

use rand::Rng;
use rand_distr::Distribution;
use statrs::distribution::{Beta, Continuous, ContinuousCDF};

use crate::cluster_config::GammaPrior;
use crate::likelihood::{CcfGrid, LikelihoodModel, ReadSupportTerms};

/// Minimum mass of the untruncated Beta proposal below the truncation point for the proposal to
/// be used
const MIN_PROPOSAL_MASS: f64 = 1e-12;

/// Beta posterior of the pooled read fraction, truncated to the read fractions reachable from
/// CCF values in [0,1], expressed as a distribution over CCF
///
struct TruncatedBetaProposal {
    beta: Beta,
    scale: f64,
    upper_mass: f64,
}

impl TruncatedBetaProposal {
    fn new(successes: f64, failures: f64, scale: f64) -> Option<Self> {
        let beta = Beta::new(1.0 + successes, 1.0 + failures).ok()?;
        let upper_mass = if scale >= 1.0 { 1.0 } else { beta.cdf(scale) };
        if !(upper_mass.is_finite() && upper_mass > MIN_PROPOSAL_MASS) {
            return None;
        }
        Some(Self {
            beta,
            scale,
            upper_mass,
        })
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let u = rng.gen_range(0.0..1.0) * self.upper_mass;
        let read_fraction = self.beta.inverse_cdf(u);
        (read_fraction / self.scale).clamp(0.0, 1.0)
    }

    /// Log proposal density up to a constant
    fn ln_density(&self, ccf: f64) -> f64 {
        self.beta.ln_pdf(ccf * self.scale)
    }
}

/// Draw a new CCF for one cluster given the read data of its members
///
/// The update is an independence Metropolis-Hastings step. The proposal pools all member reads
/// into one Beta posterior at the trial-weighted mean scale, which is the exact conditional
/// posterior when all members share the same scale under the binomial model, so in that case
/// every proposal is accepted. If the proposal has no usable mass, the CCF is drawn from the
/// grid posterior instead.
///
pub fn resample_cluster_ccf<R: Rng>(
    model: &LikelihoodModel,
    grid: &CcfGrid,
    members: &[&ReadSupportTerms],
    current_ccf: f64,
    rng: &mut R,
) -> f64 {
    let total_trials = members.iter().map(|x| x.trials()).sum::<u64>();
    if total_trials == 0 {
        return rng.gen_range(0.0..1.0);
    }

    let successes = members.iter().map(|x| x.successes).sum::<u64>() as f64;
    let failures = members.iter().map(|x| x.failures).sum::<u64>() as f64;
    let pooled_scale = members
        .iter()
        .map(|x| x.trials() as f64 * x.scale)
        .sum::<f64>()
        / total_trials as f64;

    match TruncatedBetaProposal::new(successes, failures, pooled_scale) {
        Some(proposal) => {
            let proposed_ccf = proposal.sample(rng);
            let ln_target = |ccf| model.ln_likelihood_sum(members.iter().copied(), ccf);
            let ln_accept = ln_target(proposed_ccf) - ln_target(current_ccf)
                + proposal.ln_density(current_ccf)
                - proposal.ln_density(proposed_ccf);
            if ln_accept.is_nan() {
                return current_ccf;
            }
            if ln_accept >= 0.0 || rng.gen_range(0.0..1.0f64).ln() < ln_accept {
                proposed_ccf
            } else {
                current_ccf
            }
        }
        None => match grid.posterior(model, members.iter().copied()) {
            Some(posterior) => posterior.sample(rng),
            None => current_ccf,
        },
    }
}

/// Resample the DP concentration parameter given the current cluster count
///
/// Uses the auxiliary variable scheme of Escobar and West (1995) under a Gamma prior.
///
pub fn resample_concentration<R: Rng>(
    alpha: f64,
    cluster_count: usize,
    variant_count: usize,
    prior: &GammaPrior,
    rng: &mut R,
) -> f64 {
    let k = cluster_count as f64;
    let n = variant_count as f64;

    let eta = match rand_distr::Beta::new(alpha + 1.0, n) {
        Ok(x) => x.sample(rng),
        Err(_) => return alpha,
    };
    let rate = prior.rate - eta.ln();
    let odds = (prior.shape + k - 1.0) / (n * rate);
    let shape = if rng.gen_range(0.0..1.0) < odds / (1.0 + odds) {
        prior.shape + k
    } else {
        prior.shape + k - 1.0
    };
    match rand_distr::Gamma::new(shape, 1.0 / rate) {
        Ok(x) => x.sample(rng),
        Err(_) => alpha,
    }
}
