//! Dirichlet process mixture model over variant CCF values, fit by Gibbs sampling
//!

mod arena;
mod cluster_update;
mod convergence;
mod observations;
mod partition;
mod sampler;

pub use self::convergence::SamplerTrace;
pub use self::observations::ObservationSet;
pub use self::partition::{canonical_labels, label_sizes};
pub use self::sampler::{PosteriorSample, SamplerRun, run_sampler};
