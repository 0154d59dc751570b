use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use const_format::concatcp;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use unwrap::unwrap;

use super::utils::{check_optional_filename, check_required_filename};
use crate::cluster_config::{ClusterConfig, GammaPrior, SamplerConfig};
use crate::likelihood::LikelihoodModel;

pub const SETTINGS_FILENAME: &str = "cluster.settings.json";

#[derive(Args, Clone, Deserialize, Serialize)]
pub struct ClusterSettings {
    /// Directory for all cluster command output (must not already exist)
    #[arg(long, value_name = "DIR", default_value = concatcp!(env!("CARGO_PKG_NAME"), "_cluster_output"))]
    pub output_dir: Utf8PathBuf,

    /// Filtered SV table, with columns:
    /// ID split span norm [adjusted_support adjusted_norm] [major_cn minor_cn] [classification]
    #[arg(long = "sv-file", value_name = "FILE")]
    pub sv_filename: Option<Utf8PathBuf>,

    /// Filtered SNV table, with columns: ID ref var [major_cn minor_cn]
    #[arg(long = "snv-file", value_name = "FILE")]
    pub snv_filename: Option<Utf8PathBuf>,

    /// Sample name, used to select the matching row of the purity/ploidy table
    #[arg(long, value_name = "NAME")]
    pub sample: String,

    /// Tumor purity and ploidy table, with columns: sample purity ploidy
    ///
    /// If not specified, a purity of 1 and ploidy of 2 is assumed.
    ///
    #[arg(long = "purity-ploidy", value_name = "FILE")]
    pub purity_ploidy_filename: Option<Utf8PathBuf>,

    /// Number of independent sampler runs
    #[arg(long, default_value_t = 1)]
    pub n_runs: usize,

    /// Number of sampler iterations per run
    #[arg(long, default_value_t = 10000)]
    pub n_iter: usize,

    /// Number of initial iterations discarded from each run
    #[arg(long, default_value_t = 0)]
    pub burn: usize,

    /// Retain every N-th iteration after burn-in
    #[arg(long, default_value_t = 1)]
    pub thin: usize,

    /// Dirichlet process concentration parameter. Higher values favor more clusters.
    #[arg(long, default_value_t = 1.0)]
    pub alpha: f64,

    /// Random seed, each run uses this value plus the run index
    #[arg(long, default_value_t = 5_318_008)]
    pub seed: u64,

    /// Resample the concentration parameter under a Gamma prior at each iteration
    #[arg(long)]
    pub sample_alpha: bool,

    /// Shape of the Gamma prior used with --sample-alpha
    #[arg(hide = true, long, default_value_t = 1.0)]
    pub alpha_prior_shape: f64,

    /// Rate of the Gamma prior used with --sample-alpha
    #[arg(hide = true, long, default_value_t = 1.0)]
    pub alpha_prior_rate: f64,

    /// Use a beta-binomial read count model with this precision instead of the binomial model
    #[arg(long, value_name = "PRECISION")]
    pub beta_binomial_precision: Option<f64>,

    /// Refine the highest posterior configuration of each run and report AIC/BIC values
    #[arg(long)]
    pub map: bool,

    /// Maximum conditional mode rounds used by --map refinement
    #[arg(hide = true, long, default_value_t = 20)]
    pub map_max_rounds: usize,

    /// Merge clusters with overlapping CCF credible intervals
    #[arg(long)]
    pub merge: bool,

    /// Credible level of the intervals compared by --merge
    #[arg(long, default_value_t = 0.95)]
    pub merge_credible_level: f64,

    /// Credible level of the cluster CCF intervals in the cluster summary
    #[arg(hide = true, long, default_value_t = 0.95)]
    pub summary_credible_level: f64,

    /// Cluster SVs and SNVs together as one variant set
    #[arg(long)]
    pub cocluster: bool,

    /// Write results in the SMC-Het challenge format
    #[arg(long)]
    pub smc_het: bool,

    /// Compute and write the variant co-clustering probability matrix
    #[arg(long)]
    pub write_matrix: bool,

    /// Use raw split/span/norm read counts for all SVs, ignoring any adjusted normal read counts
    /// for duplications or adjusted supporting read counts for inversions
    #[arg(long)]
    pub no_adjust: bool,

    /// Treat variants without copy number values as invalid input, instead of assuming the
    /// copy number state implied by the sample ploidy
    #[arg(long)]
    pub strict_cnv: bool,

    /// Number of cells in the CCF grid used for new cluster integration and cluster posteriors
    #[arg(hide = true, long, default_value_t = 200)]
    pub ccf_grid_size: usize,

    /// Print per-run sampler progress directly to stderr
    #[arg(hide = true, long)]
    pub debug_sampler: bool,
}

impl ClusterSettings {
    /// Build the immutable clustering engine configuration
    pub fn to_cluster_config(&self, thread_count: usize) -> ClusterConfig {
        let likelihood = match self.beta_binomial_precision {
            Some(precision) => LikelihoodModel::BetaBinomial { precision },
            None => LikelihoodModel::Binomial,
        };
        let alpha_prior = self.sample_alpha.then_some(GammaPrior {
            shape: self.alpha_prior_shape,
            rate: self.alpha_prior_rate,
        });
        ClusterConfig {
            sampler: SamplerConfig {
                alpha: self.alpha,
                alpha_prior,
                n_iter: self.n_iter,
                burn: self.burn,
                thin: self.thin,
                n_runs: self.n_runs,
                seed: self.seed,
                likelihood,
                grid_size: self.ccf_grid_size,
                debug: self.debug_sampler,
            },
            use_map: self.map,
            map_max_rounds: self.map_max_rounds,
            merge_clusters: self.merge,
            merge_credible_level: self.merge_credible_level,
            summary_credible_level: self.summary_credible_level,
            cocluster_matrix: self.write_matrix || self.smc_het,
            thread_count,
        }
    }
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
/// Assumes that the logger is not setup
///
pub fn validate_and_fix_cluster_settings(
    mut settings: ClusterSettings,
) -> SimpleResult<ClusterSettings> {
    if settings.sv_filename.is_none() && settings.snv_filename.is_none() {
        bail!("Must specify at least one of --sv-file or --snv-file");
    }
    if settings.cocluster && (settings.sv_filename.is_none() || settings.snv_filename.is_none()) {
        bail!("--cocluster requires both --sv-file and --snv-file");
    }
    if settings.sample.is_empty() {
        bail!("--sample argument must not be empty");
    }

    check_optional_filename(settings.sv_filename.as_deref(), "SV")?;
    check_optional_filename(settings.snv_filename.as_deref(), "SNV")?;
    if let Some(filename) = &settings.purity_ploidy_filename {
        check_required_filename(filename, "purity/ploidy")?;
    }

    if settings.map_max_rounds == 0 {
        bail!("--map-max-rounds argument must be greater than 0");
    }

    // Run all engine configuration checks here so that errors are reported as command-line issues:
    if let Err(err) = settings.to_cluster_config(1).validate() {
        bail!("{err}");
    }

    fn canonicalize_path(path: Utf8PathBuf) -> Utf8PathBuf {
        unwrap!(
            path.canonicalize_utf8(),
            "Unable to canonicalize input path: '{path}'"
        )
    }
    settings.sv_filename = settings.sv_filename.map(canonicalize_path);
    settings.snv_filename = settings.snv_filename.map(canonicalize_path);
    settings.purity_ploidy_filename = settings.purity_ploidy_filename.map(canonicalize_path);

    Ok(settings)
}

/// Write cluster settings out in json format
pub fn write_cluster_settings(output_dir: &Utf8Path, settings: &ClusterSettings) {
    use log::info;

    let filename = output_dir.join(SETTINGS_FILENAME);

    info!("Writing cluster settings to file: '{filename}'");

    let f = unwrap!(
        std::fs::File::create(&filename),
        "Unable to create cluster settings json file: '{filename}'"
    );

    serde_json::to_writer_pretty(&f, &settings).unwrap();
}
