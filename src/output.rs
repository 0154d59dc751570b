//! Tab-delimited output tables for clustering results
//!

use std::fs::File;
use std::io::{BufWriter, Write};

use camino::Utf8Path;
use log::info;
use unwrap::unwrap;

use crate::cocluster::CoclusterMatrix;
use crate::dpmm::SamplerTrace;
use crate::map_estimate::ModelSelectionEntry;
use crate::os_utils::create_dir_all;
use crate::summary::{ClusterSummary, VariantSummary};

pub const VARIANT_ASSIGNMENTS_FILENAME: &str = "variant_assignments.tsv";
pub const CLUSTER_SUMMARY_FILENAME: &str = "cluster_summary.tsv";
pub const COCLUSTER_MATRIX_FILENAME: &str = "cocluster_matrix.tsv";
pub const SAMPLER_TRACE_FILENAME: &str = "sampler_trace.tsv";
pub const MODEL_SELECTION_FILENAME: &str = "model_selection.tsv";
pub const SMC_HET_DIRNAME: &str = "smc_het";

fn create_output_file(filename: &Utf8Path, label: &str) -> BufWriter<File> {
    let f = unwrap!(
        File::create(filename),
        "Unable to create {label} file: '{filename}'"
    );
    BufWriter::new(f)
}

pub fn write_variant_assignments(output_dir: &Utf8Path, variant_summaries: &[VariantSummary]) {
    let filename = output_dir.join(VARIANT_ASSIGNMENTS_FILENAME);
    info!("Writing variant cluster assignments to file: '{filename}'");
    let mut f = create_output_file(&filename, "variant assignment");

    writeln!(
        f,
        "id\tkind\tcluster\tccf\tposterior_mean_ccf\tassignment_probability\tmultiplicity\tsuccesses\ttrials"
    )
    .unwrap();
    for x in variant_summaries {
        writeln!(
            f,
            "{}\t{}\t{}\t{:.4}\t{:.4}\t{:.4}\t{}\t{}\t{}",
            x.id,
            x.kind,
            x.cluster,
            x.ccf,
            x.posterior_mean_ccf,
            x.assignment_probability,
            x.multiplicity,
            x.successes,
            x.trials
        )
        .unwrap();
    }
}

pub fn write_cluster_summary(output_dir: &Utf8Path, cluster_summaries: &[ClusterSummary]) {
    let filename = output_dir.join(CLUSTER_SUMMARY_FILENAME);
    info!("Writing cluster summary to file: '{filename}'");
    let mut f = create_output_file(&filename, "cluster summary");

    writeln!(f, "cluster\tsize\tccf\tposterior_mean_ccf\tci_lower\tci_upper").unwrap();
    for x in cluster_summaries {
        writeln!(
            f,
            "{}\t{}\t{:.4}\t{:.4}\t{:.4}\t{:.4}",
            x.cluster, x.size, x.ccf, x.posterior_mean_ccf, x.ci_lower, x.ci_upper
        )
        .unwrap();
    }
}

/// Write the co-clustering matrix with variant ids as row and column labels
pub fn write_cocluster_matrix(output_dir: &Utf8Path, matrix: &CoclusterMatrix) {
    let filename = output_dir.join(COCLUSTER_MATRIX_FILENAME);
    info!("Writing co-clustering matrix to file: '{filename}'");
    let mut f = create_output_file(&filename, "co-clustering matrix");

    let ids = matrix.ids();
    writeln!(f, "id\t{}", ids.join("\t")).unwrap();
    for (i, id) in ids.iter().enumerate() {
        write!(f, "{id}").unwrap();
        for x in matrix.row(i) {
            write!(f, "\t{x:.4}").unwrap();
        }
        writeln!(f).unwrap();
    }
}

pub fn write_sampler_trace(output_dir: &Utf8Path, trace: &SamplerTrace) {
    let filename = output_dir.join(SAMPLER_TRACE_FILENAME);
    let mut f = create_output_file(&filename, "sampler trace");

    writeln!(f, "iteration\tcluster_count\tnew_cluster_count").unwrap();
    for (iteration, (cluster_count, new_cluster_count)) in trace
        .cluster_counts
        .iter()
        .zip(trace.new_cluster_counts.iter())
        .enumerate()
    {
        writeln!(f, "{iteration}\t{cluster_count}\t{new_cluster_count}").unwrap();
    }
}

pub fn write_model_selection(output_dir: &Utf8Path, entries: &[&ModelSelectionEntry]) {
    let filename = output_dir.join(MODEL_SELECTION_FILENAME);
    info!("Writing model selection report to file: '{filename}'");
    let mut f = create_output_file(&filename, "model selection");

    writeln!(f, "run\tstage\tcluster_count\tln_likelihood\taic\tbic").unwrap();
    for x in entries {
        writeln!(
            f,
            "{}\t{}\t{}\t{:.4}\t{:.4}\t{:.4}",
            x.run_index,
            x.stage,
            x.score.cluster_count,
            x.score.ln_likelihood,
            x.score.aic,
            x.score.bic
        )
        .unwrap();
    }
}

/// Write results in the SMC-Het DREAM challenge submission layout
///
/// Cluster ids are 1-based. Cellular prevalence is reported as CCF scaled by tumor purity. The
/// co-clustering matrix file is only written when a matrix is given.
///
pub fn write_smc_het(
    output_dir: &Utf8Path,
    purity: f64,
    variant_summaries: &[VariantSummary],
    cluster_summaries: &[ClusterSummary],
    matrix: Option<&CoclusterMatrix>,
) {
    let smc_het_dir = output_dir.join(SMC_HET_DIRNAME);
    create_dir_all(&smc_het_dir, "SMC-Het output");
    info!("Writing SMC-Het format results to directory: '{smc_het_dir}'");

    let mut f = create_output_file(&smc_het_dir.join("1A.txt"), "SMC-Het purity");
    writeln!(f, "{purity:.4}").unwrap();

    let mut f = create_output_file(&smc_het_dir.join("1B.txt"), "SMC-Het cluster count");
    writeln!(f, "{}", cluster_summaries.len()).unwrap();

    let mut f = create_output_file(&smc_het_dir.join("1C.txt"), "SMC-Het cluster prevalence");
    for x in cluster_summaries {
        writeln!(f, "{}\t{}\t{:.4}", x.cluster + 1, x.size, x.ccf * purity).unwrap();
    }

    let mut f = create_output_file(&smc_het_dir.join("2A.txt"), "SMC-Het assignment");
    for x in variant_summaries {
        writeln!(f, "{}", x.cluster + 1).unwrap();
    }

    if let Some(matrix) = matrix {
        let mut f = create_output_file(&smc_het_dir.join("2B.txt"), "SMC-Het co-clustering");
        for i in 0..matrix.variant_count() {
            let row = matrix
                .row(i)
                .iter()
                .map(|x| format!("{x:.4}"))
                .collect::<Vec<_>>();
            writeln!(f, "{}", row.join("\t")).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::VariantKind;
    use camino::Utf8PathBuf;

    fn get_test_dir(name: &str) -> Utf8PathBuf {
        let dir = std::env::temp_dir().join(format!("svclust_output_{}_{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        Utf8PathBuf::from_path_buf(dir).unwrap()
    }

    fn variant_summary(id: &str, cluster: usize) -> VariantSummary {
        VariantSummary {
            id: id.to_string(),
            kind: VariantKind::Sv,
            cluster,
            ccf: 0.5,
            posterior_mean_ccf: 0.5,
            assignment_probability: 1.0,
            multiplicity: 1,
            successes: 10,
            trials: 40,
        }
    }

    fn cluster_summary(cluster: usize, size: usize, ccf: f64) -> ClusterSummary {
        ClusterSummary {
            cluster,
            size,
            ccf,
            posterior_mean_ccf: ccf,
            ci_lower: ccf,
            ci_upper: ccf,
        }
    }

    #[test]
    fn test_write_smc_het() {
        let dir = get_test_dir("smc_het");
        let variants = vec![
            variant_summary("a", 0),
            variant_summary("b", 1),
            variant_summary("c", 0),
        ];
        let clusters = vec![cluster_summary(0, 2, 1.0), cluster_summary(1, 1, 0.5)];
        write_smc_het(&dir, 0.8, &variants, &clusters, None);

        let smc_het_dir = dir.join(SMC_HET_DIRNAME);
        let read = |x: &str| std::fs::read_to_string(smc_het_dir.join(x)).unwrap();
        assert_eq!(read("1A.txt"), "0.8000\n");
        assert_eq!(read("1B.txt"), "2\n");
        assert_eq!(read("1C.txt"), "1\t2\t0.8000\n2\t1\t0.4000\n");
        assert_eq!(read("2A.txt"), "1\n2\n1\n");
        assert!(!smc_het_dir.join("2B.txt").exists());
    }

    #[test]
    fn test_write_variant_assignments() {
        let dir = get_test_dir("assignments");
        write_variant_assignments(&dir, &[variant_summary("sv1", 2)]);
        let content = std::fs::read_to_string(dir.join(VARIANT_ASSIGNMENTS_FILENAME)).unwrap();
        let lines = content.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "sv1\tSV\t2\t0.5000\t0.5000\t1.0000\t1\t10\t40");
    }
}
