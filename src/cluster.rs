//! The cluster command: read variant tables, fit each variant set and write all results
//!

use std::error;

use camino::Utf8Path;
use hhmmss::Hhmmss;
use log::info;

use crate::cli::{ClusterSettings, SharedSettings, write_cluster_settings};
use crate::cluster_config::ClusterConfig;
use crate::features::{SampleContext, build_variant_set};
use crate::fit::{VariantSetFit, fit_variant_set};
use crate::os_utils::create_dir_all;
use crate::output;
use crate::run_stats::{ClusterRunStats, VariantSetStats, write_cluster_run_stats};
use crate::variant::RawVariantRecord;
use crate::variant_input::{
    SnvTableReader, SvTableReader, VariantTableReader, read_purity_ploidy,
};

/// A labeled group of variants clustered together
struct VariantSetInput {
    label: &'static str,
    records: Vec<RawVariantRecord>,
}

fn get_sample_context(settings: &ClusterSettings) -> Result<SampleContext, Box<dyn error::Error>> {
    let context = match &settings.purity_ploidy_filename {
        Some(filename) => read_purity_ploidy(filename, &settings.sample, settings.strict_cnv)?,
        None => SampleContext {
            require_copy_number: settings.strict_cnv,
            ..Default::default()
        },
    };
    info!(
        "Sample '{}' purity: {}, ploidy: {}",
        settings.sample, context.purity, context.ploidy
    );
    Ok(context)
}

/// Read all variant tables and group them into the variant sets to cluster
///
/// SVs and SNVs are clustered separately unless coclustering is requested.
///
fn get_variant_set_inputs(
    settings: &ClusterSettings,
) -> Result<Vec<VariantSetInput>, Box<dyn error::Error>> {
    let mut readers: Vec<(&'static str, Box<dyn VariantTableReader>)> = Vec::new();
    if let Some(filename) = &settings.sv_filename {
        readers.push((
            "sv",
            Box::new(SvTableReader {
                filename: filename.clone(),
                use_adjusted: !settings.no_adjust,
            }),
        ));
    }
    if let Some(filename) = &settings.snv_filename {
        readers.push((
            "snv",
            Box::new(SnvTableReader {
                filename: filename.clone(),
            }),
        ));
    }

    let mut inputs = Vec::new();
    for (label, reader) in readers {
        inputs.push(VariantSetInput {
            label,
            records: reader.read_records()?,
        });
    }

    if settings.cocluster {
        let records = inputs.into_iter().flat_map(|x| x.records).collect();
        inputs = vec![VariantSetInput {
            label: "cocluster",
            records,
        }];
    }
    Ok(inputs)
}

fn write_variant_set_output(
    output_dir: &Utf8Path,
    settings: &ClusterSettings,
    context: &SampleContext,
    fit: &VariantSetFit,
) {
    create_dir_all(output_dir, "variant set output");

    for run_fit in fit.runs.iter() {
        let run_dir = output_dir.join(format!("run{}", run_fit.run.run_index));
        create_dir_all(&run_dir, "run output");

        output::write_variant_assignments(&run_dir, &run_fit.variant_summaries);
        output::write_cluster_summary(&run_dir, &run_fit.cluster_summaries);
        output::write_sampler_trace(&run_dir, &run_fit.run.trace);
        if settings.write_matrix
            && let Some(matrix) = &run_fit.cocluster
        {
            output::write_cocluster_matrix(&run_dir, matrix);
        }
        if settings.smc_het {
            output::write_smc_het(
                &run_dir,
                context.purity,
                &run_fit.variant_summaries,
                &run_fit.cluster_summaries,
                run_fit.cocluster.as_ref(),
            );
        }
    }

    if settings.map {
        let entries = fit.model_selection().collect::<Vec<_>>();
        output::write_model_selection(output_dir, &entries);
    }
}

fn cluster_variant_set(
    output_dir: &Utf8Path,
    settings: &ClusterSettings,
    config: &ClusterConfig,
    context: &SampleContext,
    input: &VariantSetInput,
) -> Result<VariantSetStats, Box<dyn error::Error>> {
    info!(
        "Clustering variant set '{}' with {} records",
        input.label,
        input.records.len()
    );
    let start = std::time::Instant::now();

    let variants = build_variant_set(&input.records, context)?;
    let fit = fit_variant_set(&variants, config)?;

    let sampling_time = start.elapsed();
    info!(
        "Finished clustering variant set '{}'. Runtime: {}",
        input.label,
        sampling_time.hhmmssxxx()
    );

    write_variant_set_output(&output_dir.join(input.label), settings, context, &fit);

    let best = fit.best();
    Ok(VariantSetStats {
        label: input.label.to_string(),
        variant_count: variants.len(),
        requested_run_count: config.sampler.n_runs,
        completed_run_count: fit.runs.len(),
        failed_runs: fit
            .failed_runs
            .iter()
            .map(|x| format!("run {}: {}", x.run_index, x.error))
            .collect(),
        best_run: fit.best_run,
        best_run_cluster_count: best.map(|x| x.model.cluster_count()).unwrap_or_default(),
        convergence_warning_count: fit.runs.iter().map(|x| x.run.warnings.len()).sum(),
        sampling_time_secs: sampling_time.as_secs_f64(),
    })
}

pub fn run_cluster(
    shared_settings: &SharedSettings,
    settings: &ClusterSettings,
) -> Result<(), Box<dyn error::Error>> {
    let output_dir = &settings.output_dir;
    write_cluster_settings(output_dir, settings);

    let context = get_sample_context(settings)?;
    let config = settings.to_cluster_config(shared_settings.thread_count);
    let inputs = get_variant_set_inputs(settings)?;

    let mut run_stats = ClusterRunStats {
        sample_name: settings.sample.clone(),
        purity: context.purity,
        ploidy: context.ploidy,
        variant_sets: Vec::new(),
    };
    for input in inputs.iter() {
        let stats = cluster_variant_set(output_dir, settings, &config, &context, input)?;
        run_stats.variant_sets.push(stats);
    }

    write_cluster_run_stats(output_dir, &run_stats);
    Ok(())
}
