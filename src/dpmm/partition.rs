use statrs::function::gamma::ln_gamma;

/// Log probability of a partition with the given cluster sizes under the Chinese Restaurant
/// Process (Ewens distribution) with concentration `alpha`
///
pub fn ln_ewens_prior(alpha: f64, cluster_sizes: &[usize]) -> f64 {
    let n = cluster_sizes.iter().sum::<usize>() as f64;
    let k = cluster_sizes.len() as f64;
    k * alpha.ln() + ln_gamma(alpha) - ln_gamma(alpha + n)
        + cluster_sizes
            .iter()
            .map(|&x| ln_gamma(x as f64))
            .sum::<f64>()
}

/// Relabel a cluster assignment with contiguous labels ordered by first appearance
///
/// Returns a 2-tuple of (labels, ids), where `ids[label]` is the original cluster id of `label`.
///
pub fn canonical_labels(assignment: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let max_id = assignment.iter().copied().max().map_or(0, |x| x + 1);
    let mut id_to_label = vec![None; max_id];
    let mut ids = Vec::new();
    let labels = assignment
        .iter()
        .map(|&id| {
            *id_to_label[id].get_or_insert_with(|| {
                ids.push(id);
                ids.len() - 1
            })
        })
        .collect();
    (labels, ids)
}

/// Member count of each label in a contiguous labeling
pub fn label_sizes(labels: &[usize], label_count: usize) -> Vec<usize> {
    let mut sizes = vec![0; label_count];
    for &label in labels {
        sizes[label] += 1;
    }
    sizes
}
