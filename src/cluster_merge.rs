//! Merge clusters whose CCF credible intervals overlap
//!

use log::debug;

use crate::cluster_model::ClusterModel;
use crate::dpmm::ObservationSet;
use crate::likelihood::GridPosterior;

/// Disjoint set forest over cluster labels
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut x = x;
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    /// Join the sets of a and b, the lower root label becomes the root of the joined set
    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            let (low, high) = if a < b { (a, b) } else { (b, a) };
            self.parent[high] = low;
        }
    }
}

/// Grid posterior of each cluster's CCF given its member data, None where it can't be normalized
///
pub fn cluster_posteriors(model: &ClusterModel, observations: &ObservationSet) -> Vec<Option<GridPosterior>> {
    model
        .member_terms(observations)
        .iter()
        .map(|x| {
            observations
                .grid
                .posterior(&observations.model, x.iter().copied())
        })
        .collect()
}

fn intervals_overlap(a: (f64, f64), b: (f64, f64)) -> bool {
    a.0 <= b.1 && b.0 <= a.1
}

/// Merge every pair of clusters with overlapping credible intervals at `credible_level`
///
/// Merging is transitive, so chains of overlapping clusters collapse into one cluster. Each
/// merged cluster takes the posterior mean CCF of its combined members. The returned model never
/// has more clusters than the input model.
///
pub fn merge_overlapping_clusters(
    model: &ClusterModel,
    observations: &ObservationSet,
    credible_level: f64,
) -> ClusterModel {
    let cluster_count = model.cluster_count();
    let intervals = cluster_posteriors(model, observations)
        .iter()
        .map(|x| x.as_ref().map(|p| p.credible_interval(credible_level)))
        .collect::<Vec<_>>();

    let mut sets = DisjointSets::new(cluster_count);
    for a in 0..cluster_count {
        for b in (a + 1)..cluster_count {
            if let (Some(ia), Some(ib)) = (intervals[a], intervals[b])
                && intervals_overlap(ia, ib)
            {
                debug!(
                    "Merging cluster {a} CI [{:.3},{:.3}] with cluster {b} CI [{:.3},{:.3}]",
                    ia.0, ia.1, ib.0, ib.1
                );
                sets.union(a, b);
            }
        }
    }

    let root_labels = model
        .labels
        .iter()
        .map(|&x| sets.find(x))
        .collect::<Vec<_>>();
    let mut merged = ClusterModel::from_sparse_labels(&root_labels, &model.ccf);
    if merged.cluster_count() == cluster_count {
        return merged;
    }

    let sizes = model.cluster_sizes();
    let merged_label = model
        .cluster_members()
        .iter()
        .map(|x| merged.labels[x[0]])
        .collect::<Vec<_>>();
    let posteriors = cluster_posteriors(&merged, observations);
    for (label, posterior) in posteriors.into_iter().enumerate() {
        let sources = (0..cluster_count)
            .filter(|&x| merged_label[x] == label)
            .collect::<Vec<_>>();
        if sources.len() < 2 {
            continue;
        }
        merged.ccf[label] = match posterior {
            Some(x) => x.mean(),
            None => {
                // Size-weighted CCF of the source clusters
                let total = sources.iter().map(|&x| sizes[x]).sum::<usize>();
                sources
                    .iter()
                    .map(|&x| model.ccf[x] * sizes[x] as f64)
                    .sum::<f64>()
                    / total as f64
            }
        };
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::likelihood::LikelihoodModel;
    use crate::variant::Variant;

    fn get_observations(data: &[(u64, u64)]) -> ObservationSet {
        let variants = data
            .iter()
            .enumerate()
            .map(|(i, &(s, t))| Variant::new(&format!("v{i}"), s, t, 1.0).unwrap())
            .collect::<Vec<_>>();
        ObservationSet::new(&variants, LikelihoodModel::Binomial, 1000).unwrap()
    }

    #[test]
    fn test_disjoint_sets() {
        let mut sets = DisjointSets::new(5);
        sets.union(3, 4);
        sets.union(1, 4);
        assert_eq!(sets.find(4), 1);
        assert_eq!(sets.find(3), 1);
        assert_eq!(sets.find(0), 0);
        assert_eq!(sets.find(2), 2);
    }

    #[test]
    fn test_overlapping_clusters_merge() {
        let observations = get_observations(&[(50, 100), (52, 100), (10, 100)]);
        let model = ClusterModel {
            labels: vec![0, 1, 2],
            ccf: vec![0.5, 0.52, 0.1],
        };
        let merged = merge_overlapping_clusters(&model, &observations, 0.95);
        assert_eq!(merged.labels, vec![0, 0, 1]);
        approx::assert_abs_diff_eq!(merged.ccf[0], 103.0 / 202.0, epsilon = 1e-3);
        approx::assert_abs_diff_eq!(merged.ccf[1], 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_separated_clusters_are_unchanged() {
        let observations = get_observations(&[(10, 100), (12, 100), (80, 100), (82, 100)]);
        let model = ClusterModel {
            labels: vec![0, 0, 1, 1],
            ccf: vec![0.11, 0.81],
        };
        let merged = merge_overlapping_clusters(&model, &observations, 0.95);
        assert_eq!(merged, model);
    }

    #[test]
    fn test_merge_is_transitive() {
        let observations = get_observations(&[(28, 100), (40, 100), (52, 100)]);
        let model = ClusterModel {
            labels: vec![0, 1, 2],
            ccf: vec![0.28, 0.4, 0.52],
        };
        let intervals = cluster_posteriors(&model, &observations)
            .iter()
            .map(|x| x.as_ref().unwrap().credible_interval(0.95))
            .collect::<Vec<_>>();
        assert!(intervals_overlap(intervals[0], intervals[1]));
        assert!(intervals_overlap(intervals[1], intervals[2]));
        assert!(!intervals_overlap(intervals[0], intervals[2]));

        let merged = merge_overlapping_clusters(&model, &observations, 0.95);
        assert_eq!(merged.cluster_count(), 1);
        assert_eq!(merged.variant_count(), 3);
    }

    #[test]
    fn test_merge_preserves_variants() {
        let observations =
            get_observations(&[(10, 100), (50, 100), (12, 100), (55, 100), (90, 100)]);
        let model = ClusterModel {
            labels: vec![0, 1, 2, 3, 4],
            ccf: vec![0.1, 0.5, 0.12, 0.55, 0.9],
        };
        let merged = merge_overlapping_clusters(&model, &observations, 0.95);
        assert!(merged.cluster_count() <= model.cluster_count());
        assert_eq!(merged.variant_count(), model.variant_count());
        assert_eq!(merged.labels[0], merged.labels[2]);
        assert_eq!(merged.labels[1], merged.labels[3]);
        assert_ne!(merged.labels[0], merged.labels[4]);
    }
}
