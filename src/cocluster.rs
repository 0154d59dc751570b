//! Pairwise co-clustering probabilities over retained posterior samples
//!

use std::collections::HashMap;

use rayon::prelude::*;

use crate::dpmm::PosteriorSample;

/// Symmetric N x N matrix of the fraction of samples in which each variant pair shares a cluster
///
/// Rows and columns follow variant input order, and can also be addressed by variant id.
///
#[derive(Clone, Debug)]
pub struct CoclusterMatrix {
    ids: Vec<String>,
    id_index: HashMap<String, usize>,
    variant_count: usize,
    values: Vec<f64>,
}

impl CoclusterMatrix {
    pub fn variant_count(&self) -> usize {
        self.variant_count
    }

    /// Variant ids in row order
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.variant_count + j]
    }

    /// Co-clustering probability of two variants given by id, None if either id is unknown
    pub fn get_by_id(&self, id1: &str, id2: &str) -> Option<f64> {
        let i = *self.id_index.get(id1)?;
        let j = *self.id_index.get(id2)?;
        Some(self.get(i, j))
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let n = self.variant_count;
        &self.values[i * n..(i + 1) * n]
    }
}

/// Count co-clustered pairs over a block of samples, in row-major upper triangle layout
///
fn tally_pairs(samples: &[PosteriorSample], variant_count: usize) -> Vec<u32> {
    let mut counts = vec![0u32; variant_count * variant_count];
    for sample in samples {
        for i in 0..variant_count {
            let label = sample.labels[i];
            let row = &mut counts[i * variant_count..(i + 1) * variant_count];
            for j in (i + 1)..variant_count {
                if sample.labels[j] == label {
                    row[j] += 1;
                }
            }
        }
    }
    counts
}

/// Compute the co-clustering matrix from a run's retained samples
///
/// Samples are split into one block per worker thread, each block is tallied independently and
/// the integer tallies are summed, so the result does not depend on the thread count.
///
/// With no samples every off-diagonal value is zero.
///
pub fn compute_cocluster_matrix(
    samples: &[PosteriorSample],
    ids: &[&str],
    thread_count: usize,
) -> CoclusterMatrix {
    let n = ids.len();
    let counts = if samples.is_empty() {
        vec![0u32; n * n]
    } else {
        let worker_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(thread_count)
            .build()
            .unwrap();
        let chunk_size = samples.len().div_ceil(thread_count);
        worker_pool.install(|| {
            samples
                .par_chunks(chunk_size)
                .map(|x| tally_pairs(x, n))
                .reduce(
                    || vec![0u32; n * n],
                    |mut a, b| {
                        a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
                        a
                    },
                )
        })
    };

    let sample_count = std::cmp::max(samples.len(), 1) as f64;
    let mut values = vec![0.0; n * n];
    for i in 0..n {
        values[i * n + i] = 1.0;
        for j in (i + 1)..n {
            let x = counts[i * n + j] as f64 / sample_count;
            values[i * n + j] = x;
            values[j * n + i] = x;
        }
    }
    CoclusterMatrix {
        ids: ids.iter().map(|x| x.to_string()).collect(),
        id_index: ids
            .iter()
            .enumerate()
            .map(|(i, x)| (x.to_string(), i))
            .collect(),
        variant_count: n,
        values,
    }
}
