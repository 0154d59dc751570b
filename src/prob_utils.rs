use num::{Float, NumCast};

/// Standardize ln-transformed unnormalized prob distro input
///
/// Returns the index of the most probable component, or None if the input is empty or has no
/// finite component to normalize against (every entry is -inf or NaN).
///
pub fn normalize_ln_distro<F: Float>(x: &mut [F]) -> Option<usize> {
    let mut max_index = None;
    let mut max_p = F::neg_infinity();
    for (index, p) in x.iter().enumerate() {
        if p.is_nan() {
            return None;
        }
        if *p > max_p {
            max_p = *p;
            max_index = Some(index);
        }
    }

    let max_index = max_index?;
    if !max_p.is_finite() {
        return None;
    }

    let mut sum: F = NumCast::from(0).unwrap();
    for p in x.iter_mut() {
        *p = (*p - max_p).exp();
        sum = sum + *p;
    }

    for p in x.iter_mut() {
        *p = *p / sum;
    }

    Some(max_index)
}

/// ln(sum(exp(x))) computed without overflow
///
pub fn ln_sum_exp(x: &[f64]) -> f64 {
    let max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + x.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Select a component index from a normalized distro given a uniform draw `u` in [0,1)
///
/// Rounding error can leave the cumulative sum just short of `u`, in which case the last
/// component with non-zero probability is returned.
///
pub fn sample_index_from_distro(pdf: &[f64], u: f64) -> usize {
    assert!(!pdf.is_empty());
    let mut cumulative = 0.0;
    let mut last_nonzero = 0;
    for (index, p) in pdf.iter().enumerate() {
        if *p > 0.0 {
            last_nonzero = index;
        }
        cumulative += p;
        if u < cumulative {
            return index;
        }
    }
    last_nonzero
}

/// Linear-interpolated quantile of an already sorted sample
///
pub fn sorted_quantile(sorted: &[f64], q: f64) -> f64 {
    assert!(!sorted.is_empty());
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}
