//! Convert raw per-variant read counts and copy-number context into clustering observations
//!

use std::collections::HashSet;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::{ClusterResult, invalid_input};
use crate::variant::{RawVariantRecord, Variant};

/// Copy number assumed for the normal cells contaminating the tumor sample
pub const NORMAL_COPY_NUMBER: u32 = 2;

/// Sample-level context needed to move from read fractions into CCF space
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SampleContext {
    /// Fraction of tumor cells in the sample
    pub purity: f64,

    /// Average tumor copy number, used to derive a copy number state for variants without one
    pub ploidy: f64,

    /// Reject variants without a copy number state instead of deriving one from ploidy
    pub require_copy_number: bool,
}

impl Default for SampleContext {
    fn default() -> Self {
        Self {
            purity: 1.0,
            ploidy: 2.0,
            require_copy_number: false,
        }
    }
}

impl SampleContext {
    pub fn validate(&self) -> ClusterResult<()> {
        if !(self.purity > 0.0 && self.purity <= 1.0) {
            return Err(invalid_input(
                "sample",
                format!("purity must be in (0,1], got {}", self.purity),
            ));
        }
        if !(self.ploidy.is_finite() && self.ploidy > 0.0) {
            return Err(invalid_input(
                "sample",
                format!("ploidy must be positive, got {}", self.ploidy),
            ));
        }
        Ok(())
    }

    /// Copy number state assumed where none is given for a variant
    ///
    /// Ploidy is rounded to a total copy number which is split evenly between the major and minor
    /// allele, except that a total below 2 becomes the single-copy state 1/0.
    ///
    pub fn default_copy_number_state(&self) -> (u32, u32) {
        let total = self.ploidy.round() as u32;
        if total < 2 {
            (1, 0)
        } else {
            (total.div_ceil(2), total / 2)
        }
    }

    /// Expected read fraction per unit CCF when `multiplicity` of the tumor copies carry the variant
    ///
    pub fn scale(&self, major_cn: u32, minor_cn: u32, multiplicity: u32) -> f64 {
        let tumor_cn = (major_cn + minor_cn) as f64;
        let denom =
            self.purity * tumor_cn + (1.0 - self.purity) * NORMAL_COPY_NUMBER as f64;
        self.purity * multiplicity as f64 / denom
    }
}

/// Find the smallest multiplicity for which the read fraction implies a feasible CCF
///
/// Returns a 2-tuple of (multiplicity, scale). If no multiplicity yields CCF <= 1, the major
/// copy number is used.
///
fn select_multiplicity(context: &SampleContext, vaf: f64, major_cn: u32, minor_cn: u32) -> (u32, f64) {
    assert!(major_cn > 0);
    for multiplicity in 1..=major_cn {
        let scale = context.scale(major_cn, minor_cn, multiplicity);
        if vaf / scale <= 1.0 {
            return (multiplicity, scale);
        }
    }
    (major_cn, context.scale(major_cn, minor_cn, major_cn))
}

fn get_copy_number_state(
    raw: &RawVariantRecord,
    context: &SampleContext,
) -> ClusterResult<(u32, u32)> {
    let to_copy_number = |x: i64, label: &str| {
        u32::try_from(x).map_err(|_| {
            invalid_input(&raw.id, format!("{label} copy number must be non-negative, got {x}"))
        })
    };

    match (raw.major_cn, raw.minor_cn) {
        (Some(major), Some(minor)) => {
            let major = to_copy_number(major, "major")?;
            let minor = to_copy_number(minor, "minor")?;
            if minor > major {
                return Err(invalid_input(
                    &raw.id,
                    format!("minor copy number {minor} exceeds major copy number {major}"),
                ));
            }
            Ok((major, minor))
        }
        (None, None) => {
            if context.require_copy_number {
                Err(invalid_input(&raw.id, "missing copy number state"))
            } else {
                Ok(context.default_copy_number_state())
            }
        }
        _ => Err(invalid_input(
            &raw.id,
            "copy number state must give both major and minor copy number",
        )),
    }
}

/// Build the clustering observation for one raw variant record
///
pub fn build_variant(raw: &RawVariantRecord, context: &SampleContext) -> ClusterResult<Variant> {
    if raw.support < 0 || raw.depth < 0 {
        return Err(invalid_input(
            &raw.id,
            format!(
                "read counts must be non-negative, got support {} and depth {}",
                raw.support, raw.depth
            ),
        ));
    }
    if raw.support > raw.depth {
        return Err(invalid_input(
            &raw.id,
            format!(
                "supporting read count {} exceeds trial count {}",
                raw.support, raw.depth
            ),
        ));
    }

    let (major_cn, minor_cn) = get_copy_number_state(raw, context)?;
    if major_cn == 0 {
        return Err(invalid_input(
            &raw.id,
            "no tumor chromosome copies are available to carry the variant",
        ));
    }

    let successes = raw.support as u64;
    let trials = raw.depth as u64;
    let vaf = if trials == 0 {
        0.0
    } else {
        successes as f64 / trials as f64
    };
    let (multiplicity, scale) = select_multiplicity(context, vaf, major_cn, minor_cn);

    let variant = Variant {
        id: raw.id.clone(),
        kind: raw.kind,
        successes,
        trials,
        scale,
        major_cn,
        minor_cn,
        multiplicity,
        classification: raw.classification.clone(),
    };
    variant.check_likelihood_terms()?;
    Ok(variant)
}

/// Build all observations for one clustering run
///
/// Any invalid record fails the whole set, no partial variant set is returned.
///
pub fn build_variant_set(
    raws: &[RawVariantRecord],
    context: &SampleContext,
) -> ClusterResult<Vec<Variant>> {
    context.validate()?;
    if raws.is_empty() {
        return Err(invalid_input("input", "no variants available for clustering"));
    }

    let mut ids = HashSet::new();
    let mut variants = Vec::with_capacity(raws.len());
    for raw in raws {
        if !ids.insert(raw.id.as_str()) {
            return Err(invalid_input(&raw.id, "duplicated variant id"));
        }
        variants.push(build_variant(raw, context)?);
    }

    let overdispersed_count = variants.iter().filter(|x| x.raw_ccf() > 1.0).count();
    if overdispersed_count > 0 {
        warn!(
            "{overdispersed_count} of {} variants have read support above the level expected at CCF 1 for any multiplicity",
            variants.len()
        );
    }
    Ok(variants)
}
