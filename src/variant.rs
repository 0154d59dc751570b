use serde::{Deserialize, Serialize};

use crate::errors::{ClusterResult, invalid_input};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize, strum::Display)]
pub enum VariantKind {
    #[strum(serialize = "SV")]
    Sv,
    #[strum(serialize = "SNV")]
    Snv,
}

/// Variant record as delivered by an input table reader, before any validation
///
/// Counts are kept signed so that malformed upstream values can be reported rather than
/// silently wrapped during parsing.
///
#[derive(Clone, Debug)]
pub struct RawVariantRecord {
    pub id: String,
    pub kind: VariantKind,

    /// Reads supporting the variant allele
    pub support: i64,

    /// All informative reads at the variant locus, including `support`
    pub depth: i64,

    pub major_cn: Option<i64>,
    pub minor_cn: Option<i64>,

    /// Upstream classification tag, carried through without interpretation
    pub classification: Option<String>,
}

/// A single clustering observation
///
/// The read fraction expected for a variant present in a fraction `ccf` of tumor cells is
/// `ccf * scale`. Variants are immutable once built and are always handled through shared
/// references by the clustering engine.
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Variant {
    pub id: String,
    pub kind: VariantKind,
    pub successes: u64,
    pub trials: u64,
    pub scale: f64,
    pub major_cn: u32,
    pub minor_cn: u32,

    /// Number of tumor chromosome copies assumed to carry the variant
    pub multiplicity: u32,
    pub classification: Option<String>,
}

impl Variant {
    /// Build a variant directly from its likelihood terms with copy-neutral annotation
    ///
    pub fn new(id: &str, successes: u64, trials: u64, scale: f64) -> ClusterResult<Self> {
        let variant = Self {
            id: id.to_string(),
            kind: VariantKind::Sv,
            successes,
            trials,
            scale,
            major_cn: 1,
            minor_cn: 1,
            multiplicity: 1,
            classification: None,
        };
        variant.check_likelihood_terms()?;
        Ok(variant)
    }

    pub(crate) fn check_likelihood_terms(&self) -> ClusterResult<()> {
        if self.id.is_empty() {
            return Err(invalid_input(&self.id, "variant id is empty"));
        }
        if self.successes > self.trials {
            return Err(invalid_input(
                &self.id,
                format!(
                    "supporting read count {} exceeds trial count {}",
                    self.successes, self.trials
                ),
            ));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(invalid_input(
                &self.id,
                format!("copy-number scaling factor must be positive, got {}", self.scale),
            ));
        }
        Ok(())
    }

    /// Read support fraction
    pub fn vaf(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.successes as f64 / self.trials as f64
        }
    }

    /// CCF implied directly by the read support fraction, without clamping
    pub fn raw_ccf(&self) -> f64 {
        self.vaf() / self.scale
    }
}
