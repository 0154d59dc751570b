//! Readers for the filtered variant tables and the sample purity/ploidy table
//!
//! All tables are tab-delimited with a header line, `#` comment lines are skipped.
//!

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::info;

use crate::errors::{ClusterError, ClusterResult, invalid_input};
use crate::features::SampleContext;
use crate::variant::{RawVariantRecord, VariantKind};

/// A source of raw variant records in one table format
pub trait VariantTableReader {
    fn filename(&self) -> &Utf8Path;

    fn kind(&self) -> VariantKind;

    /// Convert one table row to a raw variant record
    fn parse_row(&self, columns: &TableColumns, row: &StringRecord) -> ClusterResult<RawVariantRecord>;

    fn read_records(&self) -> ClusterResult<Vec<RawVariantRecord>> {
        let filename = self.filename();
        let mut rdr = open_table(filename)?;
        let header = rdr.headers().map_err(|e| io_error(filename, e))?.clone();
        let columns = TableColumns::new(&header);

        let mut records = Vec::new();
        for (row_index, result) in rdr.records().enumerate() {
            let row = result.map_err(|e| io_error(filename, e))?;
            let record = self.parse_row(&columns, &row).map_err(|e| match e {
                ClusterError::InputValidation { id, msg } => ClusterError::InputValidation {
                    id,
                    msg: format!("{msg} (row {} of '{filename}')", row_index + 1),
                },
                e => e,
            })?;
            records.push(record);
        }
        info!(
            "Read {} {} records from '{filename}'",
            records.len(),
            self.kind()
        );
        Ok(records)
    }
}

fn io_error(filename: &Utf8Path, e: impl std::fmt::Display) -> ClusterError {
    ClusterError::Io {
        path: filename.to_string(),
        msg: e.to_string(),
    }
}

fn open_table(filename: &Utf8Path) -> ClusterResult<csv::Reader<std::fs::File>> {
    ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .delimiter(b'\t')
        .from_path(filename)
        .map_err(|e| io_error(filename, e))
}

/// Case-insensitive lookup of table columns by header name
pub struct TableColumns {
    index: HashMap<String, usize>,
}

impl TableColumns {
    pub fn new(header: &StringRecord) -> Self {
        Self {
            index: header
                .iter()
                .enumerate()
                .map(|(i, x)| (x.to_lowercase(), i))
                .collect(),
        }
    }

    /// Value of the named column, None if the column is absent or the value is empty
    fn get<'a>(&self, row: &'a StringRecord, name: &str) -> Option<&'a str> {
        self.index
            .get(name)
            .and_then(|&i| row.get(i))
            .filter(|x| !x.is_empty())
    }

    fn get_required<'a>(&self, row: &'a StringRecord, id: &str, name: &str) -> ClusterResult<&'a str> {
        self.get(row, name)
            .ok_or_else(|| invalid_input(id, format!("missing value in column '{name}'")))
    }

    /// Non-negative count from the named column
    ///
    /// Each column is checked on its own, so a negative value is rejected even where it would
    /// be hidden in a sum with other columns.
    ///
    fn get_count(&self, row: &StringRecord, id: &str, name: &str) -> ClusterResult<i64> {
        let value = self.get_required(row, id, name)?;
        let count = parse_count(value).ok_or_else(|| {
            invalid_input(id, format!("can't parse '{value}' in column '{name}' as a count"))
        })?;
        if count < 0 {
            return Err(invalid_input(
                id,
                format!("negative count {count} in column '{name}'"),
            ));
        }
        Ok(count)
    }

    fn get_optional_count(&self, row: &StringRecord, id: &str, name: &str) -> ClusterResult<Option<i64>> {
        match self.get(row, name) {
            Some(_) => Ok(Some(self.get_count(row, id, name)?)),
            None => Ok(None),
        }
    }

    /// Major and minor copy number, each passed through as given
    ///
    /// A row giving only one of the two is rejected when the variant is built.
    ///
    fn get_copy_number(&self, row: &StringRecord, id: &str) -> ClusterResult<(Option<i64>, Option<i64>)> {
        Ok((
            self.get_optional_count(row, id, "major_cn")?,
            self.get_optional_count(row, id, "minor_cn")?,
        ))
    }

    fn get_id(&self, row: &StringRecord) -> ClusterResult<String> {
        self.get(row, "id")
            .map(|x| x.to_string())
            .ok_or_else(|| invalid_input("", "missing variant id"))
    }
}

/// Parse a count value, accepting integral floating point values such as `12.0`
fn parse_count(value: &str) -> Option<i64> {
    if let Ok(x) = value.parse::<i64>() {
        return Some(x);
    }
    match value.parse::<f64>() {
        Ok(x) if x.is_finite() && x.fract() == 0.0 => Some(x as i64),
        _ => None,
    }
}

/// Filtered SV table with columns:
/// `ID split span norm [adjusted_support adjusted_norm] [major_cn minor_cn] [classification]`
///
/// Raw support is the sum of split and spanning reads, and depth adds the reads supporting the
/// reference allele. Upstream filtering may provide adjusted counts, such as normal reads
/// corrected for duplications or supporting reads corrected for inversions. Adjusted counts are
/// used for any row which has them unless `use_adjusted` is false.
///
pub struct SvTableReader {
    pub filename: Utf8PathBuf,
    pub use_adjusted: bool,
}

impl SvTableReader {
    /// Supporting and reference read counts of one row
    fn get_read_counts(&self, columns: &TableColumns, row: &StringRecord, id: &str) -> ClusterResult<(i64, i64)> {
        let split = columns.get_count(row, id, "split")?;
        let span = columns.get_count(row, id, "span")?;
        let norm = columns.get_count(row, id, "norm")?;
        if self.use_adjusted {
            let adjusted_support = columns.get_optional_count(row, id, "adjusted_support")?;
            let adjusted_norm = columns.get_optional_count(row, id, "adjusted_norm")?;
            match (adjusted_support, adjusted_norm) {
                (Some(support), Some(norm)) => return Ok((support, norm)),
                (None, None) => (),
                _ => {
                    return Err(invalid_input(
                        id,
                        "adjusted read counts must give both adjusted_support and adjusted_norm",
                    ));
                }
            }
        }
        Ok((split + span, norm))
    }
}

impl VariantTableReader for SvTableReader {
    fn filename(&self) -> &Utf8Path {
        &self.filename
    }

    fn kind(&self) -> VariantKind {
        VariantKind::Sv
    }

    fn parse_row(&self, columns: &TableColumns, row: &StringRecord) -> ClusterResult<RawVariantRecord> {
        let id = columns.get_id(row)?;
        let (support, norm) = self.get_read_counts(columns, row, &id)?;
        let (major_cn, minor_cn) = columns.get_copy_number(row, &id)?;
        Ok(RawVariantRecord {
            classification: columns.get(row, "classification").map(|x| x.to_string()),
            id,
            kind: VariantKind::Sv,
            support,
            depth: support + norm,
            major_cn,
            minor_cn,
        })
    }
}

/// Filtered SNV table with columns: `ID ref var [major_cn minor_cn]`
pub struct SnvTableReader {
    pub filename: Utf8PathBuf,
}

impl VariantTableReader for SnvTableReader {
    fn filename(&self) -> &Utf8Path {
        &self.filename
    }

    fn kind(&self) -> VariantKind {
        VariantKind::Snv
    }

    fn parse_row(&self, columns: &TableColumns, row: &StringRecord) -> ClusterResult<RawVariantRecord> {
        let id = columns.get_id(row)?;
        let ref_count = columns.get_count(row, &id, "ref")?;
        let var_count = columns.get_count(row, &id, "var")?;
        let (major_cn, minor_cn) = columns.get_copy_number(row, &id)?;
        Ok(RawVariantRecord {
            id,
            kind: VariantKind::Snv,
            support: var_count,
            depth: ref_count + var_count,
            major_cn,
            minor_cn,
            classification: None,
        })
    }
}

/// Read tumor purity and ploidy for one sample from a `sample purity ploidy` table
///
/// The row for `sample_name` is selected, or the only row if the table has exactly one.
///
pub fn read_purity_ploidy(
    filename: &Utf8Path,
    sample_name: &str,
    require_copy_number: bool,
) -> ClusterResult<SampleContext> {
    let mut rdr = open_table(filename)?;
    let header = rdr.headers().map_err(|e| io_error(filename, e))?.clone();
    let columns = TableColumns::new(&header);

    let mut rows = Vec::new();
    for result in rdr.records() {
        rows.push(result.map_err(|e| io_error(filename, e))?);
    }

    let row = match rows
        .iter()
        .find(|x| columns.get(x, "sample") == Some(sample_name))
    {
        Some(x) => x,
        None if rows.len() == 1 => &rows[0],
        None => {
            return Err(invalid_input(
                sample_name,
                format!("no purity/ploidy entry for sample in '{filename}'"),
            ));
        }
    };

    let get_value = |name: &str| -> ClusterResult<f64> {
        let value = columns.get_required(row, sample_name, name)?;
        value
            .parse::<f64>()
            .map_err(|_| invalid_input(sample_name, format!("can't parse {name} value '{value}'")))
    };

    let context = SampleContext {
        purity: get_value("purity")?,
        ploidy: get_value("ploidy")?,
        require_copy_number,
    };
    context.validate()?;
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_table(name: &str, content: &str) -> Utf8PathBuf {
        let dir = std::env::temp_dir().join(format!("svclust_test_{}_{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let filename = Utf8PathBuf::from_path_buf(dir.join(name)).unwrap();
        std::fs::write(&filename, content).unwrap();
        filename
    }

    #[test]
    fn test_read_sv_table() {
        let filename = write_table(
            "svs.txt",
            "ID\tsplit\tspan\tnorm\tmajor_cn\tminor_cn\tclassification\n\
             # comment line\n\
             sv1\t5\t7\t30\t2\t1\tDEL\n\
             sv2\t3\t0\t20\t\t\t\n",
        );
        let records = SvTableReader {
            filename,
            use_adjusted: true,
        }
        .read_records()
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "sv1");
        assert_eq!((records[0].support, records[0].depth), (12, 42));
        assert_eq!((records[0].major_cn, records[0].minor_cn), (Some(2), Some(1)));
        assert_eq!(records[0].classification.as_deref(), Some("DEL"));
        assert_eq!((records[1].major_cn, records[1].minor_cn), (None, None));
        assert_eq!(records[1].classification, None);
    }

    #[test]
    fn test_read_snv_table() {
        let filename = write_table("snvs.txt", "ID\tref\tvar\nsnv1\t40\t10.0\n");
        let records = SnvTableReader { filename }.read_records().unwrap();
        assert_eq!(records[0].kind, VariantKind::Snv);
        assert_eq!((records[0].support, records[0].depth), (10, 50));
    }

    #[test]
    fn test_malformed_count_is_input_error() {
        let filename = write_table("bad_svs.txt", "ID\tsplit\tspan\tnorm\nsv1\tx\t7\t30\n");
        let result = SvTableReader {
            filename,
            use_adjusted: true,
        }
        .read_records();
        assert!(matches!(result, Err(ClusterError::InputValidation { .. })));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let filename = Utf8PathBuf::from("/nonexistent/svclust/svs.txt");
        let result = SvTableReader {
            filename,
            use_adjusted: true,
        }
        .read_records();
        assert!(matches!(result, Err(ClusterError::Io { .. })));
    }

    #[test]
    fn test_read_purity_ploidy() {
        let filename = write_table(
            "pp.txt",
            "sample\tpurity\tploidy\ntumorA\t0.6\t2.3\ntumorB\t0.8\t2.0\n",
        );
        let context = read_purity_ploidy(&filename, "tumorB", false).unwrap();
        approx::assert_abs_diff_eq!(context.purity, 0.8);
        approx::assert_abs_diff_eq!(context.ploidy, 2.0);
        assert!(read_purity_ploidy(&filename, "tumorC", false).is_err());

        let filename = write_table("pp_single.txt", "sample\tpurity\tploidy\nother\t0.5\t2\n");
        let context = read_purity_ploidy(&filename, "tumorA", true).unwrap();
        approx::assert_abs_diff_eq!(context.purity, 0.5);
        assert!(context.require_copy_number);
    }

    #[test]
    fn test_negative_count_in_summed_column_is_rejected() {
        // split + span is non-negative, but split alone is not
        let filename = write_table("neg_svs.txt", "ID\tsplit\tspan\tnorm\nsv1\t-3\t5\t10\n");
        let result = SvTableReader {
            filename,
            use_adjusted: true,
        }
        .read_records();
        assert!(matches!(result, Err(ClusterError::InputValidation { .. })));

        let filename = write_table("neg_snvs.txt", "ID\tref\tvar\nsnv1\t-2\t4\n");
        let result = SnvTableReader { filename }.read_records();
        assert!(matches!(result, Err(ClusterError::InputValidation { .. })));
    }

    #[test]
    fn test_partial_copy_number_is_rejected() {
        let filename = write_table(
            "half_cn_svs.txt",
            "ID\tsplit\tspan\tnorm\tmajor_cn\tminor_cn\nsv1\t5\t7\t30\t2\t\n",
        );
        let records = SvTableReader {
            filename,
            use_adjusted: true,
        }
        .read_records()
        .unwrap();
        assert_eq!((records[0].major_cn, records[0].minor_cn), (Some(2), None));

        let result = crate::features::build_variant(&records[0], &SampleContext::default());
        assert!(matches!(result, Err(ClusterError::InputValidation { .. })));
    }

    #[test]
    fn test_adjusted_read_counts() {
        let content = "ID\tsplit\tspan\tnorm\tadjusted_support\tadjusted_norm\n\
                       sv1\t5\t7\t30\t10\t15\n\
                       sv2\t3\t1\t20\t\t\n";
        let filename = write_table("adjusted_svs.txt", content);

        let records = SvTableReader {
            filename: filename.clone(),
            use_adjusted: true,
        }
        .read_records()
        .unwrap();
        assert_eq!((records[0].support, records[0].depth), (10, 25));
        assert_eq!((records[1].support, records[1].depth), (4, 24));

        let records = SvTableReader {
            filename,
            use_adjusted: false,
        }
        .read_records()
        .unwrap();
        assert_eq!((records[0].support, records[0].depth), (12, 42));
        assert_eq!((records[1].support, records[1].depth), (4, 24));

        let filename = write_table(
            "half_adjusted_svs.txt",
            "ID\tsplit\tspan\tnorm\tadjusted_support\nsv1\t5\t7\t30\t10\n",
        );
        let result = SvTableReader {
            filename,
            use_adjusted: true,
        }
        .read_records();
        assert!(matches!(result, Err(ClusterError::InputValidation { .. })));
    }
}
