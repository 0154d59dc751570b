use camino::Utf8Path;
use simple_error::{SimpleResult, bail};

/// Check a required input file path
///
/// Assumes no logger has been configured yet
///
pub fn check_required_filename(filename: &Utf8Path, label: &str) -> SimpleResult<()> {
    if filename.as_str().is_empty() {
        bail!("Must specify {label} file");
    }
    if !filename.exists() {
        bail!("Can't find specified {label} file: '{filename}'");
    }
    if !filename.is_file() {
        bail!("Specified {label} file path does not appear to be a file: '{filename}'");
    }
    Ok(())
}

/// Check an optional input file path
///
/// Assumes no logger has been configured yet
///
pub fn check_optional_filename(filename: Option<&Utf8Path>, label: &str) -> SimpleResult<()> {
    match filename {
        Some(x) => check_required_filename(x, label),
        None => Ok(()),
    }
}
