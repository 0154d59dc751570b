//! Utilities pertaining to the filesystem
//!

use camino::Utf8Path;

/// Create a directory path, including any missing parents, if it does not exist already
///
/// * `label` - used to describe the directory in an error message
///
pub fn create_dir_all(dir: &Utf8Path, label: &str) {
    if dir.is_dir() {
        return;
    }
    if let Err(e) = std::fs::create_dir_all(dir) {
        panic!("Can't create new {label} directory at '{dir}': {e}");
    }
}
