use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use eyre::{Result, WrapErr};
use which::which;

pub fn find_binary(name: &'static str, binary_filepath: &Option<PathBuf>) -> Result<PathBuf> {
    if let Some(p) = binary_filepath {
        Ok(p.to_path_buf())
    } else {
        which(name).wrap_err_with(|| format!("Error finding {name} in $PATH"))
    }
}

/// Path without its last extension, ie "genome.fa" -> "genome"
fn stem_path(input: &Path) -> OsString {
    input.with_extension("").into_os_string()
}

/// Output named after the input with a tag placed before the extension, ie
/// ("lib.tsv", ".sub") -> "lib.sub.tsv"
pub fn tagged_output<P: AsRef<Path>>(input: P, tag: &str) -> PathBuf {
    let input = input.as_ref();
    let mut name = stem_path(input);
    name.push(tag);
    if let Some(ext) = input.extension() {
        name.push(".");
        name.push(ext);
    }
    PathBuf::from(name)
}

/// Output named after the input with the extension replaced by a suffix, ie
/// ("genome.fa", ".targets.all.tsv") -> "genome.targets.all.tsv"
pub fn suffixed_output<P: AsRef<Path>>(input: P, suffix: &str) -> PathBuf {
    let mut name = stem_path(input.as_ref());
    name.push(suffix);
    PathBuf::from(name)
}
