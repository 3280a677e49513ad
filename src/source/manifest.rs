use crate::error::{MergeError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Read the list of source paths, one per line.
///
/// Only the first tab-delimited field of a line is used; blank lines and `#`
/// comments are skipped. Paths are taken as written (relative to the working
/// directory).
pub fn load_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| MergeError::unavailable(path.display().to_string(), e))?;

    let paths: Vec<PathBuf> = text
        .lines()
        .filter_map(|line| line.split('\t').next())
        .map(str::trim)
        .filter(|field| !field.is_empty() && !field.starts_with('#'))
        .map(PathBuf::from)
        .collect();

    if paths.is_empty() {
        log::warn!("{} lists no VCF files", path.display());
    } else {
        log::info!("{} VCF files listed in {}", paths.len(), path.display());
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_manifest_first_field_per_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# cohort A").unwrap();
        writeln!(file, "samples/a.vcf\tbatch1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  samples/b.vcf.gz  ").unwrap();

        let paths = load_manifest(file.path()).unwrap();
        assert_eq!(
            paths,
            vec![PathBuf::from("samples/a.vcf"), PathBuf::from("samples/b.vcf.gz")]
        );
    }

    #[test]
    fn test_empty_manifest_is_allowed() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(load_manifest(file.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_manifest_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_manifest(dir.path().join("list.txt")).unwrap_err();
        assert!(matches!(err, MergeError::SourceUnavailable { .. }));
    }
}
