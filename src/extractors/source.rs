use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::debug;
use walkdir::WalkDir;

use crate::extractors::PathSpecSource;
use crate::models::PathSpec;

/// Yields one path specification per regular file below a directory,
/// in file-name order.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("Source is not a directory: {}", root.display());
        }
        debug!("Walking source directory {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
        })
    }
}

impl PathSpecSource for DirectorySource {
    fn path_specs(&self) -> Box<dyn Iterator<Item = Result<PathSpec>> + Send + '_> {
        let entries = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) if entry.file_type().is_file() => Some(Ok(PathSpec::from_path(entry.path()))),
                Ok(_) => None,
                Err(e) => {
                    let location = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    Some(Err::<PathSpec, _>(e).context(format!("Failed to walk {}", location)))
                }
            });
        Box::new(entries)
    }
}

/// Yields a fixed list of path specifications.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    path_specs: Vec<PathSpec>,
}

impl StaticSource {
    pub fn new<I, P>(path_specs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathSpec>,
    {
        Self {
            path_specs: path_specs.into_iter().map(Into::into).collect(),
        }
    }
}

impl PathSpecSource for StaticSource {
    fn path_specs(&self) -> Box<dyn Iterator<Item = Result<PathSpec>> + Send + '_> {
        Box::new(self.path_specs.iter().cloned().map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_directory_source_yields_files_only() {
        let temp_dir = TempDir::new().unwrap();
        let base_path = temp_dir.path();
        fs::create_dir_all(base_path.join("dir1/subdir1")).unwrap();
        fs::write(base_path.join("b.log"), b"log").unwrap();
        fs::write(base_path.join("a.txt"), b"text").unwrap();
        fs::write(base_path.join("dir1/subdir1/c.txt"), b"nested").unwrap();

        let source = DirectorySource::new(base_path).unwrap();
        let path_specs: Vec<PathSpec> = source.path_specs().collect::<Result<_>>().unwrap();

        assert_eq!(path_specs.len(), 3);
        assert_eq!(path_specs[0], PathSpec::from_path(&base_path.join("a.txt")));
        assert_eq!(path_specs[1], PathSpec::from_path(&base_path.join("b.log")));
        assert_eq!(path_specs[2], PathSpec::from_path(&base_path.join("dir1/subdir1/c.txt")));
    }

    #[test]
    fn test_directory_source_rejects_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        assert!(DirectorySource::new(&temp_dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_static_source() {
        let source = StaticSource::new(["/a", "/b"]);
        let path_specs: Vec<String> = source
            .path_specs()
            .map(|p| p.unwrap().to_string())
            .collect();
        assert_eq!(path_specs, vec!["/a", "/b"]);
    }
}
