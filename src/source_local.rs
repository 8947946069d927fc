use anyhow::bail;
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use crate::config::LocalSourceConfig;
use crate::error::Result;
use crate::models::{FileAcl, FileHandle};
use crate::source::FileSource;

/// Extension of the sidecar files holding the persisted content digest.
const DIGEST_EXT: &str = "md5";

/// Local filesystem source.
///
/// Walks the configured root depth-first and yields only files whose
/// content changed since the last run, tracked via a `<path>.md5` sidecar
/// next to each source file. The sidecars themselves are never yielded.
pub struct LocalSource {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
}

impl LocalSource {
    pub fn new(config: &LocalSourceConfig) -> anyhow::Result<Self> {
        if !config.root.exists() {
            bail!("Local source root does not exist: {}", config.root.display());
        }
        Ok(Self {
            root: config.root.clone(),
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&config.exclude_globs)?,
        })
    }

    /// Returns true when the file's freshly computed digest equals the
    /// persisted sidecar digest. A changed or previously unseen file
    /// rewrites the sidecar before returning.
    fn is_unchanged(&self, path: &Path) -> Result<bool> {
        let content = std::fs::read(path)?;
        let digest = format!("{:x}", md5::compute(&content));

        let sidecar = sidecar_path(path);
        if let Ok(stored) = std::fs::read_to_string(&sidecar) {
            if stored.trim() == digest {
                info!(path = %path.display(), "Skipping, no changes detected");
                return Ok(true);
            }
        }

        std::fs::write(&sidecar, &digest)?;
        Ok(false)
    }
}

#[async_trait]
impl FileSource for LocalSource {
    async fn list_paths(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| crate::error::RelayError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(DIGEST_EXT) {
                continue;
            }

            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");
            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }
            paths.push(rel_str);
        }
        paths.sort();
        Ok(paths)
    }

    async fn list(&self) -> Result<Vec<FileHandle>> {
        let mut handles = Vec::new();
        for rel in self.list_paths().await? {
            let path = self.root.join(&rel);
            if self.is_unchanged(&path)? {
                continue;
            }
            handles.push(FileHandle {
                name: rel,
                source_url: Some(format!("file://{}", path.display())),
                path,
                is_remote: false,
                acl: FileAcl::default(),
            });
        }
        Ok(handles)
    }
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".");
    s.push(DIGEST_EXT);
    PathBuf::from(s)
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalSourceConfig;
    use tempfile::TempDir;

    fn source_for(root: &Path) -> LocalSource {
        LocalSource::new(&LocalSourceConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*".to_string()],
            exclude_globs: vec![],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn sidecars_are_excluded_from_enumeration() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(tmp.path().join("a.txt.md5"), "stale").unwrap();

        let source = source_for(tmp.path());
        assert_eq!(source.list_paths().await.unwrap(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn unchanged_files_are_not_yielded_twice() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("doc.txt");
        std::fs::write(&file, "original content").unwrap();

        let source = source_for(tmp.path());

        // First run yields the file and writes the sidecar.
        let first = source.list().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name, "doc.txt");
        assert!(!first[0].is_remote);

        // Second run with identical content yields nothing.
        let second = source.list().await.unwrap();
        assert!(second.is_empty());

        // Modifying the content yields exactly one handle again and the
        // sidecar is refreshed.
        std::fs::write(&file, "modified content").unwrap();
        let third = source.list().await.unwrap();
        assert_eq!(third.len(), 1);

        let stored = std::fs::read_to_string(tmp.path().join("doc.txt.md5")).unwrap();
        let fresh = format!("{:x}", md5::compute(b"modified content"));
        assert_eq!(stored.trim(), fresh);
    }

    #[tokio::test]
    async fn walk_is_recursive() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("sub/deeper")).unwrap();
        std::fs::write(tmp.path().join("top.txt"), "t").unwrap();
        std::fs::write(tmp.path().join("sub/deeper/leaf.txt"), "l").unwrap();

        let source = source_for(tmp.path());
        let paths = source.list_paths().await.unwrap();
        assert_eq!(paths, vec!["sub/deeper/leaf.txt", "top.txt"]);
    }
}
