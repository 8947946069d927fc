//! Data-lake storage source.
//!
//! Recursively enumerates a directory prefix in a hierarchical-namespace
//! filesystem, downloads each file, and attaches the principals that hold
//! read access, parsed from the backend's POSIX-style ACL string.
//!
//! # ACL grammar
//!
//! The access-control string is a comma-separated list of entries of the
//! form `scope:principal:permissions`, e.g.
//! `user::rwx,group::r-x,other::r--,user:xxxxxxxx-xxxx-...:r--`.
//! An entry is malformed and skipped when it does not have exactly three
//! colon-delimited fields or its principal is empty (the unnamed owner and
//! owning-group entries fall out this way). A `user` entry with a read bit
//! contributes its principal to `acl.users`; a `group` entry with a read
//! bit contributes to `acl.groups`. `other` scopes and entries without a
//! read bit are recorded nowhere.
//!
//! # Failure behavior
//!
//! A retrieval error for one file is logged and the file skipped; the
//! enumeration continues. This source lists many files per run, and one
//! bad file must not abort the batch — the opposite policy of
//! [`crate::source_blob::BlobSource`].

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::config::DataLakeConfig;
use crate::error::{RelayError, Result};
use crate::models::{FileAcl, FileHandle};
use crate::source::FileSource;

pub struct DataLakeSource {
    config: DataLakeConfig,
    scratch_dir: PathBuf,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct PathList {
    paths: Vec<PathEntry>,
}

#[derive(Deserialize)]
struct PathEntry {
    name: String,
    #[serde(rename = "isDirectory", default)]
    is_directory: Option<String>,
}

impl DataLakeSource {
    pub fn new(config: DataLakeConfig, scratch_dir: PathBuf) -> Self {
        Self {
            config,
            scratch_dir,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        match self.config.endpoint_url {
            Some(ref url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.dfs.core.windows.net", self.config.account),
        }
    }

    fn with_sas(&self, url: String) -> String {
        match self.config.sas_token {
            Some(ref sas) if url.contains('?') => format!("{}&{}", url, sas),
            Some(ref sas) => format!("{}?{}", url, sas),
            None => url,
        }
    }

    async fn fetch_file(&self, name: &str, dest: &Path) -> Result<FileAcl> {
        let url = self.with_sas(format!("{}/{}/{}", self.endpoint(), self.config.filesystem, name));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| retrieval(name, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(retrieval(name, format!("HTTP {}", resp.status())));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| retrieval(name, e.to_string()))?;
        std::fs::write(dest, &bytes).map_err(|e| retrieval(name, e.to_string()))?;

        // Request ACLs as GUIDs, not resolved principal names.
        let acl_url = self.with_sas(format!(
            "{}/{}/{}?action=getAccessControl&upn=false",
            self.endpoint(),
            self.config.filesystem,
            name
        ));
        let resp = self
            .client
            .head(&acl_url)
            .send()
            .await
            .map_err(|e| retrieval(name, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(retrieval(name, format!("ACL fetch: HTTP {}", resp.status())));
        }

        let acl_text = resp
            .headers()
            .get("x-ms-acl")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        Ok(parse_acl(acl_text))
    }
}

#[async_trait]
impl FileSource for DataLakeSource {
    async fn list_paths(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/{}?resource=filesystem&recursive=true&directory={}",
                self.endpoint(),
                self.config.filesystem,
                self.config.path
            );
            if let Some(ref token) = continuation {
                url = format!("{}&continuation={}", url, token);
            }
            let url = self.with_sas(url);

            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| retrieval(&self.config.path, e.to_string()))?;
            if !resp.status().is_success() {
                return Err(retrieval(&self.config.path, format!("HTTP {}", resp.status())));
            }

            let next = resp
                .headers()
                .get("x-ms-continuation")
                .and_then(|v| v.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string());

            let body: PathList = resp
                .json()
                .await
                .map_err(|e| retrieval(&self.config.path, e.to_string()))?;
            for entry in body.paths {
                if entry.is_directory.as_deref() == Some("true") {
                    continue;
                }
                paths.push(entry.name);
            }

            match next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok(paths)
    }

    async fn list(&self) -> Result<Vec<FileHandle>> {
        std::fs::create_dir_all(&self.scratch_dir)?;

        let mut handles = Vec::new();
        for name in self.list_paths().await? {
            let basename = name.rsplit('/').next().unwrap_or(&name);
            let dest = self.scratch_dir.join(basename);

            info!(path = %name, "Downloading data-lake file");
            match self.fetch_file(&name, &dest).await {
                Ok(acl) => {
                    let source_url =
                        format!("{}/{}/{}", self.endpoint(), self.config.filesystem, name);
                    handles.push(FileHandle {
                        name,
                        path: dest,
                        source_url: Some(source_url),
                        is_remote: true,
                        acl,
                    });
                }
                Err(e) => {
                    // One bad file must not abort the batch.
                    error!(path = %name, error = %e, "Error reading file, skipping");
                    if dest.exists() {
                        if let Err(cleanup) = std::fs::remove_file(&dest) {
                            error!(path = %dest.display(), error = %cleanup, "Error deleting partial download");
                        }
                    }
                }
            }
        }
        Ok(handles)
    }
}

/// Parse a POSIX-style ACL string into read-capable principals.
///
/// Malformed entries are skipped, never escalated.
pub fn parse_acl(acl: &str) -> FileAcl {
    let mut parsed = FileAcl::default();
    for entry in acl.split(',') {
        let parts: Vec<&str> = entry.split(':').collect();
        if parts.len() != 3 {
            continue;
        }
        let (scope, principal, perms) = (parts[0], parts[1], parts[2]);
        if principal.is_empty() {
            continue;
        }
        if !perms.contains('r') {
            continue;
        }
        match scope {
            "user" => parsed.users.push(principal.to_string()),
            "group" => parsed.groups.push(principal.to_string()),
            _ => {}
        }
    }
    parsed
}

fn retrieval(name: &str, reason: String) -> RelayError {
    RelayError::Retrieval {
        name: name.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_and_no_read_entries_are_excluded() {
        let acl = parse_acl("user::rwx,group::r-x,user:abc-123:r--,group:def-456:-wx");
        assert_eq!(acl.users, vec!["abc-123"]);
        assert!(acl.groups.is_empty());
    }

    #[test]
    fn read_capable_group_is_included() {
        let acl = parse_acl("user::rwx,group:11111111-2222:r-x,other::---");
        assert!(acl.users.is_empty());
        assert_eq!(acl.groups, vec!["11111111-2222"]);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let acl = parse_acl("garbage,user:abc:r--:extra,user:ok-guid:r--");
        assert_eq!(acl.users, vec!["ok-guid"]);
        assert!(acl.groups.is_empty());
    }

    #[test]
    fn other_scope_is_never_recorded() {
        let acl = parse_acl("other:some-guid:rwx");
        assert!(acl.is_empty());
    }

    #[test]
    fn empty_string_yields_empty_acl() {
        assert!(parse_acl("").is_empty());
    }
}
