//! Source acquisition.
//!
//! Validates a repository reference against the host allow-list, fetches it
//! into a fresh working directory under a time limit, and enforces the size
//! limit after the fetch. Every failure path removes the working directory.
//!
//! ```text
//! reference ──▶ validate ──▶ mkdir ──▶ fetch (timeout) ──▶ measure ──▶ handle
//!                  │                       │                  │
//!                  ▼                       ▼                  ▼
//!             Validation              Fetch / rm -r     SizeLimit / rm -r
//! ```

mod fetch;

pub use fetch::{Fetcher, GitFetcher};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};
use url::Url;
use walkdir::WalkDir;

use crate::config::{Config, Credential};
use crate::error::AcquireError;

/// Prefix for working directory names.
const WORK_DIR_PREFIX: &str = "repolens-";

/// How many names to try before giving up on creating a working directory.
const WORK_DIR_ATTEMPTS: u32 = 16;

static WORK_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A fetched tree on local disk.
///
/// The handle does not remove the directory on drop: the owner decides
/// whether the tree outlives the analysis.
#[derive(Debug)]
pub struct RepositoryHandle {
    root: PathBuf,
}

impl RepositoryHandle {
    fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Root of the fetched tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Release ownership without removing the tree.
    pub fn into_path(self) -> PathBuf {
        self.root
    }

    /// Remove the tree from disk.
    pub fn remove(self) {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!(path = %self.root.display(), "removed working directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.root.display(),
                error = %e,
                "failed to remove working directory"
            ),
        }
    }
}

/// Fetches repositories under the configured resource bounds.
pub struct SourceAcquirer {
    allowed_hosts: Vec<String>,
    credential: Option<Credential>,
    credential_host: String,
    fetch_timeout: Duration,
    max_size_bytes: u64,
    max_size_mb: u64,
    work_root: PathBuf,
    fetcher: Arc<dyn Fetcher>,
}

impl SourceAcquirer {
    /// Create an acquirer from configuration and a fetch primitive.
    pub fn new(config: &Config, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            allowed_hosts: config.allowed_hosts.clone(),
            credential: config.credential.clone(),
            credential_host: config.credential_host.clone(),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            max_size_bytes: config.max_repo_size_bytes(),
            max_size_mb: config.max_repo_size_mb,
            work_root: config.work_root(),
            fetcher,
        }
    }

    /// Directory under which working directories are created.
    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// Check a reference against the allow-list. Performs no I/O.
    pub fn validate_reference(&self, reference: &str) -> Result<Url, AcquireError> {
        let url = Url::parse(reference.trim())
            .map_err(|e| AcquireError::Validation(format!("{:?} is not a URL: {}", reference, e)))?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(AcquireError::Validation(format!(
                "unsupported scheme {:?}",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| AcquireError::Validation("no hostname found".to_string()))?;

        if !self
            .allowed_hosts
            .iter()
            .any(|h| h.eq_ignore_ascii_case(host))
        {
            return Err(AcquireError::Validation(format!(
                "host '{}' not in allowed hosts: {}",
                host,
                self.allowed_hosts.join(", ")
            )));
        }

        Ok(url)
    }

    /// Build the URL handed to the fetcher.
    ///
    /// The credential is only attached for `https` references to the
    /// credential host.
    fn fetch_url(&self, url: &Url) -> String {
        let mut fetch = url.clone();

        let path = fetch.path().trim_end_matches('/').to_string();
        if !path.ends_with(".git") {
            fetch.set_path(&format!("{}.git", path));
        }

        if let Some(cred) = &self.credential {
            let is_credential_host = fetch
                .host_str()
                .map(|h| h.eq_ignore_ascii_case(&self.credential_host))
                .unwrap_or(false);
            if is_credential_host && fetch.scheme() == "https" {
                // set_username only fails for cannot-be-a-base URLs, which
                // validate_reference has already excluded.
                let _ = fetch.set_username(cred.expose());
            }
        }

        fetch.to_string()
    }

    /// Remove any trace of the credential from a message.
    fn scrub(&self, message: &str) -> String {
        match &self.credential {
            Some(cred) if !cred.expose().is_empty() => message.replace(cred.expose(), "***"),
            _ => message.to_string(),
        }
    }

    /// Validate, fetch and size-check a repository.
    pub async fn acquire(&self, reference: &str) -> Result<RepositoryHandle, AcquireError> {
        let url = self.validate_reference(reference)?;
        let fetch_url = self.fetch_url(&url);

        let pending = PendingDir::new(create_work_dir(&self.work_root)?);
        info!(
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            dest = %pending.path().display(),
            "fetching repository"
        );

        let fetched =
            tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(&fetch_url, pending.path()))
                .await;

        match fetched {
            Err(_) => return Err(AcquireError::FetchTimeout(self.fetch_timeout.as_secs())),
            Ok(Err(e)) => return Err(AcquireError::Fetch(self.scrub(&format!("{:#}", e)))),
            Ok(Ok(())) => {}
        }

        let size = measure_tree_size(pending.path());
        if size > self.max_size_bytes {
            return Err(AcquireError::SizeLimit {
                size_mb: size as f64 / (1024.0 * 1024.0),
                limit_mb: self.max_size_mb,
            });
        }

        debug!(bytes = size, "repository fetched");
        Ok(pending.keep())
    }
}

/// A working directory that is removed on drop until `keep` hands it over.
///
/// Covers early returns, cancelled futures and panics during acquisition.
struct PendingDir {
    handle: Option<RepositoryHandle>,
}

impl PendingDir {
    fn new(root: PathBuf) -> Self {
        Self {
            handle: Some(RepositoryHandle::new(root)),
        }
    }

    fn path(&self) -> &Path {
        self.handle
            .as_ref()
            .map(RepositoryHandle::root)
            .unwrap_or_else(|| Path::new(""))
    }

    fn keep(mut self) -> RepositoryHandle {
        match self.handle.take() {
            Some(handle) => handle,
            None => unreachable!("working directory already handed over"),
        }
    }
}

impl Drop for PendingDir {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.remove();
        }
    }
}

/// Total size in bytes of regular files under `root`.
///
/// Entries that cannot be read are ignored; symlinks are not followed.
pub fn measure_tree_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Create a uniquely named directory under `root`.
///
/// `create_dir` fails on an existing path, so two analyses never share a
/// working directory even when they race on the same name.
fn create_work_dir(root: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(root)?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .subsec_nanos();

    for _ in 0..WORK_DIR_ATTEMPTS {
        let seq = WORK_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}{}-{:08x}-{}",
            WORK_DIR_PREFIX,
            std::process::id(),
            nanos,
            seq
        );
        let path = root.join(name);
        match fs::create_dir(&path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "could not allocate a unique working directory",
    ))
}
