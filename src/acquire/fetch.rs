//! Fetch primitives.
//!
//! The acquirer treats a fetch as an opaque operation it must time-box
//! itself. Implementations must not retain the URL they are given: it may
//! carry a credential.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Fetches a repository into an existing, empty directory.
pub trait Fetcher: Send + Sync {
    /// Fetch `url` into `dest`.
    ///
    /// Dropping the returned future must abandon the fetch.
    fn fetch<'a>(&'a self, url: &'a str, dest: &'a Path) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Shallow `git clone` run as a child process.
///
/// The child is killed when the fetch future is dropped, so an elapsed
/// timeout does not leave a clone running in the background.
pub struct GitFetcher {
    binary: String,
}

impl GitFetcher {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new("git")
    }
}

impl Fetcher for GitFetcher {
    fn fetch<'a>(&'a self, url: &'a str, dest: &'a Path) -> BoxFuture<'a, anyhow::Result<()>> {
        async move {
            let output = Command::new(&self.binary)
                .args(["clone", "--depth", "1", "--quiet", "--", url])
                .arg(dest)
                .env("GIT_TERMINAL_PROMPT", "0")
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| anyhow::anyhow!("cannot run {}: {}", self.binary, e))?;

            if output.status.success() {
                Ok(())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                anyhow::bail!("git clone exited with {}: {}", output.status, stderr.trim())
            }
        }
        .boxed()
    }
}
