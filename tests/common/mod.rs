//! Shared fakes for integration tests.

#![allow(dead_code)]

use futures::future::BoxFuture;
use futures::FutureExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use repolens::error::{EmbedError, StoreError};
use repolens::index::{ChunkMetadata, DisabledEmbedder};
use repolens::{Analyzer, Config, Embedder, Fetcher, ParserService, VectorStore};
use tempfile::TempDir;
use walkdir::WalkDir;

pub fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

pub fn sample_repo() -> PathBuf {
    testdata_path().join("sample_repo")
}

/// Copies a fixture tree into the destination, then runs an optional hook
/// against the copy.
pub struct FixtureFetcher {
    source: PathBuf,
    hook: Option<fn(&Path) -> std::io::Result<()>>,
    pub calls: AtomicUsize,
}

impl FixtureFetcher {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            hook: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_hook(mut self, hook: fn(&Path) -> std::io::Result<()>) -> Self {
        self.hook = Some(hook);
        self
    }
}

impl Fetcher for FixtureFetcher {
    fn fetch<'a>(&'a self, _url: &'a str, dest: &'a Path) -> BoxFuture<'a, anyhow::Result<()>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            for entry in WalkDir::new(&self.source) {
                let entry = entry?;
                let rel = entry.path().strip_prefix(&self.source)?;
                let target = dest.join(rel);
                if entry.file_type().is_dir() {
                    fs::create_dir_all(&target)?;
                } else {
                    fs::copy(entry.path(), &target)?;
                }
            }
            if let Some(hook) = self.hook {
                hook(dest)?;
            }
            Ok::<_, anyhow::Error>(())
        }
        .boxed()
    }
}

/// Returns a fixed three-dimensional vector for every input.
pub struct FakeEmbedder {
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl Embedder for FakeEmbedder {
    fn embed<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, EmbedError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(Ok(vec![0.1, 0.2, 0.3])).boxed()
    }
}

/// Fails every request.
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, EmbedError>> {
        futures::future::ready(Err(EmbedError::BadResponse("HTTP 503".to_string()))).boxed()
    }
}

/// Counts stored chunks.
pub struct CountingStore {
    pub stored: AtomicUsize,
}

impl VectorStore for CountingStore {
    fn store<'a>(
        &'a self,
        _text: &'a str,
        _metadata: &'a ChunkMetadata,
        _vector: &'a [f32],
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        self.stored.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(Ok(())).boxed()
    }
}

pub fn config_in(work: &TempDir) -> Config {
    Config {
        work_dir: Some(work.path().to_path_buf()),
        ..Config::default()
    }
}

pub fn analyzer(config: &Config, fetcher: Arc<dyn Fetcher>) -> Analyzer {
    analyzer_with(config, fetcher, Arc::new(DisabledEmbedder), None)
}

pub fn analyzer_with(
    config: &Config,
    fetcher: Arc<dyn Fetcher>,
    embedder: Arc<dyn Embedder>,
    store: Option<Arc<dyn VectorStore>>,
) -> Analyzer {
    let parser = ParserService::new(&config.parser).expect("parser should initialize");
    Analyzer::new(config, fetcher, parser, embedder, store).expect("analyzer should build")
}

/// Number of entries left under a work directory.
pub fn entries(dir: &Path) -> usize {
    fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
