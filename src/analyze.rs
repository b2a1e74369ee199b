//! Analysis orchestration.
//!
//! ```text
//! Start ─▶ Acquiring ─▶ Walking ─▶ (Parsing ─▶ Classifying ─▶ Chunking)* ─▶ ExtractingMetadata ─▶ Finalizing ─▶ Done
//!              │           │                     │
//!              └───────────┴─────────────────────┴──▶ Failed
//! ```
//!
//! `Done` and `Failed` are terminal. Callers always get an [`AnalysisReport`];
//! acquisition errors, walk failures and panics become the failure shape.

use futures::FutureExt;
use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use std::any::Any;
use std::fs;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::acquire::{Fetcher, GitFetcher, RepositoryHandle, SourceAcquirer};
use crate::config::{Config, SyntaxErrorPolicy};
use crate::error::ErrorKind;
use crate::extract;
use crate::index::{
    ChunkDraft, ChunkIndexer, DisabledEmbedder, Embedder, HttpEmbedder, HttpVectorStore,
    VectorStore,
};
use crate::parser::{ParsedSource, ParserService};
use crate::report::{AnalysisReport, AnalysisStats, ComponentSummary, RepoStructure};

/// Extension of the source files that are parsed.
const SOURCE_EXTENSION: &str = "py";

/// Stops an analysis after the file currently being processed.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs the acquisition and analysis pipeline.
///
/// Collaborators are wired once, here or in [`Analyzer::from_config`], and
/// shared by every analysis the value runs.
pub struct Analyzer {
    acquirer: SourceAcquirer,
    parser: ParserService,
    embedder: Arc<dyn Embedder>,
    store: Option<Arc<dyn VectorStore>>,
    embed_timeout: Duration,
    excluded: GlobSet,
    max_file_bytes: u64,
    parallel_parse: bool,
    retain_checkout: bool,
    cancel: CancellationToken,
}

impl Analyzer {
    /// Build an analyzer with the default collaborators: `git` for fetching,
    /// HTTP for embedding and the vector store when configured.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let parser = ParserService::new(&config.parser)?;
        let fetcher: Arc<dyn Fetcher> = Arc::new(GitFetcher::new(config.git_binary.clone()));
        let client = reqwest::Client::builder()
            .user_agent(concat!("repolens/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let embed_timeout = Duration::from_secs(config.embedding.timeout_secs);
        let embedder: Arc<dyn Embedder> = match &config.embedding.endpoint {
            Some(endpoint) => Arc::new(HttpEmbedder::new(client.clone(), endpoint, embed_timeout)),
            None => Arc::new(DisabledEmbedder),
        };

        let store: Option<Arc<dyn VectorStore>> = if config.vector_store.enabled {
            Some(Arc::new(HttpVectorStore::new(
                client,
                &config.vector_store.url,
                config.vector_store.class_name.clone(),
            )))
        } else {
            None
        };

        Self::new(config, fetcher, parser, embedder, store)
    }

    /// Build an analyzer from explicit collaborators.
    pub fn new(
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        parser: ParserService,
        embedder: Arc<dyn Embedder>,
        store: Option<Arc<dyn VectorStore>>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            acquirer: SourceAcquirer::new(config, fetcher),
            parser,
            embedder,
            store,
            embed_timeout: Duration::from_secs(config.embedding.timeout_secs),
            excluded: build_globset(&config.excluded_paths)?,
            max_file_bytes: config.max_file_bytes,
            parallel_parse: config.parallel_parse,
            retain_checkout: config.retain_checkout,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that cancels analyses run by this analyzer.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn parser(&self) -> &ParserService {
        &self.parser
    }

    /// Analyze a repository reference. Never fails; see [`AnalysisReport`].
    pub async fn analyze(&self, reference: &str) -> AnalysisReport {
        let start = Instant::now();
        let mut run = RunState::default();

        info!(reference, "analysis started");
        let outcome = AssertUnwindSafe(self.run(reference, &mut run))
            .catch_unwind()
            .await;
        let elapsed = start.elapsed().as_secs_f64();
        let vector_store_enabled = self.store.is_some();

        let failure = match outcome {
            Ok(Ok(done)) => {
                let repo_path = run.handle.take().map(|handle| {
                    let path = handle.root().display().to_string();
                    if self.retain_checkout {
                        info!(path = %path, "keeping checkout");
                        handle.into_path();
                    } else {
                        handle.remove();
                    }
                    path
                });

                info!(
                    files_scanned = run.stats.files_scanned,
                    files_parsed = run.stats.files_parsed,
                    chunks = done.chunks.len(),
                    errors = run.stats.errors.len(),
                    cancelled = run.cancelled,
                    "analysis done"
                );

                return AnalysisReport {
                    reference: reference.to_string(),
                    repo_path,
                    stats: run.stats,
                    structure: Some(done.structure),
                    components: Some(done.components),
                    dependencies: Some(done.dependencies),
                    frameworks: Some(done.frameworks),
                    ci: Some(done.ci),
                    chunks_index: Some(done.chunks),
                    vector_store_enabled,
                    cancelled: run.cancelled,
                    processing_time_seconds: elapsed,
                    error: None,
                    error_type: None,
                };
            }
            Ok(Err(failure)) => failure,
            Err(payload) => Failure {
                message: format!("unexpected panic: {}", panic_message(payload.as_ref())),
                kind: ErrorKind::Fatal,
            },
        };

        if let Some(handle) = run.handle.take() {
            handle.remove();
        }
        warn!(error = %failure.message, error_type = %failure.kind, "analysis failed");

        AnalysisReport::failed(
            reference,
            run.stats,
            vector_store_enabled,
            elapsed,
            failure.message,
            failure.kind,
        )
    }

    /// Analyze on a private runtime, for callers outside of async code.
    pub fn analyze_blocking(&self, reference: &str) -> anyhow::Result<AnalysisReport> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(rt.block_on(self.analyze(reference)))
    }

    async fn run(&self, reference: &str, state: &mut RunState) -> Result<Completed, Failure> {
        info!(phase = "acquiring", "phase transition");
        let handle = self.acquirer.acquire(reference).await.map_err(|e| Failure {
            message: e.to_string(),
            kind: e.kind(),
        })?;
        let root = handle.root().to_path_buf();
        state.handle = Some(handle);

        info!(phase = "walking", root = %root.display(), "phase transition");
        let walk = self.walk(&root)?;
        for (rel, reason) in &walk.skipped {
            state.stats.record_skip(rel, *reason);
        }

        let mut components = ComponentSummary::default();
        let mut indexer =
            ChunkIndexer::new(self.embedder.clone(), self.store.clone(), self.embed_timeout);

        let mut preloaded = if self.parallel_parse {
            self.preload(&walk.work)
        } else {
            Vec::new()
        };

        for (i, item) in walk.work.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(remaining = walk.work.len() - i, "analysis cancelled");
                state.cancelled = true;
                break;
            }

            match item.kind {
                WorkKind::Source => {
                    let outcome = preloaded
                        .get_mut(i)
                        .and_then(Option::take)
                        .unwrap_or_else(|| self.load_source(&item.path));
                    self.process_source(item, outcome, state, &mut components, &mut indexer)
                        .await;
                }
                WorkKind::Doc => self.process_doc(item, state, &mut indexer).await,
            }
        }

        info!(phase = "extracting_metadata", "phase transition");
        let (dependencies, frameworks) = extract::extract_dependencies(&root);
        let ci = extract::detect_ci(&root);

        info!(phase = "finalizing", "phase transition");
        Ok(Completed {
            structure: walk.structure,
            components,
            dependencies,
            frameworks,
            ci,
            chunks: indexer.into_chunks(),
        })
    }

    /// Walk the tree once, recording its layout and the files to process in
    /// walk order.
    fn walk(&self, root: &Path) -> Result<Walk, Failure> {
        let mut structure = RepoStructure {
            root: root.display().to_string(),
            ..RepoStructure::default()
        };
        let mut work = Vec::new();
        let mut skipped = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_skipped_dir(root, e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(Failure {
                        message: format!("cannot walk {}: {}", root.display(), e),
                        kind: ErrorKind::Fatal,
                    })
                }
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }

            let rel = relative_path(root, entry.path());
            if self.excluded.is_match(&rel) {
                continue;
            }

            if entry.file_type().is_dir() {
                structure.folders.push(rel);
                continue;
            }

            let file_type = entry.file_type();
            if !file_type.is_file() {
                let reason = if file_type.is_symlink() {
                    "symbolic link not followed"
                } else {
                    "not a regular file"
                };
                debug!(file = %rel, reason, "skipping entry");
                skipped.push((rel.clone(), reason));
                structure.files.push(rel);
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if extract::is_entry_point(&rel) {
                structure.entry_points.push(rel.clone());
            }

            let kind = if is_source_file(&name) {
                Some(WorkKind::Source)
            } else if crate::index::is_doc_file(&name) {
                Some(WorkKind::Doc)
            } else {
                None
            };
            if let Some(kind) = kind {
                work.push(WorkItem {
                    rel: rel.clone(),
                    path: entry.path().to_path_buf(),
                    kind,
                });
            }
            structure.files.push(rel);
        }

        Ok(Walk {
            structure,
            work,
            skipped,
        })
    }

    fn is_skipped_dir(&self, root: &Path, entry: &DirEntry) -> bool {
        entry.file_type().is_dir()
            && (entry.file_name() == ".git" || self.excluded.is_match(relative_path(root, entry.path())))
    }

    /// Check that `path` is a regular file, without following links.
    /// Returns its size when it is over the per-file limit.
    fn check_file(&self, path: &Path) -> io::Result<Option<u64>> {
        let meta = fs::symlink_metadata(path)?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            ));
        }
        Ok((meta.len() > self.max_file_bytes).then(|| meta.len()))
    }

    /// Parse every source up front on the rayon pool.
    ///
    /// On a multi-threaded runtime the worker hands its other tasks off
    /// while this blocks. Sources reached after cancellation are left as
    /// `None`; the processing loop stops before it needs them.
    fn preload(&self, work: &[WorkItem]) -> Vec<Option<SourceOutcome>> {
        debug!(files = work.len(), "parsing in parallel");
        let parse_all = || {
            work.par_iter()
                .map(|item| match item.kind {
                    WorkKind::Source if !self.cancel.is_cancelled() => {
                        Some(self.load_source(&item.path))
                    }
                    _ => None,
                })
                .collect()
        };
        match Handle::try_current() {
            Ok(rt) if rt.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(parse_all)
            }
            _ => parse_all(),
        }
    }

    fn load_source(&self, path: &Path) -> SourceOutcome {
        match self.check_file(path) {
            Ok(None) => {}
            Ok(Some(size)) => return SourceOutcome::TooLarge(size),
            Err(e) => return SourceOutcome::Failed(e),
        }
        match self.parser.parse_file(path) {
            Ok(parsed) => SourceOutcome::Parsed(Box::new(parsed)),
            Err(e) => SourceOutcome::Failed(e),
        }
    }

    async fn process_source(
        &self,
        item: &WorkItem,
        outcome: SourceOutcome,
        state: &mut RunState,
        components: &mut ComponentSummary,
        indexer: &mut ChunkIndexer,
    ) {
        let stats = &mut state.stats;
        stats.files_scanned += 1;

        let parsed = match outcome {
            SourceOutcome::Parsed(parsed) => parsed,
            SourceOutcome::TooLarge(size) => {
                debug!(file = %item.rel, size, "skipping large file");
                stats.record_skip(
                    &item.rel,
                    format!("file size {} exceeds limit of {} bytes", size, self.max_file_bytes),
                );
                return;
            }
            SourceOutcome::Failed(e) => {
                warn!(file = %item.rel, error = %e, "failed to read source file");
                stats.record_error(Some(item.rel.as_str()), e, ErrorKind::Processing);
                return;
            }
        };

        let engine = parsed.engine();
        stats.record_parse(engine);
        if let Some(err) = &parsed.syntax_error {
            debug!(file = %item.rel, error = %err, "syntax error, using empty tree");
            if self.parser.syntax_error_policy() == SyntaxErrorPolicy::Record {
                stats.record_error(Some(item.rel.as_str()), err, ErrorKind::Syntax);
            }
        }

        components.record(&item.rel, &extract::classify(&item.rel, &parsed.text));

        let draft = ChunkDraft::code_file(&item.rel, &parsed.text, parsed.line_count(), engine);
        indexer.add_chunk(stats, draft).await;
    }

    async fn process_doc(&self, item: &WorkItem, state: &mut RunState, indexer: &mut ChunkIndexer) {
        let read = match self.check_file(&item.path) {
            Ok(None) => fs::read(&item.path),
            Ok(Some(size)) => {
                debug!(file = %item.rel, size, "skipping large documentation file");
                state.stats.record_skip(
                    &item.rel,
                    format!("file size {} exceeds limit of {} bytes", size, self.max_file_bytes),
                );
                return;
            }
            Err(e) => Err(e),
        };
        let text = match read {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(file = %item.rel, error = %e, "failed to read documentation file");
                state
                    .stats
                    .record_error(Some(item.rel.as_str()), e, ErrorKind::DocChunk);
                return;
            }
        };

        for paragraph in crate::index::split_paragraphs(&text) {
            indexer
                .add_chunk(
                    &mut state.stats,
                    ChunkDraft::doc_paragraph(&item.rel, &paragraph),
                )
                .await;
        }
    }
}

/// State that outlives a panicking pipeline, so the failure report keeps
/// partial stats and the working directory can still be removed.
#[derive(Default)]
struct RunState {
    stats: AnalysisStats,
    handle: Option<RepositoryHandle>,
    cancelled: bool,
}

struct Completed {
    structure: RepoStructure,
    components: ComponentSummary,
    dependencies: extract::DependencyInfo,
    frameworks: extract::FrameworkInfo,
    ci: extract::CiInfo,
    chunks: Vec<crate::index::ChunkSummary>,
}

struct Failure {
    message: String,
    kind: ErrorKind,
}

struct Walk {
    structure: RepoStructure,
    work: Vec<WorkItem>,
    /// Entries listed in the structure but never read, with the reason.
    skipped: Vec<(String, &'static str)>,
}

struct WorkItem {
    rel: String,
    path: PathBuf,
    kind: WorkKind,
}

#[derive(Clone, Copy)]
enum WorkKind {
    Source,
    Doc,
}

enum SourceOutcome {
    Parsed(Box<ParsedSource>),
    TooLarge(u64),
    Failed(io::Error),
}

fn is_source_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext == SOURCE_EXTENSION)
        .unwrap_or(false)
}

/// `/`-separated path of `path` relative to `root`.
fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid excluded_paths pattern {:?}: {}", pattern, e))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
