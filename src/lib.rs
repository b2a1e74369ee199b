//! Repolens - repository acquisition and code-analysis pipeline.
//!
//! Repolens fetches a remote repository into a bounded working directory,
//! parses its Python sources with a resilient two-engine parser, classifies
//! files into architectural components, extracts dependency and CI metadata,
//! and emits an index of chunks (optionally embedded into a vector store).
//!
//! # Architecture
//!
//! - `acquire`: host allow-list, bounded fetch, size limit, working directories
//! - `parser`: concrete-syntax-tree engine (feature `tree-sitter`) with a
//!   built-in fallback engine
//! - `extract`: component classification, manifests, CI detection
//! - `index`: chunk construction, embedding and storage collaborators
//! - `analyze`: the orchestrator tying the phases together
//! - `report`: the analysis report and its output formats
//!
//! Every analysis ends in an [`AnalysisReport`]; failures are reported in
//! its `error` / `error_type` fields rather than returned as `Err`.

pub mod acquire;
pub mod analyze;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod index;
pub mod parser;
pub mod report;

pub use acquire::{Fetcher, GitFetcher, RepositoryHandle, SourceAcquirer};
pub use analyze::{Analyzer, CancellationToken};
pub use config::Config;
pub use error::ErrorKind;
pub use index::{ChunkKind, ChunkSummary, Embedder, VectorStore};
pub use parser::{EngineTag, ParserService, SyntaxTree};
pub use report::{AnalysisReport, AnalysisStats};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` when `verbose`.
/// Output goes to stderr so JSON reports on stdout stay clean. Calling this
/// twice is harmless.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
