//! Analysis report data model and output formatting.
//!
//! Supports two output formats:
//! - Pretty: colored terminal summary
//! - JSON: the full report for programmatic consumption

use colored::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;

use crate::error::ErrorKind;
use crate::extract::{CiInfo, ComponentTag, DependencyInfo, FrameworkInfo};
use crate::index::{ChunkKind, ChunkSummary};
use crate::parser::EngineTag;

/// One entry of `stats.errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub error: String,
    pub error_type: ErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

/// Running counters for one analysis. Counters only increase, and
/// `files_scanned >= files_parsed >= files_embedded` holds at every step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisStats {
    pub files_scanned: usize,
    pub files_parsed: usize,
    /// Source files whose code chunk was embedded.
    pub files_embedded: usize,
    /// All embedded chunks, documentation paragraphs included.
    pub chunks_embedded: usize,
    pub parse_engines_used: BTreeMap<String, usize>,
    pub skipped_files: Vec<SkippedFile>,
    pub errors: Vec<ErrorRecord>,
}

impl AnalysisStats {
    pub fn record_parse(&mut self, engine: EngineTag) {
        self.files_parsed += 1;
        *self
            .parse_engines_used
            .entry(engine.as_str().to_string())
            .or_insert(0) += 1;
    }

    pub fn record_embedding(&mut self, kind: ChunkKind) {
        self.chunks_embedded += 1;
        if kind == ChunkKind::CodeFile {
            self.files_embedded += 1;
        }
    }

    pub fn record_error(&mut self, file: Option<&str>, error: impl Display, kind: ErrorKind) {
        self.errors.push(ErrorRecord {
            file: file.map(str::to_string),
            error: error.to_string(),
            error_type: kind,
        });
    }

    pub fn record_skip(&mut self, file: &str, reason: impl Into<String>) {
        self.skipped_files.push(SkippedFile {
            file: file.to_string(),
            reason: reason.into(),
        });
    }

    pub fn errors_of(&self, kind: ErrorKind) -> impl Iterator<Item = &ErrorRecord> {
        self.errors.iter().filter(move |e| e.error_type == kind)
    }
}

/// Layout of the fetched tree. Paths are relative to `root`, `/`-separated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepoStructure {
    pub root: String,
    pub folders: Vec<String>,
    pub files: Vec<String>,
    pub entry_points: Vec<String>,
}

/// Files per component tag. Lists overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComponentSummary {
    pub apis: Vec<String>,
    pub database_models: Vec<String>,
    pub frontend_modules: Vec<String>,
    pub backend_modules: Vec<String>,
    pub entry_points: Vec<String>,
}

impl ComponentSummary {
    pub fn record(&mut self, path: &str, tags: &[ComponentTag]) {
        for tag in tags {
            let list = match tag {
                ComponentTag::ApiSurface => &mut self.apis,
                ComponentTag::DataModel => &mut self.database_models,
                ComponentTag::FrontendModule => &mut self.frontend_modules,
                ComponentTag::BackendModule => &mut self.backend_modules,
                ComponentTag::EntryPoint => &mut self.entry_points,
            };
            list.push(path.to_string());
        }
    }
}

/// The single structured result of an analysis.
///
/// A failed analysis carries `error` and `error_type`, has `repo_path` set to
/// null, and leaves the structural sections out.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub reference: String,
    pub repo_path: Option<String>,
    pub stats: AnalysisStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<RepoStructure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<ComponentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<DependencyInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frameworks: Option<FrameworkInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci: Option<CiInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_index: Option<Vec<ChunkSummary>>,
    pub vector_store_enabled: bool,
    pub cancelled: bool,
    pub processing_time_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorKind>,
}

impl AnalysisReport {
    /// Build the total-failure shape. A record of the failure is appended to
    /// `stats.errors`.
    pub fn failed(
        reference: &str,
        mut stats: AnalysisStats,
        vector_store_enabled: bool,
        processing_time_seconds: f64,
        error: impl Display,
        kind: ErrorKind,
    ) -> Self {
        let mut message = error.to_string();
        if message.is_empty() {
            message = kind.as_str().to_string();
        }
        stats.record_error(None, &message, kind);

        Self {
            reference: reference.to_string(),
            repo_path: None,
            stats,
            structure: None,
            components: None,
            dependencies: None,
            frameworks: None,
            ci: None,
            chunks_index: None,
            vector_store_enabled,
            cancelled: false,
            processing_time_seconds,
            error: Some(message),
            error_type: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn chunks(&self) -> &[ChunkSummary] {
        self.chunks_index.as_deref().unwrap_or(&[])
    }
}

// =============================================================================
// JSON Format
// =============================================================================

pub fn to_json(report: &AnalysisReport) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Write the full report as JSON to stdout.
pub fn write_json(report: &AnalysisReport) -> anyhow::Result<()> {
    println!("{}", to_json(report)?);
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write a colored summary to stdout.
pub fn write_pretty(report: &AnalysisReport) {
    println!();
    print!("  ");
    print!("{}", "repolens".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", "Repository: ".dimmed());
    println!("{}", report.reference);
    if let Some(ref path) = report.repo_path {
        print!("  {}", "Checkout:   ".dimmed());
        println!("{}", path);
    }
    println!();

    if let Some(ref error) = report.error {
        let kind = report.error_type.map(|k| k.as_str()).unwrap_or("error");
        println!("  {} {}", "✗ FAILED".red().bold(), format!("[{}]", kind).dimmed());
        println!("    {}", error);
        println!();
        write_timing(report);
        return;
    }

    write_stats(&report.stats);
    println!();

    if let Some(ref components) = report.components {
        write_components(components);
        println!();
    }

    if let Some(ref frameworks) = report.frameworks {
        write_frameworks(frameworks);
    }
    if let Some(ref ci) = report.ci {
        write_ci(ci);
    }
    println!();

    write_chunks(report.chunks());
    println!();

    if !report.stats.errors.is_empty() {
        write_errors(&report.stats);
        println!();
    }

    if report.cancelled {
        println!("  {}", "⚠ analysis cancelled before the walk completed".yellow());
    } else if report.stats.errors.is_empty() {
        println!("  {}", "✓ DONE".green());
    } else {
        println!(
            "  {}",
            format!("✓ DONE with {} per-file errors", report.stats.errors.len()).yellow()
        );
    }
    write_timing(report);
}

fn write_stats(stats: &AnalysisStats) {
    println!("  {}", "Files".bold());
    println!("    scanned  {}", stats.files_scanned);
    println!("    parsed   {}", stats.files_parsed);
    println!("    embedded {}", stats.files_embedded);
    if !stats.skipped_files.is_empty() {
        println!(
            "    skipped  {}",
            stats.skipped_files.len().to_string().yellow()
        );
    }
    for (engine, count) in &stats.parse_engines_used {
        println!("    {} {}", format!("{}:", engine).dimmed(), count);
    }
}

fn write_components(components: &ComponentSummary) {
    println!("  {}", "Components".bold());
    let sections: [(&str, &Vec<String>); 5] = [
        ("apis", &components.apis),
        ("models", &components.database_models),
        ("backend", &components.backend_modules),
        ("frontend", &components.frontend_modules),
        ("entry points", &components.entry_points),
    ];
    for (label, files) in sections {
        if files.is_empty() {
            continue;
        }
        println!("    {} ({})", label.cyan(), files.len());
        for file in files {
            println!("      {}", file);
        }
    }
}

fn write_frameworks(frameworks: &FrameworkInfo) {
    let all: Vec<&str> = frameworks
        .python_frameworks
        .iter()
        .chain(&frameworks.js_frameworks)
        .chain(&frameworks.java_frameworks)
        .map(String::as_str)
        .collect();
    if !all.is_empty() {
        print!("  {}", "Frameworks: ".dimmed());
        println!("{}", all.join(", "));
    }
}

fn write_ci(ci: &CiInfo) {
    print!("  {}", "Tests:      ".dimmed());
    if ci.has_tests {
        println!("{}", ci.test_paths.join(", ").green());
    } else {
        println!("{}", "none".yellow());
    }
    print!("  {}", "CI:         ".dimmed());
    if ci.ci_files.is_empty() {
        println!("{}", "none".yellow());
    } else {
        println!("{}", ci.ci_files.join(", "));
    }
}

fn write_chunks(chunks: &[ChunkSummary]) {
    let code = chunks.iter().filter(|c| c.kind == ChunkKind::CodeFile).count();
    let docs = chunks.len() - code;
    let embedded = chunks.iter().filter(|c| c.embedded).count();
    println!(
        "  {} {} ({} code, {} doc, {} embedded)",
        "Chunks".bold(),
        chunks.len(),
        code,
        docs,
        embedded
    );
}

fn write_errors(stats: &AnalysisStats) {
    println!("  {}", "Errors".bold());
    for record in &stats.errors {
        let file = record.file.as_deref().unwrap_or("-");
        println!(
            "    {:<18} {} {}",
            record.error_type.as_str().red(),
            file,
            record.error.dimmed()
        );
    }
}

fn write_timing(report: &AnalysisReport) {
    println!(
        "  {}",
        format!("completed in {:.2}s", report.processing_time_seconds).dimmed()
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_counters() {
        let mut stats = AnalysisStats::default();
        stats.files_scanned = 2;
        stats.record_parse(EngineTag::AbstractSyntaxTree);
        stats.record_parse(EngineTag::AbstractSyntaxTree);
        stats.record_embedding(ChunkKind::CodeFile);
        stats.record_embedding(ChunkKind::DocParagraph);

        assert_eq!(stats.files_parsed, 2);
        assert_eq!(stats.files_embedded, 1);
        assert_eq!(stats.chunks_embedded, 2);
        assert_eq!(stats.parse_engines_used["abstract_syntax_tree"], 2);
        assert!(stats.files_scanned >= stats.files_parsed);
        assert!(stats.files_parsed >= stats.files_embedded);
    }

    #[test]
    fn test_component_summary_overlaps() {
        let mut components = ComponentSummary::default();
        components.record(
            "server/main.py",
            &[ComponentTag::ApiSurface, ComponentTag::EntryPoint],
        );
        assert_eq!(components.apis, vec!["server/main.py"]);
        assert_eq!(components.entry_points, vec!["server/main.py"]);
        assert!(components.database_models.is_empty());
    }

    #[test]
    fn test_failed_report_shape() {
        let report = AnalysisReport::failed(
            "https://gitlab.com/acme/sample",
            AnalysisStats::default(),
            false,
            0.01,
            "host not allowed",
            ErrorKind::Validation,
        );
        assert!(!report.is_success());
        assert_eq!(report.stats.errors.len(), 1);
        assert_eq!(report.stats.errors[0].error_type, ErrorKind::Validation);

        let json: serde_json::Value = serde_json::from_str(&to_json(&report).unwrap()).unwrap();
        assert!(json["repo_path"].is_null());
        assert_eq!(json["error"], "host not allowed");
        assert_eq!(json["error_type"], "validation_error");
        assert!(json.get("structure").is_none());
        assert!(json.get("chunks_index").is_none());
        assert_eq!(json["stats"]["errors"][0]["error_type"], "validation_error");
        assert!(json["stats"]["errors"][0].get("file").is_none());
    }

    #[test]
    fn test_failed_report_never_has_empty_error() {
        let report = AnalysisReport::failed(
            "r",
            AnalysisStats::default(),
            false,
            0.0,
            "",
            ErrorKind::Fatal,
        );
        assert_eq!(report.error.as_deref(), Some("fatal_error"));
    }
}
