//! Acquisition limits and the shape of failed reports.

mod common;

use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use repolens::{AnalysisReport, ErrorKind};
use tempfile::TempDir;

fn assert_failure_shape(report: &AnalysisReport, kind: ErrorKind) {
    assert!(!report.is_success());
    assert!(report.repo_path.is_none());
    assert!(report.error.as_deref().map_or(false, |e| !e.is_empty()));
    assert_eq!(report.error_type, Some(kind));
    assert!(report.chunks_index.is_none());
    assert!(report.structure.is_none());
}

#[tokio::test]
async fn test_disallowed_host_is_rejected_before_fetch() {
    let work = TempDir::new().unwrap();
    let fetcher = Arc::new(FixtureFetcher::new(sample_repo()));
    let analyzer = analyzer(&config_in(&work), fetcher.clone());

    let report = analyzer.analyze("https://gitlab.com/acme/sample").await;

    assert_failure_shape(&report, ErrorKind::Validation);
    assert!(report.error.as_deref().unwrap().contains("gitlab.com"));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    assert_eq!(entries(work.path()), 0);
}

#[tokio::test]
async fn test_malformed_references_are_rejected() {
    let work = TempDir::new().unwrap();
    let fetcher = Arc::new(FixtureFetcher::new(sample_repo()));
    let analyzer = analyzer(&config_in(&work), fetcher.clone());

    for reference in [
        "",
        "github.com/acme/sample",
        "ssh://github.com/acme/sample",
        "https://github.com.evil.io/acme/sample",
        "https://user@evil.io/github.com/acme",
    ] {
        let report = analyzer.analyze(reference).await;
        assert_failure_shape(&report, ErrorKind::Validation);
    }
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    assert_eq!(entries(work.path()), 0);
}

fn add_oversized_blob(dest: &Path) -> std::io::Result<()> {
    // 1.5 MiB against a 1 MB limit
    fs::write(dest.join("blob.bin"), vec![0u8; 3 * 512 * 1024])
}

#[tokio::test]
async fn test_oversized_tree_is_removed() {
    let work = TempDir::new().unwrap();
    let mut config = config_in(&work);
    config.max_repo_size_mb = 1;
    let fetcher = FixtureFetcher::new(sample_repo()).with_hook(add_oversized_blob);
    let analyzer = analyzer(&config, Arc::new(fetcher));

    let report = analyzer.analyze("https://github.com/acme/sample").await;

    assert_failure_shape(&report, ErrorKind::SizeLimit);
    assert!(report.error.as_deref().unwrap().contains("limit of 1MB"));
    assert_eq!(entries(work.path()), 0);
    assert_eq!(report.stats.files_scanned, 0);
}

#[tokio::test]
async fn test_tree_under_limit_is_analyzed() {
    let work = TempDir::new().unwrap();
    let mut config = config_in(&work);
    config.max_repo_size_mb = 2;
    let fetcher = FixtureFetcher::new(sample_repo()).with_hook(add_oversized_blob);
    let analyzer = analyzer(&config, Arc::new(fetcher));

    let report = analyzer.analyze("https://github.com/acme/sample").await;

    assert!(report.is_success(), "unexpected error: {:?}", report.error);
    assert!(report
        .structure
        .as_ref()
        .unwrap()
        .files
        .contains(&"blob.bin".to_string()));
}

#[tokio::test]
async fn test_missing_fixture_is_a_fetch_error() {
    let work = TempDir::new().unwrap();
    let fetcher = FixtureFetcher::new(testdata_path().join("no_such_repo"));
    let analyzer = analyzer(&config_in(&work), Arc::new(fetcher));

    let report = analyzer.analyze("https://github.com/acme/sample").await;

    assert_failure_shape(&report, ErrorKind::Fetch);
    assert_eq!(entries(work.path()), 0);
}

#[tokio::test]
async fn test_failure_json_shape() {
    let work = TempDir::new().unwrap();
    let analyzer = analyzer(
        &config_in(&work),
        Arc::new(FixtureFetcher::new(sample_repo())),
    );

    let report = analyzer.analyze("https://gitlab.com/acme/sample").await;
    let json: serde_json::Value =
        serde_json::from_str(&repolens::report::to_json(&report).unwrap()).unwrap();

    assert!(json["repo_path"].is_null());
    assert_eq!(json["error_type"], "validation_error");
    assert!(!json["error"].as_str().unwrap().is_empty());
    assert!(json.get("chunks_index").is_none());
    assert!(json.get("structure").is_none());
    assert_eq!(json["stats"]["errors"][0]["error_type"], "validation_error");
}
