//! CI configuration and test directory detection. Presence only.

use serde::Serialize;
use std::fs;
use std::path::Path;

const TEST_DIRS: &[&str] = &["tests", "test", "__tests__"];

const CI_FILES: &[&str] = &[
    ".circleci/config.yml",
    "Jenkinsfile",
    "azure-pipelines.yml",
    ".gitlab-ci.yml",
];

const WORKFLOW_DIR: &str = ".github/workflows";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CiInfo {
    pub has_tests: bool,
    /// Test directories found at the root, relative.
    pub test_paths: Vec<String>,
    /// CI descriptors found, relative and `/`-separated.
    pub ci_files: Vec<String>,
}

pub fn detect_ci(root: &Path) -> CiInfo {
    let test_paths: Vec<String> = TEST_DIRS
        .iter()
        .filter(|dir| root.join(dir).exists())
        .map(|dir| dir.to_string())
        .collect();

    let mut ci_files = Vec::new();
    if let Ok(entries) = fs::read_dir(root.join(WORKFLOW_DIR)) {
        let mut workflows: Vec<String> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| name.ends_with(".yml") || name.ends_with(".yaml"))
            .map(|name| format!("{}/{}", WORKFLOW_DIR, name))
            .collect();
        workflows.sort();
        ci_files.extend(workflows);
    }
    ci_files.extend(
        CI_FILES
            .iter()
            .filter(|file| root.join(file).exists())
            .map(|file| file.to_string()),
    );

    CiInfo {
        has_tests: !test_paths.is_empty(),
        test_paths,
        ci_files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_ci() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join(".github/workflows")).unwrap();
        fs::write(root.join(".github/workflows/test.yaml"), "").unwrap();
        fs::write(root.join(".github/workflows/build.yml"), "").unwrap();
        fs::write(root.join(".github/workflows/README.md"), "").unwrap();
        fs::write(root.join("Jenkinsfile"), "").unwrap();
        fs::create_dir(root.join("tests")).unwrap();

        let ci = detect_ci(root);
        assert!(ci.has_tests);
        assert_eq!(ci.test_paths, vec!["tests"]);
        assert_eq!(
            ci.ci_files,
            vec![
                ".github/workflows/build.yml",
                ".github/workflows/test.yaml",
                "Jenkinsfile"
            ]
        );
    }

    #[test]
    fn test_nothing_detected() {
        let temp = TempDir::new().unwrap();
        assert_eq!(detect_ci(temp.path()), CiInfo::default());
    }
}
