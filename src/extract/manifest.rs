//! Dependency and framework extraction from well-known manifest files.
//!
//! Parses, when present at the repository root:
//! - requirements.txt
//! - pyproject.toml (PEP 621 and Poetry dependency tables)
//! - package.json (dependencies and devDependencies)
//! - pom.xml (light regex parse)
//!
//! Every parser fails soft: a missing or malformed manifest yields an empty
//! result and a debug log line.

use lazy_static::lazy_static;
use phf::phf_set;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::debug;

lazy_static! {
    static ref POM_STRIP_RE: Regex = Regex::new(
        r"(?s)<parent>.*?</parent>|<dependencies>.*?</dependencies>|<dependencyManagement>.*?</dependencyManagement>|<build>.*?</build>|<!--.*?-->"
    )
    .unwrap();
    static ref POM_DEPENDENCY_RE: Regex = Regex::new(r"(?s)<dependency>(.*?)</dependency>").unwrap();
    static ref POM_GROUP_RE: Regex = Regex::new(r"<groupId>\s*([^<]+?)\s*</groupId>").unwrap();
    static ref POM_ARTIFACT_RE: Regex = Regex::new(r"<artifactId>\s*([^<]+?)\s*</artifactId>").unwrap();
}

static PYTHON_FRAMEWORKS: &[&str] = &["fastapi", "flask", "django", "sqlalchemy"];

static JS_FRAMEWORKS: phf::Set<&'static str> = phf_set! {
    "react",
    "vue",
    "next",
    "nuxt",
    "angular",
    "@angular/core",
    "express",
    "koa",
    "hapi",
};

/// Declared dependencies, per manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DependencyInfo {
    /// Non-blank, non-comment lines of requirements.txt, trimmed.
    pub requirements: Vec<String>,
    /// Package names declared in pyproject.toml.
    pub pyproject: Vec<String>,
    /// The parsed package.json object.
    pub package_json: Map<String, Value>,
    pub pom_xml: PomInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PomInfo {
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    /// `groupId:artifactId` of each declared dependency.
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameworkInfo {
    pub python_frameworks: Vec<String>,
    pub js_frameworks: Vec<String>,
    pub java_frameworks: Vec<String>,
}

/// Read the manifests under `root`.
pub fn extract_dependencies(root: &Path) -> (DependencyInfo, FrameworkInfo) {
    let mut deps = DependencyInfo::default();
    let mut frameworks = FrameworkInfo::default();

    if let Some(content) = read_lossy(&root.join("requirements.txt")) {
        deps.requirements = parse_requirements(&content);
    }
    if let Some(content) = read_lossy(&root.join("pyproject.toml")) {
        deps.pyproject = parse_pyproject(&content);
    }

    let python_names = deps
        .requirements
        .iter()
        .map(|req| extract_package_name(req))
        .chain(deps.pyproject.iter().cloned());
    for name in python_names {
        let lower = name.to_lowercase();
        if PYTHON_FRAMEWORKS.iter().any(|fw| lower.contains(fw))
            && !frameworks.python_frameworks.contains(&lower)
        {
            frameworks.python_frameworks.push(lower);
        }
    }

    if let Some(content) = read_lossy(&root.join("package.json")) {
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => {
                frameworks.js_frameworks = js_frameworks(&map);
                deps.package_json = map;
            }
            Ok(_) => debug!("package.json is not an object, ignoring"),
            Err(e) => debug!(error = %e, "malformed package.json, ignoring"),
        }
    }

    if let Some(content) = read_lossy(&root.join("pom.xml")) {
        deps.pom_xml = parse_pom(&content);
        if content.to_lowercase().contains("spring-boot") {
            frameworks.java_frameworks.push("spring-boot".to_string());
        }
    }

    (deps, frameworks)
}

/// Read a manifest. Links and other non-regular files are ignored.
fn read_lossy(path: &Path) -> Option<String> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => {
            debug!(path = %path.display(), "manifest is not a regular file, ignoring");
            return None;
        }
        Err(_) => return None,
    }
    match fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cannot read manifest");
            None
        }
    }
}

/// Extract the package name from a requirement specifier.
///
/// `requests>=2.0` → `requests`, `uvicorn[standard]==0.23` → `uvicorn`.
pub fn extract_package_name(req: &str) -> String {
    req.split(|c| matches!(c, '=' | '>' | '<' | '~' | '!' | '[' | ';' | ' ' | '@'))
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

pub fn parse_requirements(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Package names from `dependencies = [...]`, `[project.dependencies]` and
/// `[tool.poetry.dependencies]`. The `python` version constraint is skipped.
pub fn parse_pyproject(content: &str) -> Vec<String> {
    let mut packages = Vec::new();
    let mut in_deps = false;
    let mut bracket_depth = 0usize;
    // open brackets/braces of a multi-line value in table form
    let mut value_depth = 0usize;

    for line in content.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("[project.dependencies]")
            || trimmed.starts_with("[tool.poetry.dependencies]")
            || trimmed.starts_with("[tool.poetry.dev-dependencies]")
        {
            in_deps = true;
            bracket_depth = 0;
            value_depth = 0;
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("dependencies") {
            if let Some(value) = rest.trim_start().strip_prefix('=') {
                let value = value.trim();
                if value.starts_with('[') {
                    in_deps = true;
                    bracket_depth = value
                        .matches('[')
                        .count()
                        .saturating_sub(value.matches(']').count());
                    push_array_items(value, &mut packages);
                    if bracket_depth == 0 {
                        in_deps = false;
                    }
                    continue;
                }
            }
        }

        if trimmed.starts_with('[') && bracket_depth == 0 && value_depth == 0 {
            in_deps = false;
            continue;
        }

        if !in_deps || trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if bracket_depth > 0 {
            push_array_items(trimmed, &mut packages);
            bracket_depth += trimmed.matches('[').count();
            bracket_depth = bracket_depth.saturating_sub(trimmed.matches(']').count());
            if bracket_depth == 0 {
                in_deps = false;
            }
            continue;
        }

        // Table form: name = "^1.0" or name = { version = "^1.0" }
        if value_depth > 0 {
            value_depth = value_nesting(value_depth, trimmed);
            continue;
        }
        let (key, value) = match trimmed.split_once('=') {
            Some(kv) => kv,
            None => continue,
        };
        value_depth = value_nesting(0, value);
        let name = key.trim().trim_matches('"');
        if !name.is_empty() && !name.eq_ignore_ascii_case("python") {
            push_unique(&mut packages, name.to_lowercase());
        }
    }

    packages
}

fn value_nesting(depth: usize, text: &str) -> usize {
    let opens = text.matches(|c| c == '[' || c == '{').count();
    let closes = text.matches(|c| c == ']' || c == '}').count();
    (depth + opens).saturating_sub(closes)
}

fn push_array_items(fragment: &str, packages: &mut Vec<String>) {
    for item in fragment.split(',') {
        let cleaned = item.trim().trim_matches(|c| c == '[' || c == ']' || c == ' ');
        let cleaned = cleaned.trim_matches(|c| c == '"' || c == '\'');
        let name = extract_package_name(cleaned);
        if !name.is_empty() && !name.starts_with('#') {
            push_unique(packages, name.to_lowercase());
        }
    }
}

fn push_unique(packages: &mut Vec<String>, name: String) {
    if !packages.contains(&name) {
        packages.push(name);
    }
}

fn js_frameworks(package_json: &Map<String, Value>) -> Vec<String> {
    let mut found = Vec::new();
    for section in ["dependencies", "devDependencies"] {
        if let Some(Value::Object(deps)) = package_json.get(section) {
            for name in deps.keys() {
                if JS_FRAMEWORKS.contains(name.as_str()) && !found.contains(name) {
                    found.push(name.clone());
                }
            }
        }
    }
    found
}

pub fn parse_pom(content: &str) -> PomInfo {
    let project = POM_STRIP_RE.replace_all(content, "");
    let first = |re: &Regex, text: &str| re.captures(text).map(|c| c[1].to_string());

    let dependencies = POM_DEPENDENCY_RE
        .captures_iter(content)
        .filter_map(|dep| {
            let body = &dep[1];
            let group = first(&POM_GROUP_RE, body)?;
            let artifact = first(&POM_ARTIFACT_RE, body)?;
            Some(format!("{}:{}", group, artifact))
        })
        .collect();

    PomInfo {
        present: true,
        group_id: first(&POM_GROUP_RE, &project),
        artifact_id: first(&POM_ARTIFACT_RE, &project),
        dependencies,
    }
}
