//! Configuration schema for repolens.
//!
//! Configuration is read once at startup: a YAML file (optional), then
//! environment overrides, then [`validate`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Hosts repositories may be fetched from.
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
    /// Maximum on-disk size of a fetched tree, in megabytes.
    #[serde(default = "default_max_repo_size_mb")]
    pub max_repo_size_mb: u64,
    /// Fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Optional access token injected into fetch URLs for `credential_host`.
    #[serde(default)]
    pub credential: Option<Credential>,
    /// Host the credential is valid for.
    #[serde(default = "default_credential_host")]
    pub credential_host: String,
    /// Directory under which working directories are created (default: system temp dir).
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// Name or path of the git executable.
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
    /// Keep the fetched tree on disk after a successful analysis.
    #[serde(default)]
    pub retain_checkout: bool,
    /// Glob patterns for paths to skip during the tree walk (e.g., "**/vendor/**")
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    /// Source files larger than this are skipped without parsing.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Parse source files on a thread pool before emitting chunks.
    #[serde(default)]
    pub parallel_parse: bool,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allowed_hosts: default_allowed_hosts(),
            max_repo_size_mb: default_max_repo_size_mb(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            credential: None,
            credential_host: default_credential_host(),
            work_dir: None,
            git_binary: default_git_binary(),
            retain_checkout: false,
            excluded_paths: Vec::new(),
            max_file_bytes: default_max_file_bytes(),
            parallel_parse: false,
            parser: ParserConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
        }
    }
}

impl Config {
    /// Parse a configuration from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(hosts) = lookup("ALLOWED_HOSTS") {
            self.allowed_hosts = hosts
                .split(',')
                .map(|h| h.trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect();
        }
        if let Some(v) = lookup("MAX_REPO_SIZE_MB") {
            self.max_repo_size_mb = parse_env("MAX_REPO_SIZE_MB", &v)?;
        }
        if let Some(v) = lookup("CLONE_TIMEOUT_SECONDS") {
            self.fetch_timeout_secs = parse_env("CLONE_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(token) = lookup("GITHUB_TOKEN") {
            if !token.trim().is_empty() {
                self.credential = Some(Credential::new(token.trim()));
            }
        }
        if let Some(url) = lookup("EMBEDDING_URL") {
            self.embedding.endpoint = Some(url);
        }
        if let Some(v) = lookup("EMBED_TIMEOUT_SECONDS") {
            self.embedding.timeout_secs = parse_env("EMBED_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = lookup("ENABLE_VECTOR_STORE") {
            self.vector_store.enabled = v.trim().eq_ignore_ascii_case("true");
        }
        if let Some(url) = lookup("VECTOR_STORE_URL") {
            self.vector_store.url = url;
        }
        Ok(())
    }

    /// Size limit in bytes.
    pub fn max_repo_size_bytes(&self) -> u64 {
        self.max_repo_size_mb.saturating_mul(1024 * 1024)
    }

    /// Directory under which working directories are created.
    pub fn work_root(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid value {:?} for {}: {}", value, key, e))
}

fn default_allowed_hosts() -> Vec<String> {
    vec!["github.com".to_string()]
}

fn default_max_repo_size_mb() -> u64 {
    100
}

fn default_fetch_timeout_secs() -> u64 {
    300
}

fn default_credential_host() -> String {
    "github.com".to_string()
}

fn default_git_binary() -> String {
    "git".to_string()
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

fn default_true() -> bool {
    true
}

/// An access token. Redacted in `Debug` output and never serialized back out.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token. Only the fetch URL builder should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl Serialize for Credential {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

/// What to do when the built-in engine hits a syntax error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyntaxErrorPolicy {
    /// Substitute an empty tree and move on.
    #[default]
    Ignore,
    /// Substitute an empty tree and record a `syntax_error` entry.
    Record,
}

/// Resilient parser settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParserConfig {
    /// Try the concrete-syntax-tree engine first when it is compiled in.
    #[serde(default = "default_true")]
    pub concrete_engine: bool,
    #[serde(default)]
    pub syntax_errors: SyntaxErrorPolicy,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            concrete_engine: true,
            syntax_errors: SyntaxErrorPolicy::Ignore,
        }
    }
}

/// Embedding collaborator settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// HTTP endpoint accepting `{"input": text}`. Embedding is disabled when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Per-chunk timeout in seconds (default: 30)
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
}

fn default_embed_timeout() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_embed_timeout(),
        }
    }
}

/// Vector store collaborator settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_vector_store_url")]
    pub url: String,
    /// Object class chunks are stored under.
    #[serde(default = "default_vector_class")]
    pub class_name: String,
}

fn default_vector_store_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_vector_class() -> String {
    "RepoChunk".to_string()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_vector_store_url(),
            class_name: default_vector_class(),
        }
    }
}

/// Validate a configuration for correctness.
pub fn validate(config: &Config) -> anyhow::Result<()> {
    if config.allowed_hosts.is_empty() {
        anyhow::bail!("allowed_hosts must contain at least one host");
    }

    if config.max_repo_size_mb == 0 {
        anyhow::bail!("max_repo_size_mb must be greater than zero");
    }

    if config.fetch_timeout_secs == 0 {
        anyhow::bail!("fetch_timeout_secs must be greater than zero");
    }

    if config.embedding.timeout_secs == 0 {
        anyhow::bail!("embedding.timeout_secs must be greater than zero");
    }

    if config.git_binary.trim().is_empty() {
        anyhow::bail!("git_binary must not be empty");
    }

    for pattern in &config.excluded_paths {
        globset::Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid excluded_paths pattern {:?}: {}", pattern, e))?;
    }

    if let Some(endpoint) = &config.embedding.endpoint {
        url::Url::parse(endpoint)
            .map_err(|e| anyhow::anyhow!("invalid embedding.endpoint {:?}: {}", endpoint, e))?;
    }

    if config.vector_store.enabled {
        if config.embedding.endpoint.is_none() {
            anyhow::bail!("vector_store.enabled requires embedding.endpoint");
        }
        url::Url::parse(&config.vector_store.url).map_err(|e| {
            anyhow::anyhow!("invalid vector_store.url {:?}: {}", config.vector_store.url, e)
        })?;
    }

    Ok(())
}
