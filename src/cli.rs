//! Command-line interface for repolens.

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analyze::Analyzer;
use crate::config::{self, Config};
use crate::report;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Config file names searched for in the current directory.
const DEFAULT_CONFIG_NAMES: &[&str] = &["repolens.yaml", ".repolens.yaml"];

/// Repository analysis pipeline.
///
/// Fetches a repository from an allowed host, parses and classifies its
/// Python sources, extracts dependency and CI metadata, and reports the
/// resulting chunk index.
#[derive(Parser)]
#[command(name = "repolens")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch and analyze a repository
    Analyze(AnalyzeArgs),
    /// Create a repolens config file from a template
    Init(InitArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
}

/// Arguments for the analyze command.
#[derive(Parser)]
pub struct AnalyzeArgs {
    /// Repository URL (e.g. https://github.com/owner/repo)
    pub reference: String,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    pub format: OutputFormat,

    /// Keep the fetched checkout on disk after a successful analysis
    #[arg(short, long)]
    pub keep: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "repolens.yaml")]
    pub output: PathBuf,

    /// Template to use
    #[arg(short, long, default_value = "default")]
    pub template: String,

    /// List available templates
    #[arg(short, long)]
    pub list: bool,
}

/// Available config templates.
struct Template {
    name: &'static str,
    description: &'static str,
    content: &'static str,
}

static TEMPLATES: &[Template] = &[
    Template {
        name: "default",
        description: "Every setting with its default value",
        content: include_str!("templates/default.yaml"),
    },
    Template {
        name: "minimal",
        description: "Host allow-list and size limits only",
        content: include_str!("templates/minimal.yaml"),
    },
    Template {
        name: "indexing",
        description: "Embedding endpoint and vector store enabled",
        content: include_str!("templates/indexing.yaml"),
    },
];

/// Find the config file to load, if any.
///
/// An explicit path must exist; otherwise the current directory and then
/// the platform config directory are searched.
pub fn discover_config(explicit: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    for name in DEFAULT_CONFIG_NAMES {
        let path = PathBuf::from(name);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    if let Some(dirs) = ProjectDirs::from("", "", "repolens") {
        let path = dirs.config_dir().join("config.yaml");
        if path.exists() {
            return Ok(Some(path));
        }
    }

    Ok(None)
}

/// Load, override from the environment, and validate.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = match discover_config(explicit)? {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            Config::parse_file(&path)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", path.display(), e))?
        }
        None => Config::default(),
    };
    config.apply_env()?;
    config::validate(&config)?;
    Ok(config)
}

/// Run the analyze command.
pub fn run_analyze(args: &AnalyzeArgs) -> anyhow::Result<i32> {
    crate::init_tracing(args.verbose);

    let mut config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: invalid configuration: {}", e);
            eprintln!("Run 'repolens init' to create a config file");
            return Ok(EXIT_ERROR);
        }
    };
    if args.keep {
        config.retain_checkout = true;
    }

    let analyzer = Analyzer::from_config(&config)?;

    let spinner = match args.format {
        OutputFormat::Pretty => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {msg} [{elapsed}]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message(format!("Analyzing {}", args.reference));
            pb.enable_steady_tick(Duration::from_millis(100));
            Some(pb)
        }
        OutputFormat::Json => None,
    };

    let result = analyzer.analyze_blocking(&args.reference);
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let analysis = result?;

    match args.format {
        OutputFormat::Json => report::write_json(&analysis)?,
        OutputFormat::Pretty => report::write_pretty(&analysis),
    }

    if analysis.is_success() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILED)
    }
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    if args.list {
        return list_templates();
    }

    let template = match TEMPLATES.iter().find(|t| t.name == args.template) {
        Some(t) => t,
        None => {
            eprintln!("Error: unknown template {:?}", args.template);
            eprintln!("Run 'repolens init --list' to see available templates");
            return Ok(EXIT_ERROR);
        }
    };

    if args.output.exists() {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Remove it or use --output to specify a different path");
        return Ok(EXIT_ERROR);
    }

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error: failed to create directory: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    if let Err(e) = std::fs::write(&args.output, template.content) {
        eprintln!("Error: failed to write config: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {} from template '{}'", args.output.display(), template.name);
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to set allowed hosts and limits", args.output.display());
    println!(
        "  2. Run: repolens analyze https://github.com/<owner>/<repo> --config {}",
        args.output.display()
    );

    Ok(EXIT_SUCCESS)
}

fn list_templates() -> anyhow::Result<i32> {
    println!("Available templates:");
    println!();

    for template in TEMPLATES {
        let name = if template.name == "default" {
            format!("{} (default)", template.name)
        } else {
            template.name.to_string()
        };
        println!("  {:<20} {}", name, template.description);
    }

    println!();
    println!("Usage:");
    println!("  repolens init --template <name>");

    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_templates_parse_and_validate() {
        for template in TEMPLATES {
            let config: Config = serde_yaml::from_str(template.content)
                .unwrap_or_else(|e| panic!("template {} does not parse: {}", template.name, e));
            config::validate(&config)
                .unwrap_or_else(|e| panic!("template {} is invalid: {}", template.name, e));
        }
    }

    #[test]
    fn test_init_writes_template_once() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("conf/repolens.yaml");
        let args = InitArgs {
            output: output.clone(),
            template: "minimal".to_string(),
            list: false,
        };

        assert_eq!(run_init(&args).unwrap(), EXIT_SUCCESS);
        assert!(output.exists());
        assert!(Config::parse_file(&output).is_ok());

        // refuses to overwrite
        assert_eq!(run_init(&args).unwrap(), EXIT_ERROR);
    }

    #[test]
    fn test_init_unknown_template() {
        let temp = TempDir::new().unwrap();
        let args = InitArgs {
            output: temp.path().join("repolens.yaml"),
            template: "nope".to_string(),
            list: false,
        };
        assert_eq!(run_init(&args).unwrap(), EXIT_ERROR);
        assert!(!args.output.exists());
    }

    #[test]
    fn test_discover_explicit_missing() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("absent.yaml");
        assert!(discover_config(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_config_rejects_invalid_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yaml");
        std::fs::write(&path, "allowed_hosts: []\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_cli_parses_analyze() {
        let cli = Cli::try_parse_from([
            "repolens",
            "analyze",
            "https://github.com/acme/app",
            "--format",
            "json",
            "--keep",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.reference, "https://github.com/acme/app");
                assert_eq!(args.format, OutputFormat::Json);
                assert!(args.keep);
                assert!(!args.verbose);
            }
            Commands::Init(_) => panic!("expected analyze"),
        }
    }
}
