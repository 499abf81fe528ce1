//! CLI binary for validating and inspecting Sluice pipeline configurations.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use sluice_config::{loader, PipelineConfig, StorageConfig};
use sluice_types::{ConfigError, ValidationReport};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sluice", version, about = "Validate data pipeline configurations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a pipeline configuration file
    Validate {
        /// Path to the YAML or JSON configuration
        config: PathBuf,

        /// Print the violation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a summary of a pipeline configuration
    Info {
        /// Path to the YAML or JSON configuration
        config: PathBuf,
    },

    /// Show which jobs depend on which, and the execution order
    Graph {
        /// Path to the YAML or JSON configuration
        config: PathBuf,
    },

    /// Print the canonical form of a configuration
    Normalize {
        /// Path to the YAML or JSON configuration
        config: PathBuf,

        /// Output document format
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        to: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing; RUST_LOG wins over --verbose when set
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { config, json } => cmd_validate(&config, json)?,
        Commands::Info { config } => cmd_info(&config)?,
        Commands::Graph { config } => cmd_graph(&config)?,
        Commands::Normalize { config, to } => cmd_normalize(&config, to)?,
    }

    Ok(())
}

/// Load and validate, printing the report and exiting with status 1 when the
/// configuration is invalid. Parse and I/O failures propagate as errors.
fn load_pipeline(path: &Path) -> anyhow::Result<PipelineConfig> {
    let document = loader::load_file(path)?;
    match PipelineConfig::from_value(&document) {
        Ok(config) => Ok(config),
        Err(ConfigError::Invalid(report)) => {
            for line in render_report(&report) {
                eprintln!("{line}");
            }
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn render_report(report: &ValidationReport) -> Vec<String> {
    report
        .iter()
        .map(|v| format!("[{}] {}: {}", v.kind, v.path, v.message))
        .collect()
}

fn cmd_validate(path: &Path, json: bool) -> anyhow::Result<()> {
    tracing::debug!(path = %path.display(), json, "Validating configuration");
    let document = loader::load_file(path)?;
    let report = match PipelineConfig::from_value(&document) {
        Ok(_) => ValidationReport::new(),
        Err(ConfigError::Invalid(report)) => report,
        Err(e) => return Err(e.into()),
    };

    if json {
        let out = serde_json::json!({
            "valid": report.is_empty(),
            "violations": report.violations(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if report.is_empty() {
        println!("OK");
    } else {
        for line in render_report(&report) {
            println!("{line}");
        }
    }

    if !report.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn describe_storage(storage: &StorageConfig) -> String {
    match storage {
        StorageConfig::Local { base_path } => format!("local ({base_path})"),
        StorageConfig::S3 {
            bucket,
            region,
            prefix,
        } => match prefix {
            Some(prefix) => format!("s3 (s3://{bucket}/{prefix}, {region})"),
            None => format!("s3 (s3://{bucket}, {region})"),
        },
        StorageConfig::AzureBlob { account, container } => {
            format!("azure ({account}/{container})")
        }
    }
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let config = load_pipeline(path)?;

    println!("Pipeline: {}", config.name());
    if let Some(description) = config.description() {
        println!("Description: {description}");
    }
    println!("Storage: {}", describe_storage(config.storage()));
    println!("Max parallel: {}", config.max_parallel());
    println!("Retry attempts: {}", config.retry_attempts());
    if let Some(logging) = config.logging() {
        println!("Log level: {}", logging.level.as_filter());
    }

    println!("\nJobs ({}):", config.jobs().len());
    for job in config.jobs() {
        let mut stages = Vec::new();
        if job.read.is_some() {
            stages.push("read");
        }
        if let Some(transform) = &job.transform {
            stages.push(if transform.steps.len() == 1 { "transform" } else { "transforms" });
        }
        if job.write.is_some() {
            stages.push("write");
        }
        let status = if job.enabled { "" } else { " (disabled)" };
        println!("  {} [{}]{}", job.name, stages.join(", "), status);
        if !job.depends_on.is_empty() {
            println!("    depends on: {}", job.depends_on.join(", "));
        }
    }

    Ok(())
}

fn cmd_graph(path: &Path) -> anyhow::Result<()> {
    let config = load_pipeline(path)?;
    let graph = config.dependency_graph();

    println!("Dependencies:");
    for job in graph.names() {
        let deps = graph.dependencies_of(job);
        if deps.is_empty() {
            println!("  {job} <- (none)");
        } else {
            println!("  {job} <- {}", deps.join(", "));
        }
    }

    println!("\nDependents:");
    for (job, dependents) in config.build_dependency_graph() {
        if dependents.is_empty() {
            println!("  {job} -> (none)");
        } else {
            println!("  {job} -> {}", dependents.join(", "));
        }
    }

    println!("\nExecution layers:");
    for (i, layer) in config.execution_layers().iter().enumerate() {
        println!("  {}: {}", i + 1, layer.join(", "));
    }

    Ok(())
}

fn cmd_normalize(path: &Path, to: OutputFormat) -> anyhow::Result<()> {
    let config = load_pipeline(path)?;
    let rendered = match to {
        OutputFormat::Yaml => serde_yaml::to_string(&config)?,
        OutputFormat::Json => serde_json::to_string_pretty(&config)? + "\n",
    };
    print!("{rendered}");
    Ok(())
}
