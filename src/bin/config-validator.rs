//! # Legatus Configuration Validator
//!
//! Command-line tool for validating Legatus configuration files across
//! environments before a service embeds the directive engine.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use legatus_core::config::{ConfigManager, LegatusConfig};
use legatus_core::constants::system::CONFIG_FILE_STEM;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate Legatus configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate every configuration section
    All,

    /// Validate one section (logging, directive, unit_of_work)
    Component { name: String },

    /// List environments that have an overlay file
    Environments,

    /// Print the effective configuration as JSON
    Show,

    /// Show settings that differ between two environments
    Compare {
        #[arg(short, long, default_value = "development")]
        base: String,

        #[arg(short, long)]
        target: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all_config(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Environments) => list_environments(&cli),
        Some(Commands::Show) => show_config(&cli),
        Some(Commands::Compare { base, target }) => compare_configs(&cli, base, target),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {e:#}");
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}

fn config_dir(cli: &Cli) -> PathBuf {
    cli.config_dir.clone().unwrap_or_else(|| PathBuf::from("config"))
}

fn load(cli: &Cli, environment: &str) -> Result<LegatusConfig> {
    let manager = ConfigManager::load_from_directory_with_env(Some(config_dir(cli)), environment)
        .with_context(|| format!("loading environment '{environment}'"))?;
    Ok(manager.config().clone())
}

fn validate_all_config(cli: &Cli) -> Result<()> {
    println!("Validating Legatus configuration");
    println!("Environment: {}", cli.environment);
    println!("Config Directory: {}", config_dir(cli).display());
    println!();

    let config = load(cli, &cli.environment)?;
    println!("  ok  configuration loaded and validated");

    validate_logging_config(&config);
    validate_directive_config(&config);
    validate_unit_of_work_config(&config);

    println!("\nAll configuration validation checks passed");
    Ok(())
}

fn validate_component(cli: &Cli, component_name: &str) -> Result<()> {
    let config = load(cli, &cli.environment)?;

    match component_name.to_lowercase().as_str() {
        "logging" => validate_logging_config(&config),
        "directive" => validate_directive_config(&config),
        "unit_of_work" | "unit-of-work" => validate_unit_of_work_config(&config),
        other => bail!("Unknown component: {other}"),
    }

    println!("Component '{component_name}' validation passed");
    Ok(())
}

fn list_environments(cli: &Cli) -> Result<()> {
    let dir = config_dir(cli);
    println!("Environments in {}:", dir.display());

    let mut environments = overlay_environments(&dir)
        .with_context(|| format!("reading {}", dir.display()))?;
    environments.sort();

    if environments.is_empty() {
        println!("  (none; only {CONFIG_FILE_STEM}.toml and defaults apply)");
    }
    for env in environments {
        println!("  - {env}");
    }
    Ok(())
}

fn overlay_environments(dir: &Path) -> Result<Vec<String>> {
    let prefix = format!("{CONFIG_FILE_STEM}.");
    let mut environments = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if let Some(env) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".toml"))
        {
            environments.push(env.to_string());
        }
    }
    Ok(environments)
}

fn show_config(cli: &Cli) -> Result<()> {
    let config = load(cli, &cli.environment)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn compare_configs(cli: &Cli, base: &str, target: &str) -> Result<()> {
    println!("Comparing configurations: {base} vs {target}");

    let base_value = serde_json::to_value(load(cli, base)?)?;
    let target_value = serde_json::to_value(load(cli, target)?)?;

    let mut differences = Vec::new();
    diff_values("", &base_value, &target_value, &mut differences);

    if differences.is_empty() {
        println!("  no differences");
    }
    for (path, left, right) in differences {
        println!("  {path}: {left} -> {right}");
    }
    Ok(())
}

fn diff_values(path: &str, left: &Value, right: &Value, out: &mut Vec<(String, Value, Value)>) {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            let mut keys: Vec<&String> = l.keys().chain(r.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                diff_values(
                    &child,
                    l.get(key).unwrap_or(&Value::Null),
                    r.get(key).unwrap_or(&Value::Null),
                    out,
                );
            }
        }
        _ if left != right => out.push((path.to_string(), left.clone(), right.clone())),
        _ => {}
    }
}

fn validate_logging_config(config: &LegatusConfig) {
    println!("Logging");
    match &config.logging.level {
        Some(level) => println!("  ok  level filter: {level}"),
        None => println!(
            "  ok  level follows environment: {}",
            legatus_core::logging::get_log_level(&config.environment)
        ),
    }
    println!("  ok  format: {}", config.logging.format);
}

fn validate_directive_config(config: &LegatusConfig) {
    let settings = config.directive_settings();
    println!("Directive");
    println!("  ok  required message: {:?}", settings.required_message);
    println!(
        "  ok  nested attributes suffix: {}",
        settings.nested_attributes_suffix
    );
}

fn validate_unit_of_work_config(config: &LegatusConfig) {
    println!("Unit of work");
    println!("  ok  mode: {}", config.unit_of_work.mode);
}
