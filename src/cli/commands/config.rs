//! Config Command
//!
//! Manage TrialSift configuration.
//!
//! Usage:
//!   trialsift config show [-f json]
//!   trialsift config path
//!   trialsift config init [-g] [--force]

use crate::cli::ui::Output;
use crate::config::{ConfigLoader, API_KEY_ENV};
use crate::types::Result;

/// Print the effective configuration (merged from all sources)
pub fn show(format: &str) -> Result<()> {
    let config = ConfigLoader::load()?;
    println!("{}", ConfigLoader::render(&config, format == "json")?);
    Ok(())
}

/// Print configuration file locations
pub fn path(out: &Output) -> Result<()> {
    out.section("Configuration paths");

    match ConfigLoader::global_config_path() {
        Some(global) => out.field("Global", &describe(&global)),
        None => out.field("Global", "(not available)"),
    }
    out.field("Project", &describe(&ConfigLoader::project_config_path()));
    out.field(
        "API key",
        if std::env::var_os(API_KEY_ENV).is_some() {
            "set via environment"
        } else {
            "not set in environment"
        },
    );
    Ok(())
}

/// Write a default config file
pub fn init(global: bool, force: bool, out: &Output) -> Result<()> {
    let path = if global {
        ConfigLoader::init_global(force)?
    } else {
        ConfigLoader::init_project(force)?
    };
    out.success(&format!(
        "Initialized {} configuration",
        if global { "global" } else { "project" }
    ));
    out.field("Config", &path.display().to_string());
    Ok(())
}

fn describe(path: &std::path::Path) -> String {
    let marker = if path.exists() { "✓" } else { "✗" };
    format!("{} {}", marker, path.display())
}
