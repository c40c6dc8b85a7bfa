use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use courier_config::{CourierConfig, Severity, validate};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Validate the effective configuration and report errors/warnings.
    Check,
}

/// `path` is the file the effective config was loaded from, if any.
pub fn handle_config(
    config: &CourierConfig,
    path: Option<&Path>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => show(config, path),
        ConfigAction::Check => check(config),
    }
}

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn source_line(path: Option<&Path>) -> String {
    match path {
        Some(path) => format!("# loaded {}", path.display()),
        None => "# no config file found; defaults".to_string(),
    }
}

fn show(config: &CourierConfig, path: Option<&Path>) -> Result<()> {
    eprintln!("{}", source_line(path));
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn check(config: &CourierConfig) -> Result<()> {
    let result = validate(config);

    for d in &result.diagnostics {
        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
        };
        eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("\n{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_line_names_the_loaded_file() {
        let line = source_line(Some(Path::new("/etc/courier/override.toml")));
        assert_eq!(line, "# loaded /etc/courier/override.toml");
    }

    #[test]
    fn source_line_without_file_mentions_defaults() {
        assert!(source_line(None).contains("defaults"));
    }
}
