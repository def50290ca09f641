use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// Prints `value` in the machine formats. Returns `false` for
/// [`OutputFormat::Human`], which each command renders itself.
pub fn print_structured<T: Serialize>(value: &T, format: &OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Human => Ok(false),
        OutputFormat::Json => {
            let rendered =
                serde_json::to_string_pretty(value).context("Failed to render JSON output")?;
            println!("{}", rendered);
            Ok(true)
        }
        OutputFormat::Yaml => {
            let rendered = serde_yaml::to_string(value).context("Failed to render YAML output")?;
            print!("{}", rendered);
            Ok(true)
        }
    }
}
