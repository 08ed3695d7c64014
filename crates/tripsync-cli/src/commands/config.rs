//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use tripsync_core::{Config, Identity};

use crate::output::{Output, OutputFormat};

const KEYS: &str = "data_dir, remote_url, api_token, identity, sync_enabled, log_file, \
                    retry_ceiling, poll_interval_secs, startup_debounce_ms";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "remote_url": config.remote_url,
                    "api_token": config.api_token.as_ref().map(|_| "(set)"),
                    "identity": config.identity,
                    "sync_enabled": config.sync_enabled,
                    "log_file": config.log_file,
                    "retry_ceiling": config.retry_ceiling,
                    "poll_interval_secs": config.poll_interval_secs,
                    "startup_debounce_ms": config.startup_debounce_ms
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:            {}", config.data_dir.display());
            println!(
                "  remote_url:          {}",
                config.remote_url.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  api_token:           {}",
                if config.api_token.is_some() {
                    "(set)"
                } else {
                    "(not set)"
                }
            );
            println!(
                "  identity:            {}",
                config.identity.as_deref().unwrap_or("(not set)")
            );
            println!("  sync_enabled:        {}", config.sync_enabled);
            println!(
                "  log_file:            {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  retry_ceiling:       {}", config.retry_ceiling);
            println!("  poll_interval_secs:  {}", config.poll_interval_secs);
            println!("  startup_debounce_ms: {}", config.startup_debounce_ms);
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "api_token" { "(hidden)" } else { value.as_str() };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

/// Apply one `key = value` change
fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => {
            config.data_dir = value.into();
        }
        "remote_url" => {
            config.remote_url = optional(value);
        }
        "api_token" => {
            config.api_token = optional(value);
        }
        "identity" => {
            config.identity = match optional(value) {
                Some(raw) => {
                    let identity = Identity::parse(&raw)
                        .with_context(|| format!("Invalid identity '{}'", raw))?;
                    Some(identity.to_string())
                }
                None => None,
            };
        }
        "sync_enabled" => {
            config.sync_enabled = value
                .parse()
                .context("Invalid value for sync_enabled. Use 'true' or 'false'.")?;
        }
        "log_file" => {
            config.log_file = optional(value).map(PathBuf::from);
        }
        "retry_ceiling" => {
            config.retry_ceiling = value
                .parse()
                .context("Invalid value for retry_ceiling. Use a whole number.")?;
        }
        "poll_interval_secs" => {
            config.poll_interval_secs = value
                .parse()
                .context("Invalid value for poll_interval_secs. Use a whole number.")?;
        }
        "startup_debounce_ms" => {
            config.startup_debounce_ms = value
                .parse()
                .context("Invalid value for startup_debounce_ms. Use a whole number.")?;
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                KEYS
            );
        }
    }
    Ok(())
}

/// Empty or "none" clears an optional value
fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_apply_known_keys() {
        let mut config = Config::default();

        apply(&mut config, "remote_url", "https://sync.example.com").unwrap();
        apply(&mut config, "sync_enabled", "true").unwrap();
        apply(&mut config, "identity", "  ana@example.com ").unwrap();
        apply(&mut config, "retry_ceiling", "5").unwrap();

        assert_eq!(config.remote_url.as_deref(), Some("https://sync.example.com"));
        assert!(config.sync_enabled);
        assert_eq!(config.identity.as_deref(), Some("ana@example.com"));
        assert_eq!(config.retry_ceiling, 5);

        apply(&mut config, "remote_url", "none").unwrap();
        assert!(config.remote_url.is_none());
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = Config::default();
        assert!(apply(&mut config, "sync_enabled", "maybe").is_err());
        assert!(apply(&mut config, "retry_ceiling", "-1").is_err());
        assert!(apply(&mut config, "identity", "two words").is_err());
        assert!(apply(&mut config, "favorite_color", "blue").is_err());
    }

    #[test]
    fn test_set_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let output = Output::new(OutputFormat::Quiet);
        let seed = Config {
            data_dir: temp_dir.path().join("data"),
            ..Config::default()
        };
        seed.save_to_path(&path).unwrap();

        set(
            "poll_interval_secs".to_string(),
            "60".to_string(),
            Some(&path),
            &output,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.poll_interval_secs, 60);
    }
}
