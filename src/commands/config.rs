use anyhow::Result;
use colored::Colorize;
use fanout_gateway::config::{self, Config};
use std::path::Path;

/// Execute the config show command
///
/// Displays the effective configuration with secrets masked
pub fn show(config_path: &Path) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());

    let cfg = config::load_config(config_path)?;
    let sanitized = sanitize_secrets(&cfg);

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(&sanitized)?;
    println!("{}", toml_string);

    Ok(())
}

/// Execute the config validate command
pub fn validate(config_path: &Path) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());

    let cfg = config::load_config(config_path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Fan-out Targets: {}", cfg.fanout.targets.len());
    println!("  Sample Ratio: {}", cfg.tracing.sample_ratio);

    Ok(())
}

/// Sanitize secrets in configuration for safe display
fn sanitize_secrets(cfg: &Config) -> Config {
    let mut sanitized = cfg.clone();

    if let Some(token) = &sanitized.scheduler.access_token {
        sanitized.scheduler.access_token = Some(mask_secret(token));
    }

    sanitized
}

/// Mask a secret for safe display
///
/// Shows first 7 and last 4 characters
/// Example: "ya29.a0AfH6SMBxyz1234" -> "ya29.a0...1234"
fn mask_secret(secret: &str) -> String {
    if secret.len() <= 11 || !secret.is_ascii() {
        return "***".to_string();
    }

    let prefix = &secret[..7];
    let suffix = &secret[secret.len() - 4..];

    format!("{}...{}", prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("ya29.a0AfH6SMBxyz1234"), "ya29.a0...1234");
        assert_eq!(mask_secret("short"), "***");
    }

    #[test]
    fn test_sanitize_secrets_masks_access_token() {
        let mut cfg = Config::default();
        cfg.scheduler.access_token = Some("ya29.a0AfH6SMBxyz1234".to_string());

        let sanitized = sanitize_secrets(&cfg);
        assert_eq!(
            sanitized.scheduler.access_token.as_deref(),
            Some("ya29.a0...1234")
        );
        assert_eq!(cfg.scheduler.access_token.as_deref(), Some("ya29.a0AfH6SMBxyz1234"));
    }

    #[test]
    fn test_sanitize_secrets_without_token() {
        let sanitized = sanitize_secrets(&Config::default());
        assert!(sanitized.scheduler.access_token.is_none());
    }
}
