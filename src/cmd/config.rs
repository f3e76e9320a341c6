//! Configuration view and validation commands: `pitchboard config`.

use std::path::Path;

use anyhow::{Context, Result, bail};

use pitchboard::config::{DEFAULT_CONFIG_FILE, PitchboardConfig};

pub fn cmd_config_show(config: &PitchboardConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

pub fn cmd_config_validate(config: &PitchboardConfig) -> Result<()> {
    // `resolve` already validated; re-run so the command stands on its own.
    config.validate()?;
    println!("Configuration OK");
    Ok(())
}

/// Write the default configuration to `path` (or `./pitchboard.toml`).
pub fn cmd_config_init(path: Option<&Path>, force: bool) -> Result<()> {
    let path = path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    let content = PitchboardConfig::default().to_toml()?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
