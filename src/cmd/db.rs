//! `pitchboard init-db`: create the database file and run migrations.

use anyhow::{Context, Result};

use pitchboard::config::PitchboardConfig;
use pitchboard::pitches::db::PitchDb;

pub fn cmd_init_db(config: &PitchboardConfig) -> Result<()> {
    let path = &config.database.path;
    PitchDb::new(path)
        .with_context(|| format!("Failed to initialize pitch database at {}", path.display()))?;
    tracing::info!(db_path = %path.display(), "pitch database ready");
    println!("Pitch database initialized at {}", path.display());
    Ok(())
}
