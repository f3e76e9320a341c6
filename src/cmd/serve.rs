//! `pitchboard serve`.

use anyhow::Result;

use pitchboard::config::PitchboardConfig;
use pitchboard::pitches::server::start_server;

pub async fn cmd_serve(config: &PitchboardConfig) -> Result<()> {
    start_server(config.server_config()).await
}
