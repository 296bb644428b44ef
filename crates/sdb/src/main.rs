use std::sync::Arc;

use sdb_spotdl::SpotdlClient;

use sdb_core::config::Config;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), sdb_core::Error> {
    sdb_core::logging::init("spotdl_bot")?;

    let cfg = Arc::new(Config::load()?);
    info!(
        spotdl = %cfg.spotdl_path.display(),
        timeout_secs = cfg.download_timeout.as_secs(),
        "using spotdl"
    );

    let downloader = Arc::new(SpotdlClient::new(
        cfg.spotdl_path.clone(),
        cfg.download_timeout,
    ));

    sdb_telegram::router::run_polling(cfg, downloader)
        .await
        .map_err(|e| sdb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
