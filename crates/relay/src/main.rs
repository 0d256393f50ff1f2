use std::sync::Arc;

use relay_core::{config::Config, store::Store};
use relay_store::SqliteStore;
use tracing::info;

// One cooperative worker: updates interleave only at await points.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), relay_core::Error> {
    relay_core::logging::init("relay")?;

    let cfg = Arc::new(Config::load()?);
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&cfg.database_path)?);
    info!(path = %cfg.database_path.display(), "store opened");

    relay_telegram::router::run_polling(cfg, store)
        .await
        .map_err(|e| relay_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
