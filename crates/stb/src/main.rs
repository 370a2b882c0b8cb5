use std::sync::Arc;

use stb_core::{
    config::Config,
    store::{json::JsonStore, TicketStore, UserDirectory},
};

#[tokio::main]
async fn main() -> Result<(), stb_core::Error> {
    stb_core::logging::init("stb");

    let cfg = Arc::new(Config::load()?);

    let store = Arc::new(JsonStore::open(cfg.store_path.clone())?);
    let tickets: Arc<dyn TicketStore> = store.clone();
    let directory: Arc<dyn UserDirectory> = store;

    stb_telegram::router::run_polling(cfg, tickets, directory)
        .await
        .map_err(|e| stb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
