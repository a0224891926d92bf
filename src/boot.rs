use std::fs;

use log::info;

use crate::config::Config;
use crate::db::{self, DbPool};
use crate::options::Options;

/// Everything a command needs: configuration, a ready database pool with
/// the schema applied, and the option service.
pub struct App {
    pub config: Config,
    pub pool: DbPool,
    pub options: Options,
}

/// Bring the application up: logging, config, database, schema. Migrations
/// are idempotent, so every entry point can run them safely.
pub fn boot() -> Result<App, Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load();

    if let Some(parent) = config.database_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir_all(&config.cache_dir)?;

    let pool = db::init_pool(&config.database_path)?;
    db::run_migrations(&pool)?;

    let options = Options::new(pool.clone(), config.options_snapshot());

    info!("Booted with database {}", config.database_path.display());
    Ok(App {
        config,
        pool,
        options,
    })
}
