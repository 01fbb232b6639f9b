use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tokio::runtime::{Builder, Runtime};
use tracing_subscriber::EnvFilter;
use userdesk_adapters::mysql::MysqlStoreBackend;
use userdesk_core::config::{ConfigFile, StoreConfig};
use userdesk_core::controller::UserController;
use userdesk_core::gateway::ConnectionGateway;
use userdesk_core::repository::UserRepository;

const LOG_FILE_NAME: &str = "userdesk.log";
const DEFAULT_LOG_FILTER: &str = "info";

fn init_tracing(config_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(config_dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config_dir.join(LOG_FILE_NAME))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .init();
    Ok(())
}

fn load_config() -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let mut config = ConfigFile::load_default()?;
    if !config.exists() {
        config.persist()?;
        tracing::info!(path = %config.path().display(), "wrote default config");
    }
    Ok(config)
}

fn run_app(
    runtime: &Runtime,
    store: StoreConfig,
    run_tui: impl FnOnce(
        UserController<MysqlStoreBackend>,
        &Runtime,
    ) -> Result<(), userdesk_tui::TuiError>,
) -> Result<(), Box<dyn std::error::Error>> {
    let repository = UserRepository::new(ConnectionGateway::new(MysqlStoreBackend, store));
    if let Err(error) = runtime.block_on(repository.check_connection()) {
        tracing::error!(%error, "store unreachable at startup");
        return Err(format!("failed to connect to the database: {error}").into());
    }

    run_tui(UserController::new(repository), runtime)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = userdesk_core::config::config_dir()?;
    init_tracing(&config_dir)?;
    let config = load_config()?;
    let runtime = Builder::new_current_thread().enable_all().build()?;

    tracing::info!(
        host = %config.store().host,
        database = %config.store().database,
        "starting user viewer"
    );
    run_app(&runtime, config.store().clone(), userdesk_tui::run)
}
