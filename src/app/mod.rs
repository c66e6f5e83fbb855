mod config;
mod error;
mod logging;
pub mod reporting;
pub mod runtime;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, EXIT_TEMPORARY_FAILURE};

pub fn run() -> Result<(), AppError> {
    logging::init()?;

    let config = AppConfig::from_env()?;

    tracing::info!(
        store_path = %config.store_path,
        namespace = %config.namespace,
        class = %config.class_name,
        report_dir = %config.report_dir.display(),
        powercfg_path = %config.powercfg_path,
        generator_timeout_secs = config.generator_timeout_secs,
        replay_source = ?config.report_source_file,
        keep_reports = config.keep_reports,
        "battery collector bootstrap initialized"
    );

    runtime::run(config)
}

pub fn run_report() -> Result<(), AppError> {
    logging::init()?;

    let config = AppConfig::from_env()?;

    tracing::info!(
        store_path = %config.store_path,
        namespace = %config.namespace,
        class = %config.class_name,
        "battery report bootstrap initialized"
    );

    reporting::run(config)
}
