//! Revue CLI entrypoint for incremental review mirroring.

use std::io::{self, Write};
use std::process::ExitCode;

use ortho_config::OrthoConfig;
use revue::telemetry::StderrJsonlTelemetrySink;
use revue::{
    PersistenceError, RateLimitedFetcher, RemoteError, ReqwestTransport, RevueConfig, SqliteStore,
    SyncError, SyncOptions, SyncOrchestrator, SyncOutcome, migrate_database,
};
use thiserror::Error;

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if writeln!(io::stderr().lock(), "{error}").is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), AppError> {
    let config = load_config()?;
    let database_url = config.require_database_url()?.to_owned();
    let telemetry = StderrJsonlTelemetrySink;

    if config.migrate_db {
        let schema_version = migrate_database(&database_url, &telemetry)?;
        return write_line(&format!(
            "database ready at schema version {}",
            schema_version.as_str()
        ));
    }

    let tracking_url = config.require_tracking_url()?.to_owned();
    let credentials = config.resolve_credentials()?;
    let transport = ReqwestTransport::new(credentials, config.proxy.as_deref())?;
    let fetcher = RateLimitedFetcher::new(&transport);
    let store = SqliteStore::new(database_url)?;

    let options = SyncOptions {
        tracking_url,
        project: config.project.clone(),
        link_issues: config.link_issues,
    };
    let mut orchestrator = SyncOrchestrator::new(&fetcher, &store, &telemetry, options);
    let outcome = orchestrator.run()?;

    write_summary(&outcome)
}

/// Loads configuration from CLI, environment, and files.
///
/// # Errors
///
/// Returns [`AppError::Configuration`] when ortho-config fails to parse
/// arguments or load configuration files.
fn load_config() -> Result<RevueConfig, AppError> {
    RevueConfig::load().map_err(|error| AppError::Configuration {
        message: error.to_string(),
    })
}

fn write_summary(outcome: &SyncOutcome) -> Result<(), AppError> {
    let watermark = outcome
        .watermark
        .map_or_else(|| "none".to_owned(), |value| value.to_rfc3339());
    write_line(&format!(
        "Synced {} thread(s), {} failed\nWatermark: {watermark}",
        outcome.threads_synced, outcome.threads_failed
    ))
}

fn write_line(message: &str) -> Result<(), AppError> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{message}").map_err(|error| AppError::Io {
        message: error.to_string(),
    })
}
