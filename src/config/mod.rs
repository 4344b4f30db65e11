//! Application configuration loaded from CLI, environment, and files.
//!
//! This module provides a unified configuration struct that merges values
//! from command-line arguments, environment variables, and configuration
//! files using ortho-config's layered approach.
//!
//! # Precedence
//!
//! Configuration values are loaded with the following precedence (lowest to
//! highest):
//!
//! 1. **Defaults** – Built-in application defaults
//! 2. **Configuration file** – `.revue.toml` in current directory, home
//!    directory, or XDG config directory
//! 3. **Environment variables** – `REVUE_TRACKING_URL`, `REVUE_TOKEN`, or
//!    legacy `REVIEW_TOKEN`
//! 4. **Command-line arguments** – `--tracking-url`/`-u`, `--token`/`-t`, …
//!
//! # Configuration File
//!
//! Place `.revue.toml` in the current directory, home directory, or XDG
//! config directory with:
//!
//! ```toml
//! tracking_url = "https://review.example.org/api/threads"
//! token = "rvt_example"
//! project = "mirror"
//! link_issues = true
//! database_url = "revue.sqlite"
//! ```

use std::env;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::persistence::PersistenceError;
use crate::remote::{RemoteCredentials, RemoteError};

/// Application configuration supporting CLI, environment, and file sources.
///
/// # Environment Variables
///
/// - `REVUE_TRACKING_URL` or `--tracking-url`: Thread-listing base URL
/// - `REVUE_TOKEN`, `REVIEW_TOKEN`, or `--token`: Authentication token
/// - `REVUE_USERNAME` / `REVUE_PASSWORD`: Basic-auth credentials
/// - `REVUE_PROXY` or `--proxy`: Proxy URL for outbound requests
/// - `REVUE_PROJECT` or `--project`: Alternate project name
/// - `REVUE_DATABASE_URL` or `--database-url`: Local `SQLite` database path
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(
    prefix = "REVUE",
    discovery(
        dotfile_name = ".revue.toml",
        config_file_name = "revue.toml",
        app_name = "revue"
    )
)]
pub struct RevueConfig {
    /// Base URL of the remote thread-listing endpoint.
    ///
    /// Can be provided via:
    /// - CLI: `--tracking-url <URL>` or `-u <URL>`
    /// - Environment: `REVUE_TRACKING_URL`
    /// - Config file: `tracking_url = "..."`
    #[ortho_config(cli_short = 'u')]
    pub tracking_url: Option<String>,

    /// Token for the remote platform's token authentication.
    ///
    /// Can be provided via:
    /// - CLI: `--token <TOKEN>` or `-t <TOKEN>`
    /// - Environment: `REVUE_TOKEN` or `REVIEW_TOKEN` (legacy)
    /// - Config file: `token = "..."`
    #[ortho_config(cli_short = 't')]
    pub token: Option<String>,

    /// Alternate project name used to scope the listing query.
    ///
    /// Can be provided via:
    /// - CLI: `--project <NAME>` or `-p <NAME>`
    /// - Environment: `REVUE_PROJECT`
    /// - Config file: `project = "..."`
    #[ortho_config(cli_short = 'p')]
    pub project: Option<String>,

    /// Username for HTTP basic authentication, used when no token is set.
    #[ortho_config()]
    pub username: Option<String>,

    /// Password for HTTP basic authentication, used when no token is set.
    #[ortho_config()]
    pub password: Option<String>,

    /// Proxy URL applied to every outbound request.
    #[ortho_config()]
    pub proxy: Option<String>,

    /// Enables resolving issue references from thread topics and
    /// descriptions.
    ///
    /// Can be provided via:
    /// - CLI: `--link-issues`
    /// - Config file: `link_issues = true`
    ///
    /// Note: environment variable `REVUE_LINK_ISSUES` is not supported
    /// because `ortho_config` does not load boolean values from the
    /// environment.
    #[ortho_config()]
    pub link_issues: bool,

    /// Local `SQLite` database URL/path used for persistence.
    ///
    /// Diesel uses a filesystem path for `SQLite` connections. The same
    /// value is also used by the Diesel CLI via `DATABASE_URL` when running
    /// migrations.
    ///
    /// Can be provided via:
    /// - CLI: `--database-url <PATH>`
    /// - Environment: `REVUE_DATABASE_URL`
    /// - Config file: `database_url = "..."`
    #[ortho_config()]
    pub database_url: Option<String>,

    /// Runs database migrations and exits.
    ///
    /// When set, revue initialises the database at `database_url`, applies
    /// any pending Diesel migrations, records the schema version in
    /// telemetry, and exits without touching the remote platform.
    ///
    /// Can be provided via:
    /// - CLI: `--migrate-db`
    /// - Config file: `migrate_db = true`
    #[ortho_config()]
    pub migrate_db: bool,
}

impl Default for RevueConfig {
    fn default() -> Self {
        Self {
            tracking_url: None,
            token: None,
            username: None,
            password: None,
            proxy: None,
            project: None,
            link_issues: false,
            database_url: None,
            migrate_db: false,
        }
    }
}

impl RevueConfig {
    /// Returns the tracking URL after validating that it parses.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::MissingTrackingUrl`] when no URL is configured
    /// and [`RemoteError::InvalidTrackingUrl`] when it does not parse.
    pub fn require_tracking_url(&self) -> Result<&str, RemoteError> {
        let raw = self
            .tracking_url
            .as_deref()
            .ok_or(RemoteError::MissingTrackingUrl)?;
        Url::parse(raw).map_err(|error| RemoteError::InvalidTrackingUrl(error.to_string()))?;
        Ok(raw)
    }

    /// Resolves credentials: token first, then username+password.
    ///
    /// For backward compatibility, if no token is provided via
    /// `REVUE_TOKEN`, the CLI, or a configuration file, this method falls
    /// back to reading `REVIEW_TOKEN` from the environment before trying
    /// basic authentication.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::MissingCredentials`] when neither a token nor
    /// a full username+password pair is available.
    pub fn resolve_credentials(&self) -> Result<RemoteCredentials, RemoteError> {
        if let Some(token) = self
            .token
            .clone()
            .or_else(|| env::var("REVIEW_TOKEN").ok())
        {
            return Ok(RemoteCredentials::Token(token));
        }

        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(RemoteCredentials::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => Err(RemoteError::MissingCredentials),
        }
    }

    /// Returns the database URL or an error if missing.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::MissingDatabaseUrl`] when no database URL
    /// is configured.
    pub fn require_database_url(&self) -> Result<&str, PersistenceError> {
        self.database_url
            .as_deref()
            .ok_or(PersistenceError::MissingDatabaseUrl)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::RevueConfig;
    use crate::remote::RemoteCredentials;

    #[rstest]
    fn require_tracking_url_returns_value_when_present() {
        let config = RevueConfig {
            tracking_url: Some("https://review.example.org/api/threads".to_owned()),
            ..Default::default()
        };

        assert_eq!(
            config.require_tracking_url().ok(),
            Some("https://review.example.org/api/threads"),
            "should return the URL"
        );
    }

    #[rstest]
    fn require_tracking_url_rejects_unparsable_values() {
        let config = RevueConfig {
            tracking_url: Some("not a url".to_owned()),
            ..Default::default()
        };

        assert!(config.require_tracking_url().is_err());
    }

    #[rstest]
    fn resolve_credentials_prefers_the_token() {
        let config = RevueConfig {
            token: Some("my-token".to_owned()),
            username: Some("mirror".to_owned()),
            password: Some("hunter2".to_owned()),
            ..Default::default()
        };

        assert_eq!(
            config.resolve_credentials().ok(),
            Some(RemoteCredentials::Token("my-token".to_owned())),
            "token should win over basic auth"
        );
    }

    #[rstest]
    fn resolve_credentials_falls_back_to_basic_auth() {
        // Lock and clear REVIEW_TOKEN to ensure test isolation
        let _guard = env_lock::lock_env([("REVIEW_TOKEN", None::<&str>)]);
        let config = RevueConfig {
            username: Some("mirror".to_owned()),
            password: Some("hunter2".to_owned()),
            ..Default::default()
        };

        assert_eq!(
            config.resolve_credentials().ok(),
            Some(RemoteCredentials::Basic {
                username: "mirror".to_owned(),
                password: "hunter2".to_owned(),
            }),
        );
    }

    #[rstest]
    fn resolve_credentials_reads_the_legacy_environment_token() {
        let _guard = env_lock::lock_env([("REVIEW_TOKEN", Some("legacy-token"))]);
        let config = RevueConfig::default();

        assert_eq!(
            config.resolve_credentials().ok(),
            Some(RemoteCredentials::Token("legacy-token".to_owned())),
        );
    }

    #[rstest]
    fn resolve_credentials_errors_without_any_source() {
        let _guard = env_lock::lock_env([("REVIEW_TOKEN", None::<&str>)]);
        let config = RevueConfig {
            username: Some("mirror".to_owned()),
            ..Default::default()
        };

        assert!(config.resolve_credentials().is_err());
    }

    #[rstest]
    fn require_database_url_errors_when_missing() {
        let config = RevueConfig::default();
        assert!(config.require_database_url().is_err());
    }
}
