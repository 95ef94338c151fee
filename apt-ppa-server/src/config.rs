// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Environment configuration.

All configuration comes from environment variables, with a `.env` file
(if present) loaded first. Sources are enabled per deployment by setting
their poll interval to a positive duration and providing any
source-specific settings.
*/

use {
    apt_ppa::store::S3Config,
    std::time::Duration,
    thiserror::Error,
};

const DEFAULT_DISCORD_DOWNLOAD_URL: &str =
    "https://discord.com/api/download?platform=linux&format=deb";
const DEFAULT_POSTMAN_DOWNLOAD_URL: &str = "https://dl.pstmn.io/download/latest/linux64";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid {0} {1:?}: {2}")]
    InvalidDuration(&'static str, String, humantime::DurationError),

    #[error("invalid LOG_LEVEL {0:?}: expected DEBUG, INFO, WARN or ERROR")]
    InvalidLogLevel(String),
}

/// Per-source settings for the Discord adapter.
#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub download_url: String,
    pub poll_interval: Duration,
}

/// Per-source settings for the Postman adapter.
#[derive(Clone, Debug)]
pub struct PostmanConfig {
    pub download_url: String,
    pub poll_interval: Duration,
}

/// Per-source settings for the Zerops CLI adapter.
#[derive(Clone, Debug)]
pub struct ZcliConfig {
    /// GitHub repository in `owner/repo` format. Empty disables the source.
    pub github_repo: String,
    pub poll_interval: Duration,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub gpg_private_key: String,
    pub s3: S3Config,
    pub listen_addr: String,
    pub origin: String,
    pub label: String,
    pub maintainer: String,
    pub log_level: String,

    pub discord: DiscordConfig,
    pub postman: PostmanConfig,
    pub zcli: ZcliConfig,

    /// Whether a `.env` file was found and loaded.
    pub env_file_loaded: bool,
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn optional(key: &str, fallback: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => fallback.to_string(),
    }
}

fn duration(key: &'static str, fallback: &str) -> Result<Duration, ConfigError> {
    let raw = optional(key, fallback);
    humantime::parse_duration(&raw).map_err(|e| ConfigError::InvalidDuration(key, raw, e))
}

/// Load configuration from a `.env` file (if present) and the environment.
pub fn load() -> Result<Config, ConfigError> {
    let env_file_loaded = dotenvy::dotenv().is_ok();

    let log_level = optional("LOG_LEVEL", "INFO");
    if !matches!(log_level.as_str(), "DEBUG" | "INFO" | "WARN" | "ERROR") {
        return Err(ConfigError::InvalidLogLevel(log_level));
    }

    Ok(Config {
        gpg_private_key: required("GPG_PRIVATE_KEY")?,
        s3: S3Config {
            endpoint: required("S3_ENDPOINT")?,
            bucket: required("S3_BUCKET")?,
            access_key: required("S3_ACCESS_KEY")?,
            secret_key: required("S3_SECRET_KEY")?,
            region: optional("S3_REGION", "us-east-1"),
        },
        listen_addr: optional("LISTEN_ADDR", ":8080"),
        origin: optional("ORIGIN", "ppa.matejpavlicek.cz"),
        label: optional("LABEL", "PPA"),
        maintainer: optional("MAINTAINER", "PPA <ppa@matejpavlicek.cz>"),
        log_level,
        discord: DiscordConfig {
            download_url: optional("DISCORD_DOWNLOAD_URL", DEFAULT_DISCORD_DOWNLOAD_URL),
            poll_interval: duration("DISCORD_POLL_INTERVAL", "1h")?,
        },
        postman: PostmanConfig {
            download_url: optional("POSTMAN_DOWNLOAD_URL", DEFAULT_POSTMAN_DOWNLOAD_URL),
            poll_interval: duration("POSTMAN_POLL_INTERVAL", "6h")?,
        },
        zcli: ZcliConfig {
            github_repo: optional("ZCLI_GITHUB_REPO", ""),
            poll_interval: duration("ZCLI_POLL_INTERVAL", "1h")?,
        },
        env_file_loaded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parsing() {
        std::env::remove_var("TEST_POLL_INTERVAL_A");
        assert_eq!(
            duration("TEST_POLL_INTERVAL_A", "1h").unwrap(),
            Duration::from_secs(3600)
        );

        std::env::set_var("TEST_POLL_INTERVAL_B", "90s");
        assert_eq!(
            duration("TEST_POLL_INTERVAL_B", "1h").unwrap(),
            Duration::from_secs(90)
        );

        std::env::set_var("TEST_POLL_INTERVAL_C", "soon");
        assert!(matches!(
            duration("TEST_POLL_INTERVAL_C", "1h").unwrap_err(),
            ConfigError::InvalidDuration("TEST_POLL_INTERVAL_C", _, _)
        ));
    }

    #[test]
    fn zero_interval_disables_a_source() {
        std::env::set_var("TEST_POLL_INTERVAL_D", "0s");
        assert_eq!(
            duration("TEST_POLL_INTERVAL_D", "1h").unwrap(),
            Duration::ZERO
        );
    }
}
