use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::constants::{
    CONFIG_FILE, DEFAULT_HOST, DEFAULT_LOG_LEVEL, DEFAULT_PORT, DEFAULT_REQUEST_BODY_MAX_SIZE,
    DEFAULT_SERVICE_NAME, DEFAULT_UPSTREAM_URL, ENV_UPSTREAM_URL, ENV_UPSTREAM_URL_LEGACY,
};

/// Process-wide settings, resolved once at startup and never mutated.
///
/// `upstream_url` is the fully-qualified endpoint the relay posts to; no path
/// segment is ever appended to it.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: String,
    pub upstream_url: String,
    pub service_name: String,
    pub request_body_max_size: usize,
    pub upstream_timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlConfigRaw {
    host: Option<String>,
    port: Option<LoosePort>,
    upstream_url: Option<String>,
    service_name: Option<String>,
    request_body_max_size: Option<usize>,
    upstream_timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LoosePort {
    Number(u16),
    Text(String),
}

impl LoosePort {
    fn into_string(self) -> String {
        match self {
            Self::Number(value) => value.to_string(),
            Self::Text(value) => value,
        }
    }
}

impl Config {
    /// Resolves the configuration from the process environment and the
    /// optional `config.toml`. Never fails: every unreadable source falls back
    /// to the next one and finally to the built-in defaults.
    pub fn load() -> Self {
        let toml_config = match read_toml_config(CONFIG_FILE) {
            Ok(value) => value.unwrap_or_default(),
            Err(error) => {
                warn!("{error}; ignoring {CONFIG_FILE}");
                TomlConfigRaw::default()
            }
        };

        let config = Self::from_sources(process_env, toml_config);
        config.log_resolved();
        config
    }

    fn from_sources(env: impl Fn(&str) -> Option<String>, toml_config: TomlConfigRaw) -> Self {
        let lookup = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let host = lookup("HOST")
            .or(toml_config.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = lookup("PORT")
            .or(toml_config.port.map(LoosePort::into_string))
            .map(|value| value.trim().to_string())
            .unwrap_or_else(|| DEFAULT_PORT.to_string());

        let upstream_url = lookup(ENV_UPSTREAM_URL)
            .or_else(|| lookup(ENV_UPSTREAM_URL_LEGACY))
            .or(toml_config.upstream_url)
            .map(|value| value.trim().to_string())
            .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string());

        let service_name = lookup("SERVICE_NAME")
            .or(toml_config.service_name)
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());

        let request_body_max_size = lookup("REQUEST_BODY_MAX_SIZE")
            .and_then(|value| value.trim().parse::<usize>().ok())
            .or(toml_config.request_body_max_size)
            .unwrap_or(DEFAULT_REQUEST_BODY_MAX_SIZE);

        // 0 disables the timeout explicitly, even when config.toml sets one.
        let upstream_timeout = lookup("UPSTREAM_TIMEOUT")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .or(toml_config.upstream_timeout)
            .filter(|value| *value > 0);

        Self {
            host,
            port,
            upstream_url,
            service_name,
            request_body_max_size,
            upstream_timeout,
        }
    }

    pub fn listen_addr(&self) -> String {
        let host = self.host.trim();
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        format!("{host}{}", normalize_port(&self.port))
    }

    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream_timeout.map(Duration::from_secs)
    }

    fn log_resolved(&self) {
        info!("Configuration loaded:");
        info!("  PORT: {}", self.port);
        info!("  UPSTREAM_API_URL: {}", self.upstream_url);
        info!(
            phase = "config_resolved",
            host = %self.host,
            service = %self.service_name,
            request_body_max_size = self.request_body_max_size,
            upstream_timeout_secs = ?self.upstream_timeout,
            "Additional settings"
        );
    }
}

/// Logs the outcome of loading the `.env` override file. The file is
/// optional, so a missing one is reported at info level only.
pub fn report_env_file(result: &dotenvy::Result<PathBuf>) {
    match result {
        Ok(path) => info!("Successfully loaded {}", path.display()),
        Err(error) if error.not_found() => {
            info!("No .env file found, using process environment variables")
        }
        Err(error) => warn!("Failed to load .env file, using process environment variables: {error}"),
    }
}

pub fn log_level() -> String {
    process_env("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

pub fn normalize_port(port: &str) -> String {
    let port = port.trim();
    if port.starts_with(':') {
        port.to_string()
    } else {
        format!(":{port}")
    }
}

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_toml_config(path: &str) -> Result<Option<TomlConfigRaw>, String> {
    let config_path = Path::new(path);

    if !config_path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(config_path)
        .map_err(|error| format!("Failed to read {}: {}", config_path.display(), error))?;

    parse_toml_config(&content)
        .map(Some)
        .map_err(|error| format!("Failed to parse {}: {}", config_path.display(), error))
}

fn parse_toml_config(content: &str) -> Result<TomlConfigRaw, toml::de::Error> {
    toml::from_str::<TomlConfigRaw>(content)
}

#[cfg(test)]
mod tests {
    use super::{Config, TomlConfigRaw, normalize_port, parse_toml_config};
    use std::collections::HashMap;
    use std::time::Duration;

    fn from_map(vars: &[(&str, &str)], toml_config: TomlConfigRaw) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_sources(|key| vars.get(key).cloned(), toml_config)
    }

    #[test]
    fn falls_back_to_defaults_without_any_source() {
        let config = from_map(&[], TomlConfigRaw::default());
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, "8081");
        assert_eq!(config.upstream_url, "http://localhost:8080/api/users");
        assert_eq!(config.service_name, "users-relay");
        assert_eq!(config.request_body_max_size, 16 * 1024 * 1024);
        assert_eq!(config.upstream_timeout, None);
    }

    #[test]
    fn environment_takes_precedence_over_toml() {
        let toml_config = parse_toml_config(
            r#"
            port = 9000
            upstream_url = "http://toml.internal/users"
            service_name = "from-toml"
            "#,
        )
        .expect("toml should parse");

        let config = from_map(
            &[("PORT", "7000"), ("UPSTREAM_API_URL", "http://env.internal/users")],
            toml_config,
        );

        assert_eq!(config.port, "7000");
        assert_eq!(config.upstream_url, "http://env.internal/users");
        assert_eq!(config.service_name, "from-toml");
    }

    #[test]
    fn accepts_string_or_number_port_in_toml() {
        let numeric = parse_toml_config("port = 9100").expect("numeric port");
        assert_eq!(from_map(&[], numeric).port, "9100");

        let text = parse_toml_config(r#"port = ":9200""#).expect("string port");
        assert_eq!(from_map(&[], text).port, ":9200");
    }

    #[test]
    fn legacy_upstream_variable_is_used_when_primary_is_unset() {
        let config = from_map(
            &[("LARAVEL_API_URL", "http://laravel:8080/api/users")],
            TomlConfigRaw::default(),
        );
        assert_eq!(config.upstream_url, "http://laravel:8080/api/users");

        let config = from_map(
            &[
                ("UPSTREAM_API_URL", "http://primary/users"),
                ("LARAVEL_API_URL", "http://laravel:8080/api/users"),
            ],
            TomlConfigRaw::default(),
        );
        assert_eq!(config.upstream_url, "http://primary/users");
    }

    #[test]
    fn empty_environment_values_count_as_unset() {
        let config = from_map(&[("PORT", ""), ("UPSTREAM_API_URL", "   ")], TomlConfigRaw::default());
        assert_eq!(config.port, "8081");
        assert_eq!(config.upstream_url, "http://localhost:8080/api/users");
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let toml_config = parse_toml_config("request_body_max_size = 1024").expect("toml");
        let config = from_map(
            &[("REQUEST_BODY_MAX_SIZE", "lots"), ("UPSTREAM_TIMEOUT", "soon")],
            toml_config,
        );
        assert_eq!(config.request_body_max_size, 1024);
        assert_eq!(config.upstream_timeout, None);
    }

    #[test]
    fn zero_timeout_disables_the_toml_timeout() {
        let toml_config = parse_toml_config("upstream_timeout = 30").expect("toml");
        let config = from_map(&[], toml_config);
        assert_eq!(config.upstream_timeout(), Some(Duration::from_secs(30)));

        let toml_config = parse_toml_config("upstream_timeout = 30").expect("toml");
        let config = from_map(&[("UPSTREAM_TIMEOUT", "0")], toml_config);
        assert_eq!(config.upstream_timeout(), None);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(parse_toml_config("port = [").is_err());
    }

    #[test]
    fn normalizes_port_prefix() {
        assert_eq!(normalize_port("8081"), ":8081");
        assert_eq!(normalize_port(":8081"), ":8081");
        assert_eq!(normalize_port(" 9000 "), ":9000");
    }

    #[test]
    fn builds_listen_address() {
        let mut config = from_map(&[("PORT", ":8083")], TomlConfigRaw::default());
        assert_eq!(config.listen_addr(), "0.0.0.0:8083");

        config.host = "::".to_string();
        config.port = "8081".to_string();
        assert_eq!(config.listen_addr(), "[::]:8081");
    }
}
