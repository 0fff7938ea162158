pub const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: &str = "8081";
pub const DEFAULT_UPSTREAM_URL: &str = "http://localhost:8080/api/users";
pub const DEFAULT_SERVICE_NAME: &str = "users-relay";
pub const DEFAULT_LOG_LEVEL: &str = "INFO";
pub const DEFAULT_REQUEST_BODY_MAX_SIZE: usize = 16 * 1024 * 1024;

pub const ENV_UPSTREAM_URL: &str = "UPSTREAM_API_URL";
pub const ENV_UPSTREAM_URL_LEGACY: &str = "LARAVEL_API_URL";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const USER_AGENT_VALUE: &str = "users-relay/0.1.0";

pub const BODY_PREVIEW_LIMIT: usize = 1024;
