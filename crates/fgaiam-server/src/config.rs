//! Configuration management for the fgaiam services.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use fgaiam_server::config::ServiceConfig;
//!
//! // Load from file with env overrides
//! let config = ServiceConfig::load("fgaiam.yaml")?;
//!
//! // Or load from environment only
//! let config = ServiceConfig::from_env()?;
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use fgaiam_domain::listing::PageDefaults;
use fgaiam_domain::{Role, SortDirection, SortField, SortSpec, TtlCacheConfig};
use serde::{Deserialize, Serialize};

/// Service configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServiceConfig {
    /// Authorization engine settings
    #[serde(default)]
    pub openfga: OpenFgaSettings,

    /// Identity provider settings
    #[serde(default)]
    pub idm: IdmSettings,

    /// Control plane settings
    #[serde(default)]
    pub control_plane: ControlPlaneSettings,

    /// Cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// User listing settings
    #[serde(default)]
    pub users: UserSettings,

    /// Role catalog: resource kind -> roles defined for it
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<RoleSettings>>,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Client error settings
    #[serde(default)]
    pub errors: ErrorSettings,
}

/// OpenFGA connection settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OpenFgaSettings {
    /// gRPC endpoint of OpenFGA
    #[serde(default = "default_openfga_url")]
    pub url: String,

    /// Pre-shared key sent as bearer token
    #[serde(default)]
    pub api_token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for OpenFgaSettings {
    fn default() -> Self {
        Self {
            url: default_openfga_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_openfga_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

/// Identity provider (Keycloak) settings.
///
/// These settings can be overridden via environment variables with the `FGAIAM_` prefix
/// and `__` as the nested key separator:
///
/// - `FGAIAM_IDM__URL=https://idm.example.com`
/// - `FGAIAM_IDM__CLIENT_SECRET=...`
///
/// # Example YAML Configuration
///
/// ```yaml
/// idm:
///   url: https://idm.example.com
///   auth_realm: master
///   client_id: fgaiam
///   client_secret: change-me
///   excluded_tenants: [master]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct IdmSettings {
    /// Base URL of the identity provider
    #[serde(default = "default_idm_url")]
    pub url: String,

    /// Realm the service account authenticates against
    #[serde(default = "default_auth_realm")]
    pub auth_realm: String,

    /// Service account client id
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Service account client secret
    #[serde(default)]
    pub client_secret: String,

    /// Realms that are never accepted as tenants
    #[serde(default = "default_excluded_tenants")]
    pub excluded_tenants: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for IdmSettings {
    fn default() -> Self {
        Self {
            url: default_idm_url(),
            auth_realm: default_auth_realm(),
            client_id: default_client_id(),
            client_secret: String::new(),
            excluded_tenants: default_excluded_tenants(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_idm_url() -> String {
    "http://localhost:8180".to_string()
}

fn default_auth_realm() -> String {
    "master".to_string()
}

fn default_client_id() -> String {
    "fgaiam".to_string()
}

fn default_excluded_tenants() -> Vec<String> {
    vec!["master".to_string()]
}

/// Control plane settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ControlPlaneSettings {
    /// Base URL of the control plane API server
    #[serde(default = "default_control_plane_url")]
    pub url: String,

    /// Bearer token for the control plane
    #[serde(default)]
    pub token: Option<String>,

    /// Logical cluster holding organization accounts and workspaces
    #[serde(default = "default_organizations_cluster")]
    pub organizations_cluster: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ControlPlaneSettings {
    fn default() -> Self {
        Self {
            url: default_control_plane_url(),
            token: None,
            organizations_cluster: default_organizations_cluster(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_control_plane_url() -> String {
    "https://localhost:6443".to_string()
}

fn default_organizations_cluster() -> String {
    "root:orgs".to_string()
}

/// Cache settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSettings {
    /// Store and model id cache
    #[serde(default = "default_store_cache")]
    pub store: CacheSection,

    /// Identity provider profile cache
    #[serde(default = "default_identity_cache")]
    pub identity: CacheSection,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            store: default_store_cache(),
            identity: default_identity_cache(),
        }
    }
}

/// Capacity and time-to-live of one cache.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSection {
    pub max_capacity: u64,
    pub ttl_secs: u64,
}

impl CacheSection {
    pub fn to_cache_config(&self) -> TtlCacheConfig {
        TtlCacheConfig::new(self.max_capacity, Duration::from_secs(self.ttl_secs))
    }
}

fn default_store_cache() -> CacheSection {
    CacheSection {
        max_capacity: 10,
        ttl_secs: 300,
    }
}

fn default_identity_cache() -> CacheSection {
    CacheSection {
        max_capacity: 10_000,
        ttl_secs: 3600,
    }
}

/// User listing settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct UserSettings {
    /// Sort field when the caller gives none
    #[serde(default)]
    pub default_sort_field: SortField,

    /// Sort direction when the caller gives none
    #[serde(default)]
    pub default_sort_direction: SortDirection,

    /// Page size when absent or non-positive
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Page number when absent or non-positive
    #[serde(default = "default_page")]
    pub default_page: usize,

    /// Identity lookups allowed in flight per request
    #[serde(default = "default_max_concurrent_lookups")]
    pub max_concurrent_lookups: usize,

    /// Time budget of a single identity lookup in milliseconds
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            default_sort_field: SortField::default(),
            default_sort_direction: SortDirection::default(),
            default_limit: default_limit(),
            default_page: default_page(),
            max_concurrent_lookups: default_max_concurrent_lookups(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
        }
    }
}

impl UserSettings {
    pub fn default_sort(&self) -> SortSpec {
        SortSpec::new(self.default_sort_field, self.default_sort_direction)
    }

    pub fn page_defaults(&self) -> PageDefaults {
        PageDefaults {
            limit: self.default_limit,
            page: self.default_page,
        }
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

fn default_limit() -> usize {
    10
}

fn default_page() -> usize {
    1
}

fn default_max_concurrent_lookups() -> usize {
    10
}

fn default_lookup_timeout_ms() -> u64 {
    5000
}

/// A role entry of the catalog.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RoleSettings {
    pub id: String,

    /// Defaults to the id when empty
    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub description: String,
}

impl RoleSettings {
    pub fn to_role(&self) -> Role {
        let display_name = if self.display_name.is_empty() {
            self.id.clone()
        } else {
            self.display_name.clone()
        };
        Role {
            id: self.id.clone(),
            display_name,
            description: self.description.clone(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Client-facing error settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ErrorSettings {
    /// Expose detailed error messages to clients
    #[serde(default)]
    pub detailed: bool,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

fn invalid(message: impl Into<String>) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.into(),
    }
}

impl ServiceConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `FGAIAM_` and use `__` as separator.
    /// For example:
    /// - `FGAIAM_OPENFGA__URL=...` overrides `openfga.url`
    /// - `FGAIAM_USERS__DEFAULT_LIMIT=25` overrides `users.default_limit`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServiceConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            // FGAIAM_IDM__CLIENT_SECRET -> idm.client_secret
            .add_source(
                Environment::with_prefix("FGAIAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let service_config: ServiceConfig = config.try_deserialize()?;
        service_config.validate()?;

        Ok(service_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServiceConfig::default())?)
            .add_source(
                Environment::with_prefix("FGAIAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let service_config: ServiceConfig = config.try_deserialize()?;
        service_config.validate()?;

        Ok(service_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        for (name, value) in [
            ("openfga.url", &self.openfga.url),
            ("idm.url", &self.idm.url),
            ("control_plane.url", &self.control_plane.url),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(format!("{name} must not be empty")));
            }
            if let Err(e) = url::Url::parse(value) {
                return Err(invalid(format!("{name} is not a valid URL ({value}): {e}")));
            }
        }

        if self.idm.client_id.trim().is_empty() {
            return Err(invalid("idm.client_id must not be empty"));
        }

        if self.control_plane.organizations_cluster.trim().is_empty() {
            return Err(invalid(
                "control_plane.organizations_cluster must not be empty",
            ));
        }

        for (name, section) in [
            ("cache.store", &self.cache.store),
            ("cache.identity", &self.cache.identity),
        ] {
            if section.max_capacity == 0 {
                return Err(invalid(format!(
                    "{name}.max_capacity must be greater than 0"
                )));
            }
            if section.ttl_secs == 0 {
                return Err(invalid(format!("{name}.ttl_secs must be greater than 0")));
            }
        }

        let users = &self.users;
        for (name, value) in [
            ("users.default_limit", users.default_limit as u64),
            ("users.default_page", users.default_page as u64),
            (
                "users.max_concurrent_lookups",
                users.max_concurrent_lookups as u64,
            ),
            ("users.lookup_timeout_ms", users.lookup_timeout_ms),
        ] {
            if value == 0 {
                return Err(invalid(format!("{name} must be greater than 0")));
            }
        }

        for (kind, roles) in &self.roles {
            let mut seen = std::collections::HashSet::new();
            for role in roles {
                if role.id.trim().is_empty() {
                    return Err(invalid(format!("roles.{kind} contains a role without id")));
                }
                if !seen.insert(role.id.as_str()) {
                    return Err(invalid(format!(
                        "roles.{kind} defines role '{}' more than once",
                        role.id
                    )));
                }
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.level must be one of: {:?}, got: {}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}
