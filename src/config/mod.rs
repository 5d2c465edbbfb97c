//! Access layer configuration.
//!
//! Loaded from an optional YAML file and environment variables, then
//! validated. Priority (highest to lowest):
//! 1. Flat deployment env vars (`AWS_REGION`, `PUBLIC_TABLE_NAME`, ...)
//! 2. `TENANT_ACCESS__*` env vars (`__` separates nested keys)
//! 3. File named by `TENANT_ACCESS_CONFIG`, or the path argument
//! 4. `tenant-access.yaml` in the current directory
//! 5. Defaults

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "tenant-access.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "TENANT_ACCESS_CONFIG";
/// Prefix for nested configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "TENANT_ACCESS";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "ACCESS_LOG";

/// Environment variable for the AWS region.
pub const REGION_ENV_VAR: &str = "AWS_REGION";
/// Environment variable for an endpoint override (LocalStack, DynamoDB Local).
pub const ENDPOINT_ENV_VAR: &str = "AWS_ENDPOINT_URL";
/// Environment variable for the assumed role name template.
pub const ROLE_NAME_ENV_VAR: &str = "ASSUME_ROLE_NAME";
/// Environment variable for the assumed session duration in seconds.
pub const ROLE_DURATION_ENV_VAR: &str = "ASSUME_ROLE_DURATION_SECONDS";
/// Environment variable for the shared public table.
pub const PUBLIC_TABLE_ENV_VAR: &str = "PUBLIC_TABLE_NAME";
/// Environment variable for the shared fallback (administrative) table.
pub const FALLBACK_TABLE_ENV_VAR: &str = "FALLBACK_TABLE_NAME";
/// Environment variable for the private table name template.
pub const PRIVATE_TEMPLATE_ENV_VAR: &str = "PRIVATE_TABLE_TEMPLATE";
/// Environment variable enabling the in-memory store.
pub const LOCAL_STORE_ENV_VAR: &str = "USE_LOCAL_STORE";
/// Environment variable skipping the startup connectivity check.
pub const SKIP_CONNECTIVITY_ENV_VAR: &str = "SKIP_CONNECTIVITY_CHECK";
/// Environment variable for the store operation timeout.
pub const TIMEOUT_ENV_VAR: &str = "STORE_TIMEOUT_MS";

/// Placeholder substituted with the tenant id in name templates.
pub const TENANT_PLACEHOLDER: &str = "{tenant}";

/// STS bounds on `DurationSeconds`.
const MIN_SESSION_SECS: u32 = 900;
const MAX_SESSION_SECS: u32 = 43_200;

/// Main access layer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Region for store and STS clients (SDK default chain if unset).
    pub region: Option<String>,
    /// Endpoint override for the store client.
    pub endpoint_url: Option<String>,
    /// Store operation timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Role assumption settings.
    pub assume_role: AssumeRoleConfig,
    /// Table routing settings.
    pub tables: TableConfig,
    /// Serve everything from the in-memory store. Development only.
    pub use_local_store: bool,
    /// Skip the startup reachability check against the public table.
    pub skip_connectivity_check: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            region: None,
            endpoint_url: None,
            timeout_ms: None,
            assume_role: AssumeRoleConfig::default(),
            tables: TableConfig::default(),
            use_local_store: false,
            skip_connectivity_check: false,
        }
    }
}

/// Role assumption configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssumeRoleConfig {
    /// Role name in the target account. May contain `{tenant}`.
    pub role_name: String,
    /// Requested credential lifetime.
    pub session_duration_secs: u32,
}

impl Default for AssumeRoleConfig {
    fn default() -> Self {
        Self {
            role_name: "OpsConsoleCrossAccountAccess".to_string(),
            session_duration_secs: 3600,
        }
    }
}

impl AssumeRoleConfig {
    /// Role ARN for a tenant in a target cloud account.
    pub fn role_arn(&self, cloud_account_id: &str, tenant_account_id: &str) -> String {
        let role_name = self.role_name.replace(TENANT_PLACEHOLDER, tenant_account_id);
        format!("arn:aws:iam::{}:role/{}", cloud_account_id, role_name)
    }
}

/// Table routing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Shared table for public-tier tenants.
    pub public_table: String,
    /// Shared table for tenants pinned to local fallback.
    pub fallback_table: String,
    /// Dedicated table name for private-tier tenants.
    pub private_table_template: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            public_table: "ops-console".to_string(),
            fallback_table: "ops-console-admin".to_string(),
            private_table_template: "tenant-{tenant}-private".to_string(),
        }
    }
}

impl AccessConfig {
    /// Load configuration from file and environment, then validate.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let mut config: AccessConfig = config
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML document and validate it.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AccessConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Create config for testing: in-memory store, no connectivity check.
    pub fn for_test() -> Self {
        Self {
            use_local_store: true,
            skip_connectivity_check: true,
            ..Self::default()
        }
    }

    /// Apply flat deployment environment variables.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(region) = std::env::var(REGION_ENV_VAR) {
            self.region = Some(region);
        }
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV_VAR) {
            self.endpoint_url = Some(endpoint);
        }
        if let Ok(timeout) = std::env::var(TIMEOUT_ENV_VAR) {
            self.timeout_ms = Some(parse_env(TIMEOUT_ENV_VAR, &timeout)?);
        }
        if let Ok(role_name) = std::env::var(ROLE_NAME_ENV_VAR) {
            self.assume_role.role_name = role_name;
        }
        if let Ok(duration) = std::env::var(ROLE_DURATION_ENV_VAR) {
            self.assume_role.session_duration_secs = parse_env(ROLE_DURATION_ENV_VAR, &duration)?;
        }
        if let Ok(table) = std::env::var(PUBLIC_TABLE_ENV_VAR) {
            self.tables.public_table = table;
        }
        if let Ok(table) = std::env::var(FALLBACK_TABLE_ENV_VAR) {
            self.tables.fallback_table = table;
        }
        if let Ok(template) = std::env::var(PRIVATE_TEMPLATE_ENV_VAR) {
            self.tables.private_table_template = template;
        }
        if let Ok(flag) = std::env::var(LOCAL_STORE_ENV_VAR) {
            self.use_local_store = parse_flag(LOCAL_STORE_ENV_VAR, &flag)?;
        }
        if let Ok(flag) = std::env::var(SKIP_CONNECTIVITY_ENV_VAR) {
            self.skip_connectivity_check = parse_flag(SKIP_CONNECTIVITY_ENV_VAR, &flag)?;
        }
        Ok(())
    }

    /// Check invariants the rest of the layer relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tables.public_table.trim().is_empty() {
            return Err(ConfigError::Invalid("tables.public_table is empty".into()));
        }
        if self.tables.fallback_table.trim().is_empty() {
            return Err(ConfigError::Invalid("tables.fallback_table is empty".into()));
        }
        if !self
            .tables
            .private_table_template
            .contains(TENANT_PLACEHOLDER)
        {
            return Err(ConfigError::Invalid(format!(
                "tables.private_table_template must contain {}",
                TENANT_PLACEHOLDER
            )));
        }
        if self.assume_role.role_name.trim().is_empty() {
            return Err(ConfigError::Invalid("assume_role.role_name is empty".into()));
        }
        let secs = self.assume_role.session_duration_secs;
        if !(MIN_SESSION_SECS..=MAX_SESSION_SECS).contains(&secs) {
            return Err(ConfigError::Invalid(format!(
                "assume_role.session_duration_secs must be within {}..={}, got {}",
                MIN_SESSION_SECS, MAX_SESSION_SECS, secs
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv(name.to_string(), raw.to_string()))
}

fn parse_flag(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidEnv(name.to_string(), raw.to_string())),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for {0}: '{1}'")]
    InvalidEnv(String, String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
