//! Runtime configuration model.

use serde::{Deserialize, Serialize};

/// Main configuration structure for conflux.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Deployment environment tag; part of every stored document id.
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub itsm: ItsmConfig,

    #[serde(default)]
    pub snmp: SnmpConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Payload fields split into `field__subkey` entries before logging.
    #[serde(default)]
    pub csv_fields: Vec<CsvFieldRule>,
}

fn default_environment() -> String {
    "dev".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            database: DatabaseConfig::default(),
            http: HttpConfig::default(),
            store: StoreConfig::default(),
            itsm: ItsmConfig::default(),
            snmp: SnmpConfig::default(),
            worker: WorkerConfig::default(),
            retention: RetentionConfig::default(),
            logging: LoggingConfig::default(),
            csv_fields: vec![],
        }
    }
}

/// SQLite database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".conflux/conflux.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// HTTP ingress configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpConfig {
    #[serde(default = "default_http_bind")]
    pub bind: String,
}

fn default_http_bind() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind: default_http_bind() }
    }
}

/// Document store (Elasticsearch-compatible) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_call_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_index_replicas")]
    pub index_replicas: u32,

    #[serde(default = "default_total_fields_limit")]
    pub total_fields_limit: u32,

    #[serde(default = "default_asset_mapping_index")]
    pub asset_mapping_index: String,

    #[serde(default = "default_asset_mapping_policy")]
    pub asset_mapping_policy: String,

    #[serde(default = "default_main_pipeline")]
    pub main_pipeline: String,
}

fn default_store_url() -> String {
    "http://localhost:9200".to_string()
}

const fn default_call_timeout_secs() -> u64 {
    300
}

const fn default_index_replicas() -> u32 {
    1
}

const fn default_total_fields_limit() -> u32 {
    1000
}

fn default_asset_mapping_index() -> String {
    "conflux-asset-mapping".to_string()
}

fn default_asset_mapping_policy() -> String {
    "conflux-asset-mapping-policy".to_string()
}

fn default_main_pipeline() -> String {
    "event-pipeline".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            username: None,
            password: None,
            timeout_secs: default_call_timeout_secs(),
            index_replicas: default_index_replicas(),
            total_fields_limit: default_total_fields_limit(),
            asset_mapping_index: default_asset_mapping_index(),
            asset_mapping_policy: default_asset_mapping_policy(),
            main_pipeline: default_main_pipeline(),
        }
    }
}

/// External ITSM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ItsmConfig {
    #[serde(default = "default_itsm_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub app_token: String,

    #[serde(default)]
    pub user_token: String,

    #[serde(default = "default_call_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_itsm_base_url() -> String {
    "http://localhost:8080/apirest.php".to_string()
}

impl Default for ItsmConfig {
    fn default() -> Self {
        Self {
            base_url: default_itsm_base_url(),
            app_token: String::new(),
            user_token: String::new(),
            timeout_secs: default_call_timeout_secs(),
        }
    }
}

/// SNMP trap listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SnmpConfig {
    #[serde(default = "default_snmp_bind")]
    pub bind: String,

    /// Optional JSON file with extra OID-to-symbol mappings.
    #[serde(default)]
    pub mib_file: Option<String>,
}

fn default_snmp_bind() -> String {
    "0.0.0.0:162".to_string()
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            bind: default_snmp_bind(),
            mib_file: None,
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Lease on a claimed entity row; expired leases are stealable.
    #[serde(default = "default_lock_lease_secs")]
    pub lock_lease_secs: u64,
}

const fn default_poll_interval_secs() -> u64 {
    2
}

const fn default_batch_size() -> u32 {
    16
}

const fn default_lock_lease_secs() -> u64 {
    120
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            lock_lease_secs: default_lock_lease_secs(),
        }
    }
}

/// Purge retention windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetentionConfig {
    /// Days completed events and orphan ingress logs are kept in the db.
    #[serde(default = "default_event_days")]
    pub event_days: u32,

    /// Days event indices are kept in the store.
    #[serde(default = "default_index_days")]
    pub index_days: u32,
}

const fn default_event_days() -> u32 {
    30
}

const fn default_index_days() -> u32 {
    365
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            event_days: default_event_days(),
            index_days: default_index_days(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// One payload field to expand: `host=a;svc=b` style values become
/// `field__host` / `field__svc` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CsvFieldRule {
    pub field: String,

    #[serde(default = "default_item_separator")]
    pub item_separator: String,

    #[serde(default = "default_kv_separator")]
    pub kv_separator: String,
}

fn default_item_separator() -> String {
    ";".to_string()
}

fn default_kv_separator() -> String {
    ":".to_string()
}
