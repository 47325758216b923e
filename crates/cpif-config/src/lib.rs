use cpif_logging::LogFormat;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/tmp/conf/upf.json";

/// Configuration error
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// How the supervisor restarts after losing the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartMode {
    /// Drop all state and register again within the same process
    #[default]
    InProcess,
    /// Replace the process image with a fresh copy of the binary
    ReExec,
}

/// Agent configuration
///
/// Accepts the `upf.json` layout: `max_sessions` plus a `cpiface` section.
/// The remaining sections are optional.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AgentConfig {
    #[validate(range(min = 1))]
    pub max_sessions: u32,

    #[validate(nested)]
    pub cpiface: CpIfaceConfig,

    #[serde(default)]
    #[validate(nested)]
    pub dataplane: DataplaneConfig,

    #[serde(default)]
    #[validate(nested)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    #[validate(nested)]
    pub logging: LoggingConfig,

    /// Port of the `/metrics` endpoint, 0 disables it
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Control-plane interface addressing
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CpIfaceConfig {
    /// Control plane address (registration and response sink)
    pub zmqd_nb_ip: Ipv4Addr,

    #[serde(default = "default_nb_port")]
    #[validate(range(min = 1))]
    pub zmqd_nb_port: u16,

    /// Local communication address; directives are received here
    pub zmqd_ip: Ipv4Addr,

    #[serde(default = "default_recv_port")]
    #[validate(range(min = 1))]
    pub zmqd_recv_port: u16,

    /// S1-U address used as the GTP-U tunnel source
    pub s1u_sgw_ip: Ipv4Addr,

    /// Node name announced to the control plane; empty uses the system hostname
    #[serde(default)]
    #[validate(custom(function = "validate_hostname"))]
    pub hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DataplaneConfig {
    /// gRPC endpoint of the dataplane rule service
    #[validate(length(min = 1))]
    pub endpoint: String,

    #[validate(range(min = 1))]
    pub rpc_timeout_ms: u64,

    #[validate(length(min = 1))]
    pub pdr_lookup: String,

    #[validate(length(min = 1))]
    pub far_lookup: String,

    /// Base name of the QoS counter modules (`Pre`, `PostUL`, `PostDL` prefixed)
    #[validate(length(min = 1))]
    pub qos_counter: String,

    /// Module RemoveAll is addressed to
    #[validate(length(min = 1))]
    pub encap: String,
}

impl Default for DataplaneConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:10514".to_string(),
            rpc_timeout_ms: 2000,
            pdr_lookup: "pdrLookup".to_string(),
            far_lookup: "farLookup".to_string(),
            qos_counter: "QoSCounter".to_string(),
            encap: "gtpuEncap".to_string(),
        }
    }
}

impl DataplaneConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Receive timeout of one poll iteration
    #[validate(range(min = 1))]
    pub poll_timeout_ms: u64,

    /// Silence after which the control plane is considered lost
    #[validate(range(min = 1))]
    pub liveness_timeout_secs: u64,

    #[validate(range(min = 1))]
    pub registration_timeout_ms: u64,

    pub restart_mode: RestartMode,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 1000,
            liveness_timeout_secs: 3,
            registration_timeout_ms: 5000,
            restart_mode: RestartMode::InProcess,
        }
    }
}

impl SupervisorConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    #[validate(length(min = 1))]
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_nb_port() -> u16 {
    1111
}

fn default_recv_port() -> u16 {
    20
}

fn validate_hostname(hostname: &str) -> Result<(), ValidationError> {
    // one byte is kept for the terminator on the wire
    if hostname.len() >= 64 {
        return Err(ValidationError::new("hostname_too_long"));
    }
    Ok(())
}

/// Load configuration from file, overridden by `CPIF__`-prefixed environment
/// variables (e.g. `CPIF__SUPERVISOR__POLL_TIMEOUT_MS`)
pub fn load_config<T>(path: &str) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    let config: T = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(
            config::Environment::with_prefix("CPIF")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ConfigError::LoadError(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::LoadError(e.to_string()))?;

    validate(&config)?;
    Ok(config)
}

/// Load configuration from YAML string (for testing)
pub fn load_from_yaml<T>(yaml: &str) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    let config: T =
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::LoadError(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}

/// Load configuration from JSON string
pub fn load_from_json<T>(json: &str) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    let config: T =
        serde_json::from_str(json).map_err(|e| ConfigError::LoadError(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}

/// Re-run validation, e.g. after command line overrides
pub fn validate<T: Validate>(config: &T) -> Result<(), ConfigError> {
    config
        .validate()
        .map_err(|e| ConfigError::ValidationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPF_JSON: &str = r#"{
        "max_sessions": 50000,
        "cpiface": {
            "zmqd_nb_ip": "172.17.0.3",
            "zmqd_ip": "172.17.0.2",
            "s1u_sgw_ip": "11.1.1.1",
            "hostname": "upf-0"
        }
    }"#;

    #[test]
    fn test_load_upf_json_layout() {
        let config: AgentConfig = load_from_json(UPF_JSON).unwrap();
        assert_eq!(config.max_sessions, 50000);
        assert_eq!(config.cpiface.zmqd_nb_ip, Ipv4Addr::new(172, 17, 0, 3));
        assert_eq!(config.cpiface.zmqd_nb_port, 1111);
        assert_eq!(config.cpiface.zmqd_recv_port, 20);
        assert_eq!(config.cpiface.hostname, "upf-0");

        // optional sections fall back to defaults
        assert_eq!(config.supervisor.poll_timeout(), Duration::from_secs(1));
        assert_eq!(config.supervisor.liveness_timeout(), Duration::from_secs(3));
        assert_eq!(config.supervisor.restart_mode, RestartMode::InProcess);
        assert_eq!(config.dataplane.qos_counter, "QoSCounter");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.metrics_port, 9090);
    }

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
max_sessions: 4
cpiface:
  zmqd_nb_ip: 127.0.0.1
  zmqd_ip: 127.0.0.1
  s1u_sgw_ip: 10.0.0.1
supervisor:
  liveness_timeout_secs: 10
  restart_mode: re_exec
logging:
  level: debug
  format: plain
"#;
        let config: AgentConfig = load_from_yaml(yaml).unwrap();
        assert_eq!(config.supervisor.liveness_timeout_secs, 10);
        assert_eq!(config.supervisor.poll_timeout_ms, 1000);
        assert_eq!(config.supervisor.restart_mode, RestartMode::ReExec);
        assert_eq!(config.logging.format, LogFormat::Plain);
        assert!(config.cpiface.hostname.is_empty());
    }

    #[test]
    fn test_validation_error() {
        let yaml = r#"
max_sessions: 0
cpiface:
  zmqd_nb_ip: 127.0.0.1
  zmqd_ip: 127.0.0.1
  s1u_sgw_ip: 10.0.0.1
"#;
        let result: Result<AgentConfig, _> = load_from_yaml(yaml);
        match result {
            Err(ConfigError::ValidationError(_)) => (), // Expected
            _ => panic!("Expected ValidationError"),
        }
    }

    #[test]
    fn test_hostname_too_long() {
        let mut config: AgentConfig = load_from_json(UPF_JSON).unwrap();
        config.cpiface.hostname = "h".repeat(64);
        assert!(matches!(
            validate(&config),
            Err(ConfigError::ValidationError(_))
        ));

        config.cpiface.hostname = "h".repeat(63);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_load_config_file_with_env_override() {
        let path = std::env::temp_dir().join(format!("cpif-config-{}.json", std::process::id()));
        std::fs::write(&path, UPF_JSON).unwrap();

        std::env::set_var("CPIF__SUPERVISOR__POLL_TIMEOUT_MS", "250");
        let result: Result<AgentConfig, _> = load_config(path.to_str().unwrap());
        std::env::remove_var("CPIF__SUPERVISOR__POLL_TIMEOUT_MS");
        std::fs::remove_file(&path).unwrap();

        let config = result.unwrap();
        assert_eq!(config.max_sessions, 50000);
        assert_eq!(config.cpiface.s1u_sgw_ip, Ipv4Addr::new(11, 1, 1, 1));
        assert_eq!(config.supervisor.poll_timeout_ms, 250);
    }

    #[test]
    fn test_missing_file() {
        let result: Result<AgentConfig, _> = load_config("/nonexistent/upf.json");
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }
}
