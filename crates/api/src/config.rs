//! Process configuration read from the environment (and `.env`, if present).

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use feeledger_infra::LockPolicy;
use feeledger_observability::LogFormat;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub lock_policy: LockPolicy,
    /// JSON array of students to seed the in-memory directory with.
    pub students_file: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl ApiConfig {
    /// Read `FEELEDGER_*` variables, loading `.env` first when one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = get("FEELEDGER_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "FEELEDGER_BIND_ADDR",
                reason: e.to_string(),
            })?;

        let lock_policy = match get("FEELEDGER_LOCK_POLICY") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                var: "FEELEDGER_LOCK_POLICY",
                reason,
            })?,
            None => LockPolicy::default(),
        };

        let log_format = match get("FEELEDGER_LOG_FORMAT") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                var: "FEELEDGER_LOG_FORMAT",
                reason,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind_addr,
            lock_policy,
            students_file: get("FEELEDGER_STUDENTS_FILE").map(PathBuf::from),
            log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ApiConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR.parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.lock_policy, LockPolicy::GoodFaith);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.students_file, None);
    }

    #[test]
    fn reads_every_variable() {
        let cfg = config(&[
            ("FEELEDGER_BIND_ADDR", "127.0.0.1:9000"),
            ("FEELEDGER_LOCK_POLICY", "all_settled"),
            ("FEELEDGER_STUDENTS_FILE", "/tmp/students.json"),
            ("FEELEDGER_LOG_FORMAT", "pretty"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.lock_policy, LockPolicy::AllSettled);
        assert_eq!(cfg.students_file, Some(PathBuf::from("/tmp/students.json")));
        assert_eq!(cfg.log_format, LogFormat::Pretty);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            config(&[("FEELEDGER_LOCK_POLICY", "strict")]),
            Err(ConfigError::Invalid { var: "FEELEDGER_LOCK_POLICY", .. })
        ));
        assert!(matches!(
            config(&[("FEELEDGER_BIND_ADDR", "not-an-addr")]),
            Err(ConfigError::Invalid { var: "FEELEDGER_BIND_ADDR", .. })
        ));
        assert!(matches!(
            config(&[("FEELEDGER_LOG_FORMAT", "xml")]),
            Err(ConfigError::Invalid { var: "FEELEDGER_LOG_FORMAT", .. })
        ));
    }
}
