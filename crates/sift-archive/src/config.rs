//! Config and rule model.
//!
//! The configuration document is JSON. Rules bind a protocol and topic
//! glob to a pipeline of policies; each rule's raw JSON is preserved
//! verbatim as its self-description for announcements. All validation
//! happens here at startup: unknown protocols, unknown policy or trigger
//! types, and malformed arguments all fail before any recorder exists.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use sift_bus::clock::TimeMono;
use sift_bus::units::{parse_duration, parse_filesize, UnitParseError};

use crate::{policy, trigger};

pub const DEFAULT_MAX_LOGFILE_SIZE: u64 = 128 * 1024 * 1024;
pub const DEFAULT_MAX_LOGFILE_DURATION: Duration = Duration::from_secs(60 * 60);

/// Packets older than now minus this are assumed to predate the archiver.
const START_TIME_BACKOFF: Duration = Duration::from_secs(30);

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Startup configuration failure. Any variant aborts startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' has wrong type: expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),
    #[error("unknown policy: {0}")]
    UnknownPolicy(String),
    #[error("unknown trigger: {0}")]
    UnknownTrigger(String),
    #[error("{context}: {source}")]
    InvalidUnit {
        context: &'static str,
        #[source]
        source: UnitParseError,
    },
    #[error("{type_name}: {reason}")]
    InvalidArgs { type_name: &'static str, reason: String },
    #[error("invalid glob '{pattern}': {reason}")]
    BadGlob { pattern: String, reason: String },
}

// ─── Protocol ───────────────────────────────────────────────────────────────

/// Substrate protocol a rule watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    File,
    Cfg,
    Log,
    Prpc,
    Pubsub,
    Rpc,
}

impl Protocol {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(Protocol::File),
            "cfg" => Some(Protocol::Cfg),
            "log" => Some(Protocol::Log),
            "prpc" => Some(Protocol::Prpc),
            "pubsub" => Some(Protocol::Pubsub),
            "rpc" => Some(Protocol::Rpc),
            _ => None,
        }
    }

    /// Watch-path template with a `{topic}` placeholder.
    ///
    /// Overridable through the environment so the archiver can follow a
    /// substrate deployment with non-default file layouts.
    pub fn template(self) -> String {
        let (var, default) = match self {
            Protocol::File => return "{topic}".to_string(),
            Protocol::Cfg => ("A0_TOPIC_TMPL_CFG", "{topic}.cfg.a0"),
            Protocol::Log => ("A0_TOPIC_TMPL_LOG", "{topic}.log.a0"),
            Protocol::Prpc => ("A0_TOPIC_TMPL_PRPC", "{topic}.prpc.a0"),
            Protocol::Pubsub => ("A0_TOPIC_TMPL_PUBSUB", "{topic}.pubsub.a0"),
            Protocol::Rpc => ("A0_TOPIC_TMPL_RPC", "{topic}.rpc.a0"),
        };
        std::env::var(var).unwrap_or_else(|_| default.to_string())
    }
}

/// Resolves a pub/sub topic name to its file under `root`.
pub fn topic_file(root: &Path, topic: &str) -> PathBuf {
    root.join(Protocol::Pubsub.template().replace("{topic}", topic))
}

// ─── Trigger / Policy configuration ─────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub type_name: String,
    pub args: Value,
    pub control_topic: Option<String>,
}

impl TriggerConfig {
    fn from_value(v: &Value) -> Result<Self, ConfigError> {
        let type_name = require_str(v, "type")?;
        let args = v.get("args").cloned().unwrap_or(Value::Null);
        trigger::check(&type_name, &args)?;
        Ok(TriggerConfig {
            type_name,
            args,
            control_topic: optional_str(v, "control_topic")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub type_name: String,
    pub args: Value,
    pub triggers: Vec<TriggerConfig>,
    pub trigger_control_topic: Option<String>,
}

impl PolicyConfig {
    fn from_value(v: &Value) -> Result<Self, ConfigError> {
        let type_name = require_str(v, "type")?;
        let args = v.get("args").cloned().unwrap_or(Value::Null);
        // Dry-construct to surface bad arguments at startup.
        policy::make_kind(&type_name, &args)?;

        let mut triggers = Vec::new();
        if let Some(list) = v.get("triggers") {
            let list = list.as_array().ok_or(ConfigError::WrongType {
                field: "triggers",
                expected: "array",
            })?;
            for t in list {
                triggers.push(TriggerConfig::from_value(t)?);
            }
        }
        Ok(PolicyConfig {
            type_name,
            args,
            triggers,
            trigger_control_topic: optional_str(v, "trigger_control_topic")?,
        })
    }
}

// ─── Rule ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Rule {
    pub protocol: Protocol,
    pub topic: String,
    pub policies: Vec<PolicyConfig>,
    pub max_logfile_size: Option<u64>,
    pub max_logfile_duration: Option<Duration>,
    pub trigger_control_topic: Option<String>,
    /// Raw rule JSON, echoed in announcements.
    pub self_description: Value,
}

impl Rule {
    pub fn from_value(v: &Value) -> Result<Self, ConfigError> {
        let protocol_str = require_str(v, "protocol")?;
        let protocol = Protocol::parse(&protocol_str)
            .ok_or_else(|| ConfigError::UnknownProtocol(protocol_str.clone()))?;
        let topic = require_str(v, "topic")?;

        let policy_list = v
            .get("policies")
            .ok_or(ConfigError::MissingField("policies"))?
            .as_array()
            .ok_or(ConfigError::WrongType {
                field: "policies",
                expected: "array",
            })?;
        let mut policies = Vec::new();
        for p in policy_list {
            policies.push(PolicyConfig::from_value(p)?);
        }

        let max_logfile_size = match optional_str(v, "max_logfile_size")? {
            Some(s) => Some(parse_filesize(&s).map_err(|source| ConfigError::InvalidUnit {
                context: "max_logfile_size",
                source,
            })?),
            None => None,
        };
        let max_logfile_duration = match optional_str(v, "max_logfile_duration")? {
            Some(s) => Some(parse_duration(&s).map_err(|source| ConfigError::InvalidUnit {
                context: "max_logfile_duration",
                source,
            })?),
            None => None,
        };

        Ok(Rule {
            protocol,
            topic,
            policies,
            max_logfile_size,
            max_logfile_duration,
            trigger_control_topic: optional_str(v, "trigger_control_topic")?,
            self_description: v.clone(),
        })
    }

    /// Watch path relative to the searchpath, topic substituted.
    pub fn relative_watch_path(&self) -> PathBuf {
        PathBuf::from(self.protocol.template().replace("{topic}", &self.topic))
    }
}

// ─── Config ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Config {
    pub searchpath: PathBuf,
    pub savepath: PathBuf,
    pub rules: Vec<Rule>,
    pub default_max_logfile_size: u64,
    pub default_max_logfile_duration: Duration,
    /// Packets with an older monotonic stamp are dropped at ingestion.
    pub start_time_mono: TimeMono,
}

impl Config {
    pub fn from_value(v: &Value, default_root: &Path) -> Result<Self, ConfigError> {
        let searchpath = match optional_str(v, "searchpath")? {
            Some(s) => PathBuf::from(s),
            None => default_root.to_path_buf(),
        };
        let savepath = PathBuf::from(require_str(v, "savepath")?);

        let rule_list = v
            .get("rules")
            .ok_or(ConfigError::MissingField("rules"))?
            .as_array()
            .ok_or(ConfigError::WrongType {
                field: "rules",
                expected: "array",
            })?;
        let mut rules = Vec::new();
        for r in rule_list {
            rules.push(Rule::from_value(r)?);
        }

        let default_max_logfile_size = match optional_str(v, "default_max_logfile_size")? {
            Some(s) => parse_filesize(&s).map_err(|source| ConfigError::InvalidUnit {
                context: "default_max_logfile_size",
                source,
            })?,
            None => DEFAULT_MAX_LOGFILE_SIZE,
        };
        let default_max_logfile_duration = match optional_str(v, "default_max_logfile_duration")? {
            Some(s) => parse_duration(&s).map_err(|source| ConfigError::InvalidUnit {
                context: "default_max_logfile_duration",
                source,
            })?,
            None => DEFAULT_MAX_LOGFILE_DURATION,
        };

        let start_time_mono = match v.get("start_time_mono") {
            None => TimeMono::now().saturating_sub(START_TIME_BACKOFF),
            Some(Value::String(s)) => TimeMono::parse(s).map_err(|_| ConfigError::WrongType {
                field: "start_time_mono",
                expected: "decimal nanoseconds",
            })?,
            Some(Value::Number(n)) => {
                TimeMono::from_nanos(n.as_u64().ok_or(ConfigError::WrongType {
                    field: "start_time_mono",
                    expected: "decimal nanoseconds",
                })?)
            }
            Some(_) => {
                return Err(ConfigError::WrongType {
                    field: "start_time_mono",
                    expected: "decimal nanoseconds",
                })
            }
        };

        Ok(Config {
            searchpath,
            savepath,
            rules,
            default_max_logfile_size,
            default_max_logfile_duration,
            start_time_mono,
        })
    }

    pub fn from_json_str(s: &str, default_root: &Path) -> Result<Self, ConfigError> {
        let v: Value = serde_json::from_str(s).map_err(|e| ConfigError::InvalidArgs {
            type_name: "config",
            reason: e.to_string(),
        })?;
        Self::from_value(&v, default_root)
    }
}

// ─── JSON helpers ───────────────────────────────────────────────────────────

fn require_str(v: &Value, field: &'static str) -> Result<String, ConfigError> {
    v.get(field)
        .ok_or(ConfigError::MissingField(field))?
        .as_str()
        .map(str::to_string)
        .ok_or(ConfigError::WrongType {
            field,
            expected: "string",
        })
}

fn optional_str(v: &Value, field: &'static str) -> Result<Option<String>, ConfigError> {
    match v.get(field) {
        None => Ok(None),
        Some(val) => val
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or(ConfigError::WrongType {
                field,
                expected: "string",
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root() -> PathBuf {
        PathBuf::from("/tmp/sift-root")
    }

    #[test]
    fn minimal_config_applies_defaults() {
        let v = json!({
            "savepath": "/data/archive",
            "rules": [{
                "protocol": "pubsub",
                "topic": "cam/*",
                "policies": [{"type": "save_all"}],
            }],
        });
        let config = Config::from_value(&v, &root()).unwrap();
        assert_eq!(config.searchpath, root());
        assert_eq!(config.default_max_logfile_size, 128 * 1024 * 1024);
        assert_eq!(
            config.default_max_logfile_duration,
            Duration::from_secs(3600)
        );
        assert_eq!(config.rules.len(), 1);
        assert_eq!(
            config.rules[0].relative_watch_path(),
            PathBuf::from("cam/*.pubsub.a0")
        );
    }

    #[test]
    fn explicit_limits_parse_units() {
        let v = json!({
            "savepath": "/data/archive",
            "default_max_logfile_size": "4KiB",
            "default_max_logfile_duration": "90s",
            "start_time_mono": "123456",
            "rules": [],
        });
        let config = Config::from_value(&v, &root()).unwrap();
        assert_eq!(config.default_max_logfile_size, 4096);
        assert_eq!(config.default_max_logfile_duration, Duration::from_secs(90));
        assert_eq!(config.start_time_mono.as_nanos(), 123_456);
    }

    #[test]
    fn missing_savepath_is_an_error() {
        let v = json!({"rules": []});
        assert!(matches!(
            Config::from_value(&v, &root()),
            Err(ConfigError::MissingField("savepath"))
        ));
    }

    #[test]
    fn unknown_protocol_is_an_error() {
        let v = json!({
            "savepath": "/data",
            "rules": [{"protocol": "carrier-pigeon", "topic": "t", "policies": []}],
        });
        assert!(matches!(
            Config::from_value(&v, &root()),
            Err(ConfigError::UnknownProtocol(_))
        ));
    }

    #[test]
    fn unknown_policy_is_an_error() {
        let v = json!({
            "savepath": "/data",
            "rules": [{
                "protocol": "pubsub",
                "topic": "t",
                "policies": [{"type": "save_some"}],
            }],
        });
        assert!(matches!(
            Config::from_value(&v, &root()),
            Err(ConfigError::UnknownPolicy(_))
        ));
    }

    #[test]
    fn unknown_trigger_is_an_error() {
        let v = json!({
            "savepath": "/data",
            "rules": [{
                "protocol": "pubsub",
                "topic": "t",
                "policies": [{
                    "type": "save_all",
                    "triggers": [{"type": "tarot", "args": {}}],
                }],
            }],
        });
        assert!(matches!(
            Config::from_value(&v, &root()),
            Err(ConfigError::UnknownTrigger(_))
        ));
    }

    #[test]
    fn count_policy_requires_a_window_arg() {
        let v = json!({
            "savepath": "/data",
            "rules": [{
                "protocol": "pubsub",
                "topic": "t",
                "policies": [{"type": "count", "args": {}}],
            }],
        });
        assert!(matches!(
            Config::from_value(&v, &root()),
            Err(ConfigError::InvalidArgs { .. })
        ));
    }

    #[test]
    fn rate_trigger_rejects_hz_and_period_together() {
        let v = json!({
            "savepath": "/data",
            "rules": [{
                "protocol": "pubsub",
                "topic": "t",
                "policies": [{
                    "type": "save_all",
                    "triggers": [{"type": "rate", "args": {"hz": 1.0, "period": 2.0}}],
                }],
            }],
        });
        assert!(matches!(
            Config::from_value(&v, &root()),
            Err(ConfigError::InvalidArgs { .. })
        ));
    }

    #[test]
    fn rule_preserves_self_description() {
        let rule_json = json!({
            "protocol": "file",
            "topic": "raw/**",
            "policies": [{"type": "drop_all"}],
            "note": "kept verbatim",
        });
        let rule = Rule::from_value(&rule_json).unwrap();
        assert_eq!(rule.self_description, rule_json);
        assert_eq!(rule.relative_watch_path(), PathBuf::from("raw/**"));
    }
}
