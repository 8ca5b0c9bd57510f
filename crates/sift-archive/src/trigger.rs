//! Trigger trait, factory registry, and the gated fire wrapper.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::config::ConfigError;
use crate::gate::ControlFlag;
use crate::triggers;

/// A running trigger instance.
///
/// A trigger is autonomous: it fires its callback until dropped. Dropping
/// must be prompt: background threads are signalled and joined,
/// subscriptions torn down.
pub trait Trigger: Send {}

/// Callback invoked on every (enabled) fire.
pub type Notify = Arc<dyn Fn() + Send + Sync>;

/// Everything a trigger needs beyond its own arguments.
pub struct TriggerRuntime {
    notify: Notify,
    flag: Arc<ControlFlag>,
    /// Substrate root, for triggers that subscribe to topics.
    pub root: PathBuf,
}

impl TriggerRuntime {
    pub fn new(notify: Notify, flag: Arc<ControlFlag>, root: PathBuf) -> Self {
        TriggerRuntime { notify, flag, root }
    }

    /// Fires the callback unless the trigger's gate has it disabled.
    ///
    /// The underlying timer or subscription keeps running either way;
    /// disabling only suppresses delivery.
    pub fn fire(&self) {
        if self.flag.is_enabled() {
            (self.notify)();
        }
    }
}

struct TriggerDef {
    check: fn(&Value) -> Result<(), ConfigError>,
    build: fn(&Value, TriggerRuntime) -> Result<Box<dyn Trigger>, ConfigError>,
}

static REGISTRY: Lazy<HashMap<&'static str, TriggerDef>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "rate",
        TriggerDef {
            check: triggers::rate::check,
            build: triggers::rate::build,
        },
    );
    m.insert(
        "cron",
        TriggerDef {
            check: triggers::cron::check,
            build: triggers::cron::build,
        },
    );
    m.insert(
        "pubsub",
        TriggerDef {
            check: triggers::pubsub::check,
            build: triggers::pubsub::build,
        },
    );
    m
});

fn def(type_name: &str) -> Result<&'static TriggerDef, ConfigError> {
    REGISTRY
        .get(type_name)
        .ok_or_else(|| ConfigError::UnknownTrigger(type_name.to_string()))
}

/// Validates trigger arguments without starting anything.
pub fn check(type_name: &str, args: &Value) -> Result<(), ConfigError> {
    (def(type_name)?.check)(args)
}

/// Builds and starts a trigger by type name.
pub fn build(
    type_name: &str,
    args: &Value,
    notify: Notify,
    flag: Arc<ControlFlag>,
    root: &Path,
) -> Result<Box<dyn Trigger>, ConfigError> {
    (def(type_name)?.build)(args, TriggerRuntime::new(notify, flag, root.to_path_buf()))
}
