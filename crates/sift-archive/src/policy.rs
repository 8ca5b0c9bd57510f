//! SaveDecision, the policy trait, and the factory registry.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::Value;

use sift_bus::packet::Packet;

use crate::config::ConfigError;
use crate::policies;

/// Verdict a policy renders for one packet.
///
/// DEFER stalls the recorder's buffer: the packet (and everything behind
/// it) is held until some later event resolves it to SAVE or DROP. A
/// policy that defers a packet must resolve it within its configured
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveDecision {
    Save,
    Drop,
    Defer,
}

/// A save policy's state machine.
///
/// All methods run under the owning recorder's mutex. `on_trigger` is
/// reached from a trigger thread, but only after that thread has taken
/// the same mutex.
pub trait PolicyKind: Send {
    /// A packet was accepted into the recorder buffer.
    fn on_packet(&mut self, _pkt: &Packet) {}

    /// A packet left the buffer, by save or by drop.
    fn on_drop(&mut self, _pkt: &Packet) {}

    /// An external trigger fired while this policy was enabled.
    fn on_trigger(&mut self) {}

    /// Verdict for `pkt`, always queried at the buffer head.
    fn should_save(&mut self, pkt: &Packet) -> SaveDecision;

    /// Whether control topics may never disable this policy.
    fn ignores_trigger_control(&self) -> bool {
        false
    }
}

type PolicyFactory = fn(&Value) -> Result<Box<dyn PolicyKind>, ConfigError>;

static REGISTRY: Lazy<HashMap<&'static str, PolicyFactory>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, PolicyFactory> = HashMap::new();
    m.insert("save_all", policies::save_all::make);
    m.insert("drop_all", policies::drop_all::make);
    m.insert("count", policies::count::make);
    m.insert("time", policies::time::make);
    m
});

/// Constructs a policy state machine by type name.
pub fn make_kind(type_name: &str, args: &Value) -> Result<Box<dyn PolicyKind>, ConfigError> {
    let factory = REGISTRY
        .get(type_name)
        .ok_or_else(|| ConfigError::UnknownPolicy(type_name.to_string()))?;
    factory(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_knows_the_reference_policies() {
        for name in ["save_all", "drop_all"] {
            assert!(make_kind(name, &Value::Null).is_ok(), "{name}");
        }
        assert!(make_kind("count", &json!({"save_prev": 2})).is_ok());
        assert!(make_kind("time", &json!({"save_prev": "1s"})).is_ok());
    }

    #[test]
    fn unknown_name_fails() {
        assert!(matches!(
            make_kind("zstd", &Value::Null),
            Err(ConfigError::UnknownPolicy(_))
        ));
    }
}
