//! Drops every packet unconditionally.
//!
//! Useful as a pipeline stub while tuning rules, and as the simplest
//! possible policy for tests.

use serde_json::Value;

use sift_bus::packet::Packet;

use crate::config::ConfigError;
use crate::policy::{PolicyKind, SaveDecision};

pub struct DropAllPolicy;

pub(crate) fn make(_args: &Value) -> Result<Box<dyn PolicyKind>, ConfigError> {
    Ok(Box::new(DropAllPolicy))
}

impl PolicyKind for DropAllPolicy {
    fn should_save(&mut self, _pkt: &Packet) -> SaveDecision {
        SaveDecision::Drop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_drops() {
        let mut p = make(&Value::Null).unwrap();
        assert_eq!(p.should_save(&Packet::new(vec![], "")), SaveDecision::Drop);
    }
}
