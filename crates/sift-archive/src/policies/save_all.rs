//! Saves every packet unconditionally.

use serde::Deserialize;
use serde_json::Value;

use sift_bus::packet::Packet;

use crate::config::ConfigError;
use crate::policy::{PolicyKind, SaveDecision};

#[derive(Debug, Default, Deserialize)]
struct Args {
    #[serde(default)]
    ignore_trigger_control: bool,
}

pub struct SaveAllPolicy {
    ignore_trigger_control: bool,
}

pub(crate) fn make(args: &Value) -> Result<Box<dyn PolicyKind>, ConfigError> {
    let args: Args = match args {
        Value::Null => Args::default(),
        v => serde_json::from_value(v.clone()).map_err(|e| ConfigError::InvalidArgs {
            type_name: "save_all",
            reason: e.to_string(),
        })?,
    };
    Ok(Box::new(SaveAllPolicy {
        ignore_trigger_control: args.ignore_trigger_control,
    }))
}

impl PolicyKind for SaveAllPolicy {
    fn should_save(&mut self, _pkt: &Packet) -> SaveDecision {
        SaveDecision::Save
    }

    fn ignores_trigger_control(&self) -> bool {
        self.ignore_trigger_control
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn always_saves() {
        let mut p = make(&Value::Null).unwrap();
        let pkt = Packet::new(vec![], "");
        assert_eq!(p.should_save(&pkt), SaveDecision::Save);
        assert!(!p.ignores_trigger_control());
    }

    #[test]
    fn can_opt_out_of_gating() {
        let p = make(&json!({"ignore_trigger_control": true})).unwrap();
        assert!(p.ignores_trigger_control());
    }
}
