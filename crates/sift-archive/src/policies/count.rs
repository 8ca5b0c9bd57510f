//! Saves a count window of packets around each trigger.
//!
//! `save_prev` packets before and `save_next` packets after a trigger are
//! marked for saving. The mark set is authoritative: `should_save` never
//! defers, so this policy only retains pre-trigger packets when a
//! deferring policy elsewhere in the pipeline is holding the buffer open.

use std::collections::{HashSet, VecDeque};

use serde::Deserialize;
use serde_json::Value;

use sift_bus::packet::Packet;

use crate::config::ConfigError;
use crate::policy::{PolicyKind, SaveDecision};

#[derive(Debug, Deserialize)]
struct Args {
    save_prev: Option<u64>,
    save_next: Option<u64>,
}

pub struct CountPolicy {
    save_prev: usize,
    save_next: u64,
    next_remaining: u64,
    history: VecDeque<Packet>,
    to_save: HashSet<Packet>,
}

pub(crate) fn make(args: &Value) -> Result<Box<dyn PolicyKind>, ConfigError> {
    let args: Args = serde_json::from_value(args.clone()).map_err(|e| ConfigError::InvalidArgs {
        type_name: "count",
        reason: e.to_string(),
    })?;
    if args.save_prev.is_none() && args.save_next.is_none() {
        return Err(ConfigError::InvalidArgs {
            type_name: "count",
            reason: "missing at least one of 'save_prev' or 'save_next'".into(),
        });
    }
    Ok(Box::new(CountPolicy {
        save_prev: args.save_prev.unwrap_or(0) as usize,
        save_next: args.save_next.unwrap_or(0),
        next_remaining: 0,
        history: VecDeque::new(),
        to_save: HashSet::new(),
    }))
}

impl PolicyKind for CountPolicy {
    fn on_packet(&mut self, pkt: &Packet) {
        if self.next_remaining > 0 {
            self.to_save.insert(pkt.clone());
            self.next_remaining -= 1;
        }
        self.history.push_back(pkt.clone());
        if self.history.len() > self.save_prev {
            self.history.pop_front();
        }
    }

    fn on_drop(&mut self, pkt: &Packet) {
        self.to_save.remove(pkt);
    }

    fn on_trigger(&mut self) {
        self.next_remaining = self.save_next;
        self.to_save.extend(self.history.iter().cloned());
    }

    fn should_save(&mut self, pkt: &Packet) -> SaveDecision {
        if self.to_save.contains(pkt) {
            SaveDecision::Save
        } else {
            SaveDecision::Drop
        }
    }
}
