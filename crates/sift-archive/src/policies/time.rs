//! Saves a time window of packets around each trigger.
//!
//! Each trigger records a monotonic instant; a packet is saved when its
//! stamp falls inside `[T - save_prev, T + save_next]` for any recorded
//! trigger `T`. A packet too recent to rule out a future trigger is
//! deferred, which stalls the recorder buffer behind it. The defer window
//! for any packet is bounded by `save_prev`.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use sift_bus::clock::TimeMono;
use sift_bus::packet::Packet;
use sift_bus::units::parse_duration;

use crate::config::ConfigError;
use crate::policy::{PolicyKind, SaveDecision};

#[derive(Debug, Deserialize)]
struct Args {
    save_prev: Option<String>,
    save_next: Option<String>,
}

pub struct TimePolicy {
    save_prev: Duration,
    save_next: Duration,
    trigger_tss: VecDeque<TimeMono>,
    pkt_tss: VecDeque<(Packet, TimeMono)>,
    /// Injected in tests; `TimeMono::now` in production.
    now: fn() -> TimeMono,
}

pub(crate) fn make(args: &Value) -> Result<Box<dyn PolicyKind>, ConfigError> {
    Ok(Box::new(TimePolicy::from_args(args, TimeMono::now)?))
}

impl TimePolicy {
    fn from_args(args: &Value, now: fn() -> TimeMono) -> Result<Self, ConfigError> {
        let args: Args =
            serde_json::from_value(args.clone()).map_err(|e| ConfigError::InvalidArgs {
                type_name: "time",
                reason: e.to_string(),
            })?;
        if args.save_prev.is_none() && args.save_next.is_none() {
            return Err(ConfigError::InvalidArgs {
                type_name: "time",
                reason: "missing at least one of 'save_prev' or 'save_next'".into(),
            });
        }
        let parse = |field: Option<&String>| -> Result<Duration, ConfigError> {
            match field {
                None => Ok(Duration::ZERO),
                Some(s) => parse_duration(s).map_err(|source| ConfigError::InvalidUnit {
                    context: "time policy window",
                    source,
                }),
            }
        };
        Ok(TimePolicy {
            save_prev: parse(args.save_prev.as_ref())?,
            save_next: parse(args.save_next.as_ref())?,
            trigger_tss: VecDeque::new(),
            pkt_tss: VecDeque::new(),
            now,
        })
    }
}

impl PolicyKind for TimePolicy {
    fn on_packet(&mut self, pkt: &Packet) {
        // Packets without a parseable monotonic stamp are invisible here.
        if let Some(ts) = pkt.time_mono() {
            self.pkt_tss.push_back((pkt.clone(), ts));
        }
    }

    fn on_drop(&mut self, pkt: &Packet) {
        if self.pkt_tss.front().is_some_and(|(head, _)| head == pkt) {
            self.pkt_tss.pop_front();
        }
    }

    fn on_trigger(&mut self) {
        self.trigger_tss.push_back((self.now)());
    }

    fn should_save(&mut self, pkt: &Packet) -> SaveDecision {
        let ts = match self.pkt_tss.front() {
            Some((head, ts)) if head == pkt => *ts,
            // The recorder drains from the head; anything else is a
            // packet this policy never saw.
            _ => return SaveDecision::Drop,
        };

        // Triggers too old to cover the head can never cover a later
        // packet either.
        while self
            .trigger_tss
            .front()
            .is_some_and(|t| t.saturating_add(self.save_next) < ts)
        {
            self.trigger_tss.pop_front();
        }

        for t in &self.trigger_tss {
            if t.saturating_sub(self.save_prev) <= ts && ts <= t.saturating_add(self.save_next) {
                return SaveDecision::Save;
            }
        }

        // A future trigger could still reach back to this packet.
        if (self.now)() < ts.saturating_add(self.save_prev) {
            return SaveDecision::Defer;
        }
        SaveDecision::Drop
    }
}
