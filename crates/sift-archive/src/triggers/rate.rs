//! Fixed-rate timer trigger.
//!
//! Fires immediately on start and then once per period until dropped.
//! Accepts exactly one of `hz` (between once an hour and 200/s) or
//! `period` in seconds (up to an hour).

use std::thread::JoinHandle;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use sift_bus::sync::{shutdown_channel, ShutdownHandle};

use crate::config::ConfigError;
use crate::trigger::{Trigger, TriggerRuntime};

const MIN_HZ: f64 = 1.0 / 3600.0;
const MAX_HZ: f64 = 200.0;

#[derive(Debug, Deserialize)]
struct Args {
    hz: Option<f64>,
    period: Option<f64>,
}

fn parse_period(args: &Value) -> Result<Duration, ConfigError> {
    let args: Args = serde_json::from_value(args.clone()).map_err(|e| ConfigError::InvalidArgs {
        type_name: "rate",
        reason: e.to_string(),
    })?;
    let invalid = |reason: String| ConfigError::InvalidArgs {
        type_name: "rate",
        reason,
    };
    match (args.hz, args.period) {
        (None, None) => Err(invalid("missing one of 'hz' or 'period'".into())),
        (Some(_), Some(_)) => Err(invalid("cannot provide both 'hz' and 'period'".into())),
        (Some(hz), None) => {
            if !(MIN_HZ..=MAX_HZ).contains(&hz) {
                return Err(invalid(format!(
                    "hz must be between once an hour and {MAX_HZ}/s, got {hz}"
                )));
            }
            Ok(Duration::from_nanos((1e9 / hz) as u64))
        }
        (None, Some(period)) => {
            if !(period > 0.0 && period <= 3600.0) {
                return Err(invalid(format!(
                    "period must be in (0, 3600] seconds, got {period}"
                )));
            }
            Ok(Duration::from_nanos((period * 1e9) as u64))
        }
    }
}

pub(crate) fn check(args: &Value) -> Result<(), ConfigError> {
    parse_period(args).map(|_| ())
}

pub(crate) fn build(args: &Value, rt: TriggerRuntime) -> Result<Box<dyn Trigger>, ConfigError> {
    let period = parse_period(args)?;
    let (shutdown, listener) = shutdown_channel();
    let handle = std::thread::Builder::new()
        .name("trigger-rate".into())
        .spawn(move || loop {
            rt.fire();
            if listener.wait_timeout(period) {
                return;
            }
        })
        .map_err(|e| ConfigError::InvalidArgs {
            type_name: "rate",
            reason: format!("failed to spawn timer thread: {e}"),
        })?;
    Ok(Box::new(RateTrigger {
        shutdown: Some(shutdown),
        handle: Some(handle),
    }))
}

pub struct RateTrigger {
    shutdown: Option<ShutdownHandle>,
    handle: Option<JoinHandle<()>>,
}

impl Trigger for RateTrigger {}

impl Drop for RateTrigger {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::ControlFlag;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn arg_validation() {
        assert!(parse_period(&json!({"hz": 10.0})).is_ok());
        assert!(parse_period(&json!({"period": 0.5})).is_ok());
        assert!(parse_period(&json!({})).is_err());
        assert!(parse_period(&json!({"hz": 1.0, "period": 1.0})).is_err());
        assert!(parse_period(&json!({"hz": 500.0})).is_err());
        assert!(parse_period(&json!({"hz": 0.0001})).is_err());
        assert!(parse_period(&json!({"period": 0.0})).is_err());
        assert!(parse_period(&json!({"period": 7200.0})).is_err());
    }

    #[test]
    fn hz_maps_to_period() {
        assert_eq!(
            parse_period(&json!({"hz": 10.0})).unwrap(),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn fires_immediately_and_then_periodically() {
        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = fired.clone();
        let trigger = build(
            &json!({"period": 0.025}),
            TriggerRuntime::new(
                Arc::new(move || {
                    fired2.fetch_add(1, Ordering::SeqCst);
                }),
                Arc::new(ControlFlag::new(true)),
                "/tmp".into(),
            ),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(120));
        drop(trigger);
        let count = fired.load(Ordering::SeqCst);
        assert!(count >= 2, "expected several fires, got {count}");
    }

    #[test]
    fn drop_joins_promptly() {
        let trigger = build(
            &json!({"period": 3600.0}),
            TriggerRuntime::new(
                Arc::new(|| {}),
                Arc::new(ControlFlag::new(true)),
                "/tmp".into(),
            ),
        )
        .unwrap();
        let start = std::time::Instant::now();
        drop(trigger);
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
