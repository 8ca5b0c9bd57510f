//! Cron schedule trigger.
//!
//! `pattern` is a 6-field cron expression with a seconds field
//! (`sec min hour day-of-month month day-of-week`). Fires immediately on
//! start, then sleeps until each next scheduled UTC instant.

use std::str::FromStr;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use serde::Deserialize;
use serde_json::Value;

use sift_bus::sync::{shutdown_channel, ShutdownHandle};

use crate::config::ConfigError;
use crate::trigger::{Trigger, TriggerRuntime};

#[derive(Debug, Deserialize)]
struct Args {
    pattern: String,
}

fn parse_schedule(args: &Value) -> Result<Schedule, ConfigError> {
    let args: Args = serde_json::from_value(args.clone()).map_err(|e| ConfigError::InvalidArgs {
        type_name: "cron",
        reason: e.to_string(),
    })?;
    Schedule::from_str(&args.pattern).map_err(|e| ConfigError::InvalidArgs {
        type_name: "cron",
        reason: format!("bad pattern '{}': {e}", args.pattern),
    })
}

pub(crate) fn check(args: &Value) -> Result<(), ConfigError> {
    parse_schedule(args).map(|_| ())
}

pub(crate) fn build(args: &Value, rt: TriggerRuntime) -> Result<Box<dyn Trigger>, ConfigError> {
    let schedule = parse_schedule(args)?;
    let (shutdown, listener) = shutdown_channel();
    let handle = std::thread::Builder::new()
        .name("trigger-cron".into())
        .spawn(move || loop {
            rt.fire();
            let now = Utc::now();
            let Some(next) = schedule.after(&now).next() else {
                return;
            };
            let sleep = (next - now).to_std().unwrap_or(Duration::ZERO);
            if listener.wait_timeout(sleep) {
                return;
            }
        })
        .map_err(|e| ConfigError::InvalidArgs {
            type_name: "cron",
            reason: format!("failed to spawn timer thread: {e}"),
        })?;
    Ok(Box::new(CronTrigger {
        shutdown: Some(shutdown),
        handle: Some(handle),
    }))
}

pub struct CronTrigger {
    shutdown: Option<ShutdownHandle>,
    handle: Option<JoinHandle<()>>,
}

impl Trigger for CronTrigger {}

impl Drop for CronTrigger {
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
        assert!(check(&json!({"pattern": "*/5 * * * * *"})).is_ok());
        assert!(check(&json!({"pattern": "0 30 9 * * Mon-Fri"})).is_ok());
        assert!(check(&json!({"pattern": "not cron"})).is_err());
        assert!(check(&json!({})).is_err());
    }

    #[test]
    fn fires_immediately_on_start() {
        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = fired.clone();
        // Hourly schedule: the only fire inside the test window is the
        // immediate one.
        let trigger = build(
            &json!({"pattern": "0 0 * * * *"}),
            TriggerRuntime::new(
                Arc::new(move || {
                    fired2.fetch_add(1, Ordering::SeqCst);
                }),
                Arc::new(ControlFlag::new(true)),
                "/tmp".into(),
            ),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        drop(trigger);
        assert!(fired.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn drop_joins_promptly_mid_sleep() {
        let trigger = build(
            &json!({"pattern": "0 0 * * * *"}),
            TriggerRuntime::new(
                Arc::new(|| {}),
                Arc::new(ControlFlag::new(true)),
                "/tmp".into(),
            ),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let start = std::time::Instant::now();
        drop(trigger);
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
