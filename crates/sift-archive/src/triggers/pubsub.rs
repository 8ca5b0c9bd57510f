//! Pub/sub event trigger.
//!
//! Fires once per message received on `topic`, starting from messages
//! published after the subscription. Owns no thread beyond the
//! subscription itself.

use serde::Deserialize;
use serde_json::Value;

use sift_bus::topic::{ReadStart, Subscriber};

use crate::config::{topic_file, ConfigError};
use crate::trigger::{Trigger, TriggerRuntime};

#[derive(Debug, Deserialize)]
struct Args {
    topic: String,
}

fn parse_topic(args: &Value) -> Result<String, ConfigError> {
    let args: Args = serde_json::from_value(args.clone()).map_err(|e| ConfigError::InvalidArgs {
        type_name: "pubsub",
        reason: e.to_string(),
    })?;
    Ok(args.topic)
}

pub(crate) fn check(args: &Value) -> Result<(), ConfigError> {
    parse_topic(args).map(|_| ())
}

pub(crate) fn build(args: &Value, rt: TriggerRuntime) -> Result<Box<dyn Trigger>, ConfigError> {
    let topic = parse_topic(args)?;
    let path = topic_file(&rt.root, &topic);
    let sub = Subscriber::new(path, ReadStart::New, move |_pkt| rt.fire());
    Ok(Box::new(PubsubTrigger { _sub: sub }))
}

pub struct PubsubTrigger {
    _sub: Subscriber,
}

impl Trigger for PubsubTrigger {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::ControlFlag;
    use serde_json::json;
    use sift_bus::topic::Publisher;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn arg_validation() {
        assert!(check(&json!({"topic": "events"})).is_ok());
        assert!(check(&json!({})).is_err());
    }

    #[test]
    fn fires_per_received_message() {
        let dir = tempfile::tempdir().unwrap();
        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = fired.clone();
        let trigger = build(
            &json!({"topic": "events"}),
            TriggerRuntime::new(
                Arc::new(move || {
                    fired2.fetch_add(1, Ordering::SeqCst);
                }),
                Arc::new(ControlFlag::new(true)),
                dir.path().to_path_buf(),
            ),
        )
        .unwrap();

        let mut publisher = Publisher::new(topic_file(dir.path(), "events")).unwrap();
        publisher.publish(&b"go"[..]).unwrap();
        publisher.publish(&b"go again"[..]).unwrap();

        for _ in 0..200 {
            if fired.load(Ordering::SeqCst) == 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        drop(trigger);
    }
}
