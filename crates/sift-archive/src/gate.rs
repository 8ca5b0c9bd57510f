//! Process-wide on/off control gates.
//!
//! A gate is a singleton subscriber on one control topic. Policies and
//! triggers register an enable flag with the gates for their configured
//! control topics; a `"on"` / `"off"` payload on the topic flips every
//! registered flag. Flags are held weakly, so a recorder tearing down
//! deregisters its listeners implicitly. Gates themselves live for the
//! life of the process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use once_cell::sync::Lazy;

use sift_bus::topic::{ReadStart, Subscriber};

/// An enable flag shared between its owner and the gates it is
/// registered with.
pub struct ControlFlag {
    enabled: AtomicBool,
}

impl ControlFlag {
    pub fn new(enabled: bool) -> Self {
        ControlFlag {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }
}

struct Gate {
    listeners: Arc<Mutex<Vec<Weak<ControlFlag>>>>,
    _sub: Subscriber,
}

impl Gate {
    fn new(topic_path: PathBuf) -> Self {
        let listeners: Arc<Mutex<Vec<Weak<ControlFlag>>>> = Arc::new(Mutex::new(Vec::new()));
        let listeners_bg = listeners.clone();
        let path_bg = topic_path.clone();
        let sub = Subscriber::new(topic_path, ReadStart::New, move |pkt| {
            let payload = pkt.payload().as_ref();
            let enabled = if payload == b"on" {
                true
            } else if payload == b"off" {
                false
            } else {
                tracing::warn!(
                    topic = %path_bg.display(),
                    payload = %String::from_utf8_lossy(payload),
                    "ignoring invalid control message (want \"on\" or \"off\")"
                );
                return;
            };
            let mut listeners = listeners_bg.lock().unwrap_or_else(|e| e.into_inner());
            listeners.retain(|weak| match weak.upgrade() {
                Some(flag) => {
                    flag.set_enabled(enabled);
                    true
                }
                None => false,
            });
        });
        Gate {
            listeners,
            _sub: sub,
        }
    }

    fn register(&self, flag: &Arc<ControlFlag>) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::downgrade(flag));
    }
}

static GATES: Lazy<Mutex<HashMap<PathBuf, Gate>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Registers `flag` with the gate for the control topic backed by
/// `topic_path`, creating the gate on first use.
pub fn register(topic_path: PathBuf, flag: &Arc<ControlFlag>) {
    let mut gates = GATES.lock().unwrap_or_else(|e| e.into_inner());
    gates
        .entry(topic_path.clone())
        .or_insert_with(|| Gate::new(topic_path))
        .register(flag);
}
