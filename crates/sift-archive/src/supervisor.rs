//! Stream discovery and recorder lifecycle.
//!
//! One discovery watcher per rule observes the searchpath. Every reported
//! path is checked against a seen set so at most one recorder ever exists
//! per path, then matched against the rules in declaration order; the
//! first match wins. Recorders are retained until the supervisor drops,
//! and drop in construction order.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use globset::{Glob, GlobMatcher};

use sift_bus::discovery::Discovery;

use crate::announce::{self, AnnounceWorker, Announcer};
use crate::config::{Config, ConfigError};
use crate::recorder::Recorder;

struct SupervisorState {
    seen: HashSet<PathBuf>,
    recorders: Vec<Recorder>,
}

struct Inner {
    config: Config,
    /// One matcher per rule, in rule order.
    matchers: Vec<GlobMatcher>,
    announcer: Announcer,
    state: Mutex<SupervisorState>,
}

/// Watches for streams and owns their recorders.
// Field order is drop order: watchers stop reporting, then the recorders
// drain (their announcer handles with them), then the announce worker
// flushes and joins.
pub struct Supervisor {
    watchers: Vec<Discovery>,
    inner: Arc<Inner>,
    _announce_worker: AnnounceWorker,
}

impl Supervisor {
    pub fn new(mut config: Config, announce_path: PathBuf) -> Result<Self, ConfigError> {
        // Canonical searchpath keeps discovered paths strippable against it.
        if let Ok(canonical) = std::fs::canonicalize(&config.searchpath) {
            config.searchpath = canonical;
        }

        let mut matchers = Vec::new();
        for rule in &config.rules {
            let pattern = config.searchpath.join(rule.relative_watch_path());
            let glob =
                Glob::new(&pattern.to_string_lossy()).map_err(|e| ConfigError::BadGlob {
                    pattern: pattern.to_string_lossy().into_owned(),
                    reason: e.to_string(),
                })?;
            matchers.push(glob.compile_matcher());
        }

        let (announcer, announce_worker) = announce::spawn(announce_path);
        let inner = Arc::new(Inner {
            config,
            matchers,
            announcer,
            state: Mutex::new(SupervisorState {
                seen: HashSet::new(),
                recorders: Vec::new(),
            }),
        });

        let mut watchers = Vec::new();
        for rule in &inner.config.rules {
            let pattern = inner.config.searchpath.join(rule.relative_watch_path());
            let inner_cb = inner.clone();
            let watcher = Discovery::new(&pattern, move |path| inner_cb.on_path(path))
                .map_err(|e| ConfigError::BadGlob {
                    pattern: pattern.to_string_lossy().into_owned(),
                    reason: e.to_string(),
                })?;
            watchers.push(watcher);
        }

        Ok(Supervisor {
            watchers,
            inner,
            _announce_worker: announce_worker,
        })
    }

    /// Number of live recorders. Diagnostic only.
    pub fn recorder_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .recorders
            .len()
    }
}

impl Inner {
    fn on_path(&self, path: PathBuf) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.seen.insert(path.clone()) {
            return;
        }
        for (rule, matcher) in self.config.rules.iter().zip(&self.matchers) {
            if !matcher.is_match(&path) {
                continue;
            }
            match Recorder::new(&self.config, rule, path.clone(), self.announcer.clone()) {
                Ok(recorder) => {
                    tracing::info!(
                        stream = %path.display(),
                        topic = %rule.topic,
                        "recorder attached"
                    );
                    state.recorders.push(recorder);
                }
                Err(e) => {
                    tracing::error!(stream = %path.display(), error = %e, "recorder failed");
                }
            }
            return;
        }
    }
}
