//! Glob watcher reporting newly created topic files.
//!
//! Polls the filesystem under the pattern's literal root and reports each
//! matching path exactly once, in canonical form. Polling keeps the
//! watcher free of platform notification APIs; the interval is well below
//! the latencies that matter to stream discovery.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;

use globset::{Glob, GlobMatcher};

use crate::sync::{shutdown_channel, ShutdownHandle};

const SCAN_INTERVAL: Duration = Duration::from_millis(100);

/// Watches a glob pattern for new files.
///
/// Dropping the watcher stops and joins its thread.
pub struct Discovery {
    shutdown: Option<ShutdownHandle>,
    handle: Option<JoinHandle<()>>,
}

impl Discovery {
    pub fn new(
        pattern: &Path,
        mut callback: impl FnMut(PathBuf) + Send + 'static,
    ) -> Result<Self, globset::Error> {
        let matcher = Glob::new(&pattern.to_string_lossy())?.compile_matcher();
        let root = literal_root(pattern);
        let (shutdown, listener) = shutdown_channel();

        let handle = std::thread::Builder::new()
            .name("discovery".into())
            .spawn(move || {
                let mut seen: HashSet<PathBuf> = HashSet::new();
                loop {
                    scan(&root, &matcher, &mut seen, &mut callback);
                    if listener.wait_timeout(SCAN_INTERVAL) {
                        return;
                    }
                }
            })
            .expect("failed to spawn discovery thread");

        Ok(Discovery {
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Longest pattern prefix without glob metacharacters.
fn literal_root(pattern: &Path) -> PathBuf {
    let mut root = PathBuf::new();
    for comp in pattern.components() {
        let part = comp.as_os_str().to_string_lossy();
        if part.contains(['*', '?', '[', '{']) {
            break;
        }
        root.push(comp);
    }
    root
}

fn scan(
    root: &Path,
    matcher: &GlobMatcher,
    seen: &mut HashSet<PathBuf>,
    callback: &mut (impl FnMut(PathBuf) + Send),
) {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                stack.push(path);
            } else if matcher.is_match(&path) && seen.insert(path.clone()) {
                let canonical = std::fs::canonicalize(&path).unwrap_or(path);
                callback(canonical);
            }
        }
    }
}
