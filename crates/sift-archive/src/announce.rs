//! Off-thread announcement publishing.
//!
//! Recorders announce file opens, closes, and close failures. Publishing
//! does file IO, so announcements go through an unbounded queue drained
//! by a worker thread; a recorder never blocks its packet mutex on the
//! announce topic.

use std::path::PathBuf;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use serde_json::Value;

use sift_bus::topic::Publisher;

/// Cheap handle for queueing announcements.
#[derive(Clone)]
pub struct Announcer {
    tx: Sender<Value>,
}

impl Announcer {
    pub fn send(&self, payload: Value) {
        let _ = self.tx.send(payload);
    }
}

/// Owns the worker thread. Drops after every [`Announcer`] clone so the
/// join cannot block on a live sender.
pub struct AnnounceWorker {
    handle: Option<JoinHandle<()>>,
}

impl Drop for AnnounceWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Spawns the announce worker for the topic file at `topic_path`.
pub fn spawn(topic_path: PathBuf) -> (Announcer, AnnounceWorker) {
    let (tx, rx) = unbounded::<Value>();
    let handle = std::thread::Builder::new()
        .name("announce".into())
        .spawn(move || {
            let mut publisher: Option<Publisher> = None;
            while let Ok(payload) = rx.recv() {
                if publisher.is_none() {
                    match Publisher::new(&topic_path) {
                        Ok(p) => publisher = Some(p),
                        Err(e) => {
                            tracing::warn!(
                                path = %topic_path.display(),
                                error = %e,
                                "cannot open announce topic, dropping announcement"
                            );
                            continue;
                        }
                    }
                }
                if let Some(p) = &mut publisher {
                    if let Err(e) = p.publish(payload.to_string()) {
                        tracing::warn!(error = %e, "announce publish failed");
                    }
                }
            }
        })
        .expect("failed to spawn announce thread");
    (
        Announcer { tx },
        AnnounceWorker {
            handle: Some(handle),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn announcements_reach_the_topic_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let topic = dir.path().join("announce.pubsub.a0");

        let (announcer, worker) = spawn(topic.clone());
        announcer.send(json!({"action": "opened", "seq": 1}));
        announcer.send(json!({"action": "closed", "seq": 2}));
        drop(announcer);
        drop(worker); // joins; everything queued has been published

        let packets = sift_bus::arena::read_all(&topic).unwrap();
        assert_eq!(packets.len(), 2);
        let first: Value = serde_json::from_slice(packets[0].payload()).unwrap();
        let second: Value = serde_json::from_slice(packets[1].payload()).unwrap();
        assert_eq!(first["action"], "opened");
        assert_eq!(second["seq"], 2);
    }
}
