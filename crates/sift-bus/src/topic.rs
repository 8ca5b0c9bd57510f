//! Publisher / Subscriber over append-only topic files.
//!
//! A topic is a single file of packet frames. Publishing appends one frame
//! under an in-process per-topic lock; subscribing spawns a delivery thread
//! that tails the file and hands each decoded packet to a callback in
//! append order. One writing process per topic is assumed, matching the
//! exclusive-arena model of the wider system.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use once_cell::sync::Lazy;

use crate::clock::{TimeMono, TimeWall};
use crate::frame;
use crate::packet::{Packet, HDR_TIME_MONO, HDR_TIME_WALL};
use crate::sync::{shutdown_channel, ShutdownHandle, ShutdownListener};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Per-topic append locks, keyed by resolved path.
static APPEND_LOCKS: Lazy<Mutex<HashMap<PathBuf, &'static Mutex<()>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn append_lock(path: &Path) -> &'static Mutex<()> {
    let key = resolve(path);
    let mut locks = APPEND_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
    locks
        .entry(key)
        .or_insert_with(|| Box::leak(Box::new(Mutex::new(()))))
}

fn resolve(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

// ─── Publisher ──────────────────────────────────────────────────────────────

/// Appends packets to a topic file, stamping timestamp headers.
pub struct Publisher {
    path: PathBuf,
    file: File,
}

impl Publisher {
    pub fn new(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Publisher { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Publishes `payload` with freshly stamped timestamp headers.
    pub fn publish(&mut self, payload: impl Into<Bytes>) -> std::io::Result<Packet> {
        self.publish_with_headers(Vec::new(), payload)
    }

    /// Publishes with caller-supplied headers.
    ///
    /// Timestamp headers are stamped only when the caller did not provide
    /// them, so replay tooling and tests can carry explicit stamps.
    pub fn publish_with_headers(
        &mut self,
        mut headers: Vec<(String, String)>,
        payload: impl Into<Bytes>,
    ) -> std::io::Result<Packet> {
        if !headers.iter().any(|(k, _)| k == HDR_TIME_MONO) {
            headers.push((HDR_TIME_MONO.into(), TimeMono::now().to_string()));
        }
        if !headers.iter().any(|(k, _)| k == HDR_TIME_WALL) {
            headers.push((HDR_TIME_WALL.into(), TimeWall::now().to_string()));
        }
        let pkt = Packet::new(headers, payload);
        self.publish_packet(&pkt)?;
        Ok(pkt)
    }

    /// Appends an existing packet verbatim, stamps and all. Used when
    /// forwarding or replaying a stream.
    pub fn publish_packet(&mut self, pkt: &Packet) -> std::io::Result<()> {
        let mut buf = Vec::with_capacity(pkt.serial_size() as usize);
        frame::encode(pkt, &mut buf);

        let _guard = append_lock(&self.path)
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        self.file.write_all(&buf)?;
        self.file.flush()?;
        Ok(())
    }
}

// ─── Subscriber ─────────────────────────────────────────────────────────────

/// Where a subscription starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStart {
    /// Replay every frame already in the file, then follow new ones.
    Oldest,
    /// Deliver only frames appended after the subscription was created.
    New,
}

/// Tails a topic file on a background thread, delivering packets in order.
///
/// The topic file may not exist yet; delivery begins once it appears.
/// Dropping the subscriber stops and joins the thread.
pub struct Subscriber {
    shutdown: Option<ShutdownHandle>,
    handle: Option<JoinHandle<()>>,
}

impl Subscriber {
    pub fn new(
        path: impl Into<PathBuf>,
        start: ReadStart,
        mut callback: impl FnMut(Packet) + Send + 'static,
    ) -> Self {
        let path = path.into();
        let start_off = match start {
            ReadStart::Oldest => 0,
            ReadStart::New => std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0),
        };
        let (shutdown, listener) = shutdown_channel();

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "topic".into());
        let handle = std::thread::Builder::new()
            .name(format!("sub:{name}"))
            .spawn(move || {
                tail_loop(&path, start_off, listener, &mut callback);
            })
            .expect("failed to spawn subscriber thread");

        Subscriber {
            shutdown: Some(shutdown),
            handle: Some(handle),
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn tail_loop(
    path: &Path,
    start_off: u64,
    listener: ShutdownListener,
    callback: &mut (impl FnMut(Packet) + Send),
) {
    let mut file: Option<File> = None;
    let mut pending: Vec<u8> = Vec::new();

    loop {
        if listener.is_shutdown() {
            return;
        }

        if file.is_none() {
            if let Ok(mut f) = File::open(path) {
                if f.seek(SeekFrom::Start(start_off)).is_ok() {
                    file = Some(f);
                }
            }
        }

        if let Some(f) = &mut file {
            if let Err(e) = f.read_to_end(&mut pending) {
                tracing::error!(path = %path.display(), error = %e, "topic read failed");
                return;
            }
        }

        loop {
            match frame::decode(&pending) {
                Ok(Some((pkt, used))) => {
                    pending.drain(..used);
                    callback(pkt);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "corrupt topic frame, detaching");
                    return;
                }
            }
        }

        if listener.wait_timeout(POLL_INTERVAL) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn recv_n(rx: &mpsc::Receiver<Packet>, n: usize) -> Vec<Packet> {
        (0..n)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).expect("packet"))
            .collect()
    }

    #[test]
    fn oldest_replays_then_follows() {
        let dir = tempfile::tempdir().unwrap();
        let topic = dir.path().join("stream.pubsub.a0");

        let mut publisher = Publisher::new(&topic).unwrap();
        publisher.publish(&b"one"[..]).unwrap();
        publisher.publish(&b"two"[..]).unwrap();

        let (tx, rx) = mpsc::channel();
        let _sub = Subscriber::new(&topic, ReadStart::Oldest, move |pkt| {
            let _ = tx.send(pkt);
        });

        let old = recv_n(&rx, 2);
        assert_eq!(old[0].payload().as_ref(), b"one");
        assert_eq!(old[1].payload().as_ref(), b"two");

        publisher.publish(&b"three"[..]).unwrap();
        assert_eq!(recv_n(&rx, 1)[0].payload().as_ref(), b"three");
    }

    #[test]
    fn new_skips_existing_frames() {
        let dir = tempfile::tempdir().unwrap();
        let topic = dir.path().join("stream.pubsub.a0");

        let mut publisher = Publisher::new(&topic).unwrap();
        publisher.publish(&b"old"[..]).unwrap();

        let (tx, rx) = mpsc::channel();
        let _sub = Subscriber::new(&topic, ReadStart::New, move |pkt| {
            let _ = tx.send(pkt);
        });

        publisher.publish(&b"fresh"[..]).unwrap();
        assert_eq!(recv_n(&rx, 1)[0].payload().as_ref(), b"fresh");
    }

    #[test]
    fn subscribing_before_topic_exists() {
        let dir = tempfile::tempdir().unwrap();
        let topic = dir.path().join("late.pubsub.a0");

        let (tx, rx) = mpsc::channel();
        let _sub = Subscriber::new(&topic, ReadStart::Oldest, move |pkt| {
            let _ = tx.send(pkt);
        });

        std::thread::sleep(Duration::from_millis(30));
        Publisher::new(&topic)
            .unwrap()
            .publish(&b"hello"[..])
            .unwrap();
        assert_eq!(recv_n(&rx, 1)[0].payload().as_ref(), b"hello");
    }

    #[test]
    fn publish_stamps_timestamp_headers() {
        let dir = tempfile::tempdir().unwrap();
        let mut publisher = Publisher::new(dir.path().join("t.a0")).unwrap();
        let pkt = publisher.publish(&b"x"[..]).unwrap();
        assert!(pkt.time_mono().is_some());
        assert!(pkt.time_wall().is_some());
    }

    #[test]
    fn explicit_stamps_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let mut publisher = Publisher::new(dir.path().join("t.a0")).unwrap();
        let pkt = publisher
            .publish_with_headers(vec![(HDR_TIME_MONO.into(), "42".into())], &b"x"[..])
            .unwrap();
        assert_eq!(pkt.time_mono().unwrap().as_nanos(), 42);
        assert!(pkt.time_wall().is_some());
    }
}
