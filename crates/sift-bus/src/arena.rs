//! Fixed-capacity output log files.
//!
//! A log file is created at its full nominal capacity under a dot-prefixed
//! in-progress name. Closing shrinks it to the bytes actually used and
//! renames it to the final name, so a reader never sees a half-written
//! log under the final name.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::frame;
use crate::packet::Packet;

/// In-progress name for `final_path`: dot-prefix on the last component.
fn in_progress_path(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path.with_file_name(format!(".{name}"))
}

/// Writer for one rolling output log file.
pub struct LogWriter {
    final_path: PathBuf,
    tmp_path: PathBuf,
    file: File,
    capacity: u64,
    used: u64,
    closed: bool,
}

impl LogWriter {
    /// Creates the in-progress file at full `capacity`, replacing any stale
    /// in-progress file left behind by a previous run.
    pub fn create(final_path: impl Into<PathBuf>, capacity: u64) -> std::io::Result<Self> {
        let final_path = final_path.into();
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = in_progress_path(&final_path);
        match std::fs::remove_file(&tmp_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)?;
        file.set_len(capacity)?;
        Ok(LogWriter {
            final_path,
            tmp_path,
            file,
            capacity,
            used: 0,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.final_path
    }

    pub fn used_space(&self) -> u64 {
        self.used
    }

    /// Whether appending a frame of `frame_len` bytes would overflow the
    /// nominal capacity.
    pub fn would_evict(&self, frame_len: u64) -> bool {
        self.used + frame_len > self.capacity
    }

    /// Appends one packet frame.
    pub fn write(&mut self, pkt: &Packet) -> std::io::Result<()> {
        let mut buf = Vec::with_capacity(pkt.serial_size() as usize);
        frame::encode(pkt, &mut buf);
        self.file.write_all(&buf)?;
        self.used += buf.len() as u64;
        Ok(())
    }

    /// Shrinks to used space and renames to the final name.
    pub fn close(&mut self) -> std::io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.file.flush()?;
        self.file.set_len(self.used)?;
        std::fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

/// Reads every complete frame from a log or topic file.
pub fn read_all(path: &Path) -> std::io::Result<Vec<Packet>> {
    let mut buf = Vec::new();
    File::open(path)?.read_to_end(&mut buf)?;
    let mut packets = Vec::new();
    let mut at = 0usize;
    while let Ok(Some((pkt, used))) = frame::decode(&buf[at..]) {
        packets.push(pkt);
        at += used;
    }
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkt(payload: &str) -> Packet {
        Packet::new(vec![("k".into(), "v".into())], payload.as_bytes().to_vec())
    }

    #[test]
    fn writes_under_dot_name_until_closed() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("out.a0");

        let mut writer = LogWriter::create(&dst, 4096).unwrap();
        writer.write(&pkt("hello")).unwrap();
        assert!(dir.path().join(".out.a0").exists());
        assert!(!dst.exists());

        writer.close().unwrap();
        assert!(dst.exists());
        assert!(!dir.path().join(".out.a0").exists());
    }

    #[test]
    fn close_shrinks_to_used_space() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("out.a0");

        let mut writer = LogWriter::create(&dst, 1 << 20).unwrap();
        let p = pkt("payload");
        writer.write(&p).unwrap();
        let used = writer.used_space();
        writer.close().unwrap();

        assert_eq!(std::fs::metadata(&dst).unwrap().len(), used);
        assert_eq!(used, p.serial_size());
    }

    #[test]
    fn would_evict_tracks_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let p = pkt("12345");
        let mut writer =
            LogWriter::create(dir.path().join("out.a0"), p.serial_size() * 2).unwrap();
        assert!(!writer.would_evict(p.serial_size()));
        writer.write(&p).unwrap();
        assert!(!writer.would_evict(p.serial_size()));
        writer.write(&p).unwrap();
        assert!(writer.would_evict(p.serial_size()));
    }

    #[test]
    fn stale_in_progress_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("out.a0");
        std::fs::write(dir.path().join(".out.a0"), b"stale").unwrap();

        let mut writer = LogWriter::create(&dst, 4096).unwrap();
        writer.write(&pkt("fresh")).unwrap();
        writer.close().unwrap();

        let packets = read_all(&dst).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload().as_ref(), b"fresh");
    }

    #[test]
    fn read_all_round_trips_multiple_packets() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("out.a0");

        let mut writer = LogWriter::create(&dst, 4096).unwrap();
        for i in 0..3 {
            writer.write(&pkt(&format!("p{i}"))).unwrap();
        }
        writer.close().unwrap();

        let packets = read_all(&dst).unwrap();
        let payloads: Vec<_> = packets
            .iter()
            .map(|p| String::from_utf8_lossy(p.payload()).into_owned())
            .collect();
        assert_eq!(payloads, ["p0", "p1", "p2"]);
    }
}
