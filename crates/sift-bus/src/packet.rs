//! Immutable packet handle: identity, ordered headers, opaque payload.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::clock::{TimeMono, TimeWall};

/// Header carrying the monotonic timestamp as decimal nanoseconds.
pub const HDR_TIME_MONO: &str = "a0_time_mono";
/// Header carrying the wall-clock timestamp as RFC3339 UTC.
pub const HDR_TIME_WALL: &str = "a0_time_wall";

static NEXT_PACKET_ID: AtomicU64 = AtomicU64::new(1);

struct Inner {
    id: u64,
    headers: Vec<(String, String)>,
    payload: Bytes,
}

/// A cheaply clonable, immutable packet.
///
/// Equality and hashing go by the process-unique identity assigned at
/// construction, not by content: the archiver's bookkeeping (history
/// windows, to-save sets) tracks specific packet instances.
#[derive(Clone)]
pub struct Packet(Arc<Inner>);

impl Packet {
    pub fn new(headers: Vec<(String, String)>, payload: impl Into<Bytes>) -> Self {
        Packet(Arc::new(Inner {
            id: NEXT_PACKET_ID.fetch_add(1, Ordering::Relaxed),
            headers,
            payload: payload.into(),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.0.headers
    }

    pub fn payload(&self) -> &Bytes {
        &self.0.payload
    }

    /// First header value for `key`, if present.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.0
            .headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Monotonic stamp parsed from the `a0_time_mono` header.
    pub fn time_mono(&self) -> Option<TimeMono> {
        self.header(HDR_TIME_MONO)
            .and_then(|v| TimeMono::parse(v).ok())
    }

    /// Wall stamp parsed from the `a0_time_wall` header.
    pub fn time_wall(&self) -> Option<TimeWall> {
        self.header(HDR_TIME_WALL)
            .and_then(|v| TimeWall::parse(v).ok())
    }

    /// Size of this packet's frame on disk, length prefix included.
    pub fn serial_size(&self) -> u64 {
        crate::frame::frame_size(self)
    }
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Packet {}

impl Hash for Packet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("id", &self.0.id)
            .field("headers", &self.0.headers.len())
            .field("payload_len", &self.0.payload.len())
            .finish()
    }
}
