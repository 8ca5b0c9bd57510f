//! On-disk frame codec shared by topic files and output log files.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! u32 frame_len                        bytes after this prefix
//! u16 header_count
//!   ( u16 key_len, key, u32 val_len, val )*
//! u32 payload_len
//! payload
//! ```
//!
//! Writers append whole frames; readers stop at the first incomplete frame
//! and pick it up on the next poll, so a frame is never observed torn.

use bytes::Bytes;
use thiserror::Error;

use crate::packet::Packet;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame body truncated or corrupt")]
    Corrupt,
    #[error("header is not valid utf-8")]
    BadHeader,
}

/// Frame size for `pkt`, length prefix included.
pub fn frame_size(pkt: &Packet) -> u64 {
    4 + body_size(pkt)
}

fn body_size(pkt: &Packet) -> u64 {
    let headers: u64 = pkt
        .headers()
        .iter()
        .map(|(k, v)| 2 + k.len() as u64 + 4 + v.len() as u64)
        .sum();
    2 + headers + 4 + pkt.payload().len() as u64
}

/// Appends `pkt`'s frame to `out`.
pub fn encode(pkt: &Packet, out: &mut Vec<u8>) {
    out.extend_from_slice(&(body_size(pkt) as u32).to_le_bytes());
    out.extend_from_slice(&(pkt.headers().len() as u16).to_le_bytes());
    for (k, v) in pkt.headers() {
        out.extend_from_slice(&(k.len() as u16).to_le_bytes());
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(&(v.len() as u32).to_le_bytes());
        out.extend_from_slice(v.as_bytes());
    }
    out.extend_from_slice(&(pkt.payload().len() as u32).to_le_bytes());
    out.extend_from_slice(pkt.payload());
}

/// Decodes the first frame in `buf`.
///
/// Returns `Ok(None)` when the buffer holds only part of a frame, and the
/// decoded packet plus the number of bytes consumed otherwise. Decoded
/// packets get fresh identities; identity is never carried over the wire.
pub fn decode(buf: &[u8]) -> Result<Option<(Packet, usize)>, FrameError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let body_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if buf.len() < 4 + body_len {
        return Ok(None);
    }
    let body = &buf[4..4 + body_len];

    let mut at = 0usize;
    let header_count = read_u16(body, &mut at)? as usize;
    let mut headers = Vec::with_capacity(header_count);
    for _ in 0..header_count {
        let key_len = read_u16(body, &mut at)? as usize;
        let key = read_str(body, &mut at, key_len)?;
        let val_len = read_u32(body, &mut at)? as usize;
        let val = read_str(body, &mut at, val_len)?;
        headers.push((key, val));
    }
    let payload_len = read_u32(body, &mut at)? as usize;
    if at + payload_len != body_len {
        return Err(FrameError::Corrupt);
    }
    let payload = Bytes::copy_from_slice(&body[at..at + payload_len]);

    Ok(Some((Packet::new(headers, payload), 4 + body_len)))
}

fn read_u16(buf: &[u8], at: &mut usize) -> Result<u16, FrameError> {
    let end = at.checked_add(2).ok_or(FrameError::Corrupt)?;
    let bytes = buf.get(*at..end).ok_or(FrameError::Corrupt)?;
    *at = end;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(buf: &[u8], at: &mut usize) -> Result<u32, FrameError> {
    let end = at.checked_add(4).ok_or(FrameError::Corrupt)?;
    let bytes = buf.get(*at..end).ok_or(FrameError::Corrupt)?;
    *at = end;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_str(buf: &[u8], at: &mut usize, len: usize) -> Result<String, FrameError> {
    let end = at.checked_add(len).ok_or(FrameError::Corrupt)?;
    let bytes = buf.get(*at..end).ok_or(FrameError::Corrupt)?;
    *at = end;
    String::from_utf8(bytes.to_vec()).map_err(|_| FrameError::BadHeader)
}
