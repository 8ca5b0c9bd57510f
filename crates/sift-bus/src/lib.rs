//! # sift-bus
//!
//! Minimal pub/sub substrate for the sift archiver.
//!
//! Topics are append-only files of length-prefixed packet frames under a
//! shared root directory. Publishers stamp each packet with monotonic and
//! wall-clock timestamp headers; subscribers follow topic files from a
//! background thread. Output log files reuse the same frame codec so an
//! archived stream can be replayed with the same reader.
//!
//! ## Crate structure
//!
//! - [`packet`] — Immutable packet handle: headers, payload, identity
//! - [`clock`] — Monotonic and wall-clock timestamps and their wire formats
//! - [`units`] — Duration and file-size string grammar
//! - [`frame`] — On-disk frame codec shared by topics and log files
//! - [`topic`] — Publisher / Subscriber over append-only topic files
//! - [`arena`] — Fixed-capacity output log files with in-progress naming
//! - [`discovery`] — Glob watcher reporting newly created topic files
//! - [`sync`] — Channel-based shutdown signalling for background threads

pub mod arena;
pub mod clock;
pub mod discovery;
pub mod frame;
pub mod packet;
pub mod sync;
pub mod topic;
pub mod units;
