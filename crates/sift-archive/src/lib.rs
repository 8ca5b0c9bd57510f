//! # sift-archive
//!
//! Selective message-stream archiver core.
//!
//! A supervisor watches the substrate root for topic files matching the
//! configured rules and attaches one recorder per discovered stream. Each
//! recorder funnels every packet through a pipeline of save policies;
//! policies are nudged by triggers (timers, cron schedules, pub/sub
//! events) and gated on and off over control topics. Surviving packets
//! land in rolling, date-partitioned log files.
//!
//! ## Crate structure
//!
//! - [`config`] — Config and rule model, watch-path templates, validation
//! - [`policy`] — SaveDecision, policy trait and factory registry
//! - [`policies`] — save_all, drop_all, count, time reference policies
//! - [`trigger`] — Trigger trait, factory registry, fire wrapper
//! - [`triggers`] — rate, cron, pubsub reference triggers
//! - [`gate`] — Process-wide on/off control gates
//! - [`recorder`] — Per-stream buffered decision loop and file roll-over
//! - [`supervisor`] — Stream discovery and recorder lifecycle
//! - [`announce`] — Off-thread announcement publishing

pub mod announce;
pub mod config;
pub mod gate;
pub mod policies;
pub mod policy;
pub mod recorder;
pub mod supervisor;
pub mod trigger;
pub mod triggers;
