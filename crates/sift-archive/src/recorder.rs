//! Per-stream recorder: the buffered decision loop and file roll-over.
//!
//! One recorder owns one input stream. Packets arrive on the reader
//! thread, pass an ingestion filter, and enter a FIFO buffer. The
//! recorder drains the buffer from the head for as long as the combined
//! policy verdict is definitive: SAVE writes to the current output file
//! (rolling it on size or age), DROP discards, and a single DEFER parks
//! the whole buffer until a later packet or trigger resolves the head.
//!
//! A single mutex guards the buffer, the policies, and the output file.
//! Trigger threads take the same mutex before touching policy state, so
//! a fire is observed either strictly before or strictly after any
//! packet.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use sift_bus::arena::LogWriter;
use sift_bus::clock::TimeMono;
use sift_bus::packet::Packet;
use sift_bus::topic::{ReadStart, Subscriber};

use crate::announce::Announcer;
use crate::config::{topic_file, Config, ConfigError, Rule};
use crate::gate::{self, ControlFlag};
use crate::policy::{self, PolicyKind, SaveDecision};
use crate::trigger::{self, Notify, Trigger};

/// A policy plus the gate flag deciding whether its triggers reach it.
struct PolicyCell {
    kind: Box<dyn PolicyKind>,
    enabled: Arc<ControlFlag>,
}

/// State guarded by the recorder mutex.
struct Core {
    savepath: PathBuf,
    read_path: PathBuf,
    read_rel: PathBuf,
    max_size: u64,
    max_dur: Duration,
    rule_desc: Value,
    announcer: Announcer,

    buffer: VecDeque<Packet>,
    policies: Vec<PolicyCell>,
    writer: Option<LogWriter>,
    write_file_start: TimeMono,
}

/// Records one discovered stream according to one rule.
pub struct Recorder {
    shared: Arc<Mutex<Core>>,
    reader: Option<Subscriber>,
    _triggers: Vec<Box<dyn Trigger>>,
}

impl Recorder {
    pub fn new(
        config: &Config,
        rule: &Rule,
        read_path: PathBuf,
        announcer: Announcer,
    ) -> Result<Self, ConfigError> {
        let mut policies = Vec::new();
        for pcfg in &rule.policies {
            let kind = policy::make_kind(&pcfg.type_name, &pcfg.args)?;

            let mut control_topics: Vec<&String> = Vec::new();
            control_topics.extend(&rule.trigger_control_topic);
            control_topics.extend(&pcfg.trigger_control_topic);

            let gated = !control_topics.is_empty() && !kind.ignores_trigger_control();
            let enabled = Arc::new(ControlFlag::new(!gated));
            if gated {
                for topic in control_topics {
                    gate::register(topic_file(&config.searchpath, topic), &enabled);
                }
            }
            policies.push(PolicyCell { kind, enabled });
        }

        let read_rel = read_path
            .strip_prefix(&config.searchpath)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| {
                read_path
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("stream"))
            });

        let shared = Arc::new(Mutex::new(Core {
            savepath: config.savepath.clone(),
            read_path: read_path.clone(),
            read_rel,
            max_size: rule
                .max_logfile_size
                .unwrap_or(config.default_max_logfile_size),
            max_dur: rule
                .max_logfile_duration
                .unwrap_or(config.default_max_logfile_duration),
            rule_desc: rule.self_description.clone(),
            announcer,
            buffer: VecDeque::new(),
            policies,
            writer: None,
            write_file_start: TimeMono::default(),
        }));

        let mut triggers: Vec<Box<dyn Trigger>> = Vec::new();
        for (idx, pcfg) in rule.policies.iter().enumerate() {
            for tcfg in &pcfg.triggers {
                let weak = Arc::downgrade(&shared);
                let notify: Notify = Arc::new(move || {
                    if let Some(core) = weak.upgrade() {
                        core.lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .fire_policy(idx);
                    }
                });
                let flag = Arc::new(ControlFlag::new(tcfg.control_topic.is_none()));
                if let Some(topic) = &tcfg.control_topic {
                    gate::register(topic_file(&config.searchpath, topic), &flag);
                }
                triggers.push(trigger::build(
                    &tcfg.type_name,
                    &tcfg.args,
                    notify,
                    flag,
                    &config.searchpath,
                )?);
            }
        }

        // A rule without policies yields an inert recorder, matching the
        // configured intent: nothing to decide, nothing to read.
        let reader = if rule.policies.is_empty() {
            None
        } else {
            let shared_cb = shared.clone();
            let start_mono = config.start_time_mono;
            Some(Subscriber::new(
                read_path,
                ReadStart::Oldest,
                move |pkt| {
                    let mono = match pkt.time_mono() {
                        Some(mono) => mono,
                        None => return,
                    };
                    if pkt.time_wall().is_none() {
                        return;
                    }
                    if mono < start_mono {
                        return;
                    }
                    shared_cb
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .on_packet(pkt);
                },
            ))
        };

        Ok(Recorder {
            shared,
            reader,
            _triggers: triggers,
        })
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        // Stop the reader before the final drain so no packet arrives
        // mid-teardown.
        self.reader.take();
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .shutdown_drain();
    }
}

impl Core {
    fn on_packet(&mut self, pkt: Packet) {
        for cell in &mut self.policies {
            cell.kind.on_packet(&pkt);
        }
        self.buffer.push_back(pkt);
        self.drain();
    }

    fn fire_policy(&mut self, idx: usize) {
        let Some(cell) = self.policies.get_mut(idx) else {
            return;
        };
        if !cell.enabled.is_enabled() {
            return;
        }
        cell.kind.on_trigger();
        // A trigger can flip earlier DEFERs to SAVE; try to make progress.
        self.drain();
    }

    /// SAVE beats DEFER beats DROP across the pipeline.
    fn combined_decision(&mut self, pkt: &Packet) -> SaveDecision {
        let mut combined = SaveDecision::Drop;
        for cell in &mut self.policies {
            match cell.kind.should_save(pkt) {
                SaveDecision::Save => return SaveDecision::Save,
                SaveDecision::Defer => combined = SaveDecision::Defer,
                SaveDecision::Drop => {}
            }
        }
        combined
    }

    fn drain(&mut self) {
        while let Some(head) = self.buffer.front().cloned() {
            match self.combined_decision(&head) {
                SaveDecision::Save => {
                    self.maybe_start_next_file(&head);
                    if let Some(writer) = &mut self.writer {
                        if let Err(e) = writer.write(&head) {
                            tracing::error!(
                                stream = %self.read_path.display(),
                                error = %e,
                                "packet write failed"
                            );
                        }
                    }
                    self.finish_head(&head);
                }
                SaveDecision::Drop => self.finish_head(&head),
                SaveDecision::Defer => return,
            }
        }
    }

    /// Notifies policies and pops the head.
    fn finish_head(&mut self, head: &Packet) {
        for cell in &mut self.policies {
            cell.kind.on_drop(head);
        }
        self.buffer.pop_front();
    }

    fn maybe_start_next_file(&mut self, pkt: &Packet) {
        let roll = match &self.writer {
            None => true,
            Some(writer) => {
                writer.would_evict(pkt.serial_size()) || self.write_would_exceed_duration(pkt)
            }
        };
        if roll {
            self.start_next_file(pkt);
        }
    }

    fn write_would_exceed_duration(&self, pkt: &Packet) -> bool {
        match pkt.time_mono() {
            Some(mono) => self.write_file_start.saturating_add(self.max_dur) < mono,
            None => false,
        }
    }

    fn start_next_file(&mut self, pkt: &Packet) {
        self.close_current_file();

        let (mono, wall) = match (pkt.time_mono(), pkt.time_wall()) {
            (Some(mono), Some(wall)) => (mono, wall),
            // Ingestion guarantees stamps; a packet without them cannot
            // name an output file.
            _ => return,
        };

        let mut dst = self.savepath.join(wall.date_dirs()).join(&self.read_rel);
        let base = dst
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "stream".into());
        dst.set_file_name(format!("{base}@{wall}.a0"));

        match LogWriter::create(&dst, self.max_size) {
            Ok(writer) => {
                self.write_file_start = mono;
                tracing::info!(
                    stream = %self.read_path.display(),
                    file = %dst.display(),
                    "log file opened"
                );
                self.announce("opened", None, &dst);
                self.writer = Some(writer);
            }
            Err(e) => {
                tracing::error!(
                    stream = %self.read_path.display(),
                    file = %dst.display(),
                    error = %e,
                    "failed to open log file"
                );
                self.announce("error", Some(e.to_string()), &dst);
            }
        }
    }

    fn close_current_file(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let path = writer.path().to_path_buf();
            match writer.close() {
                Ok(()) => {
                    tracing::info!(file = %path.display(), "log file closed");
                    self.announce("closed", None, &path);
                }
                Err(e) => {
                    // No retry: the failure is announced and the next
                    // roll proceeds normally.
                    tracing::error!(file = %path.display(), error = %e, "log file close failed");
                    self.announce("error", Some(e.to_string()), &path);
                }
            }
        }
    }

    /// Final drain: write every packet whose verdict is SAVE right now,
    /// drop the rest, close the file.
    fn shutdown_drain(&mut self) {
        while let Some(pkt) = self.buffer.pop_front() {
            if self.combined_decision(&pkt) == SaveDecision::Save {
                self.maybe_start_next_file(&pkt);
                if let Some(writer) = &mut self.writer {
                    if let Err(e) = writer.write(&pkt) {
                        tracing::error!(error = %e, "packet write failed during drain");
                    }
                }
            }
            for cell in &mut self.policies {
                cell.kind.on_drop(&pkt);
            }
        }
        self.close_current_file();
    }

    fn announce(&self, action: &str, details: Option<String>, write_path: &Path) {
        let write_rel = write_path.strip_prefix(&self.savepath).unwrap_or(write_path);
        let mut payload = serde_json::json!({
            "action": action,
            "write_abspath": write_path,
            "write_relpath": write_rel,
            "read_abspath": self.read_path,
            "read_relpath": self.read_rel,
            "rule": self.rule_desc.clone(),
        });
        if let Some(details) = details {
            payload["details"] = details.into();
        }
        self.announcer.send(payload);
    }
}
