//! Platform adapters for the daemon.
//!
//! The daemon does not link the platform runtime directly; it consumes
//! recorded or relayed descriptor events as JSON lines and serves hidden
//! descriptor fields back out of each event's field bag. On-device
//! deployments swap these for bindings to the real recording service.

use recwatch_core::descriptor::{AudioMode, AudioSource, RawRecord, RECORDING_CONFIGURATION_TYPE};
use recwatch_core::monitor::{AudioSystem, ListenerId};
use recwatch_core::probe::{DescriptorHandle, MemberHost, ProbeError};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Serves descriptor members from the JSON field bag each replayed
/// descriptor carries.
///
/// A key absent from the bag means the recorder could not retrieve that
/// member, so lookups degrade to "N/R" exactly like a missing platform
/// member would. The log-friendly formatter is deliberately not served:
/// replay bags never carry it.
pub struct JsonMemberHost;

const SERVED_MEMBERS: [&str; 2] = ["getClientPortId", "getClientPackageName"];

impl MemberHost for JsonMemberHost {
    fn grant_exemption(&self, _type_signature: &str) -> bool {
        // Replayed payloads are plain JSON; there is no access gate.
        true
    }

    fn members(&self, type_name: &str) -> Result<Vec<String>, ProbeError> {
        if type_name == RECORDING_CONFIGURATION_TYPE {
            Ok(SERVED_MEMBERS.iter().map(|name| name.to_string()).collect())
        } else {
            Ok(Vec::new())
        }
    }

    fn invoke(
        &self,
        _type_name: &str,
        instance: Option<&DescriptorHandle>,
        member: &str,
        _args: &[Value],
    ) -> Result<Value, ProbeError> {
        let bag = instance
            .map(|handle| &handle.raw)
            .ok_or_else(|| ProbeError::InvocationFailed("no instance".to_string()))?;
        bag.get(member)
            .cloned()
            .ok_or_else(|| ProbeError::InvocationFailed(format!("{member} not recorded")))
    }
}

/// One recording-configuration event as delivered on the feed: the full
/// current descriptor set, no diff.
#[derive(Debug, Deserialize)]
struct FeedEvent {
    #[serde(default)]
    audio_mode: i32,
    #[serde(default)]
    records: Vec<FeedRecord>,
}

#[derive(Debug, Deserialize)]
struct FeedRecord {
    session_id: i32,
    #[serde(default)]
    source: i32,
    #[serde(default = "default_sample_rate")]
    sample_rate_hz: u32,
    #[serde(default)]
    silenced: bool,
    /// Hidden members the recorder managed to extract, if any.
    #[serde(default)]
    fields: Value,
}

fn default_sample_rate() -> u32 {
    44_100
}

struct FeedInner {
    mode: Mutex<AudioMode>,
    records: Mutex<Vec<RawRecord>>,
    listeners: Mutex<HashMap<ListenerId, Sender<()>>>,
    next_listener: AtomicU64,
    finished: AtomicBool,
}

/// [`AudioSystem`] fed by JSON-lines events.
///
/// Each applied event replaces the full descriptor set and signals every
/// registered listener, mirroring the platform's configuration-changed
/// callback semantics.
#[derive(Clone)]
pub struct ReplayAudioFeed {
    inner: Arc<FeedInner>,
}

impl Default for ReplayAudioFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayAudioFeed {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FeedInner {
                mode: Mutex::new(AudioMode::Normal),
                records: Mutex::new(Vec::new()),
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(1),
                finished: AtomicBool::new(false),
            }),
        }
    }

    /// Parses and applies one feed line. Blank lines are skipped.
    pub fn apply_line(&self, line: &str) -> Result<(), serde_json::Error> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        let event: FeedEvent = serde_json::from_str(trimmed)?;
        self.apply(event);
        Ok(())
    }

    fn apply(&self, event: FeedEvent) {
        let records = event
            .records
            .into_iter()
            .map(|record| RawRecord {
                session_id: record.session_id,
                source: AudioSource::from_raw(record.source),
                sample_rate_hz: record.sample_rate_hz,
                silenced: record.silenced,
                handle: DescriptorHandle::new(RECORDING_CONFIGURATION_TYPE, record.fields),
            })
            .collect();

        if let Ok(mut mode) = self.inner.mode.lock() {
            *mode = AudioMode::from_raw(event.audio_mode);
        }
        if let Ok(mut current) = self.inner.records.lock() {
            *current = records;
        }
        self.notify_listeners();
    }

    fn notify_listeners(&self) {
        if let Ok(listeners) = self.inner.listeners.lock() {
            for sender in listeners.values() {
                let _ = sender.send(());
            }
        }
    }

    /// Consumes the reader line by line on a background thread until EOF
    /// or a read error. Malformed lines are logged and skipped.
    pub fn pump(&self, reader: impl BufRead + Send + 'static) -> JoinHandle<()> {
        let feed = self.clone();
        std::thread::spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if let Err(err) = feed.apply_line(&line) {
                            tracing::warn!(error = %err, "skipping malformed feed event");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "descriptor feed read failed");
                        break;
                    }
                }
            }
            feed.inner.finished.store(true, Ordering::SeqCst);
        })
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::SeqCst)
    }
}

impl AudioSystem for ReplayAudioFeed {
    fn audio_mode(&self) -> AudioMode {
        self.inner
            .mode
            .lock()
            .map(|mode| *mode)
            .unwrap_or(AudioMode::Unknown(-1))
    }

    fn active_records(&self) -> Vec<RawRecord> {
        self.inner
            .records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    fn register_listener(&self, notify: Sender<()>) -> Result<ListenerId, String> {
        let id = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
        self.inner
            .listeners
            .lock()
            .map_err(|_| "listener table poisoned".to_string())?
            .insert(id, notify);
        Ok(id)
    }

    fn unregister_listener(&self, listener: ListenerId) {
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.remove(&listener);
        }
    }
}
