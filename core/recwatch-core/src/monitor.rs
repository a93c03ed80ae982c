//! Recording-configuration monitoring and state aggregation.
//!
//! The platform signals "configurations changed" with no diff, so the
//! monitor recomputes the whole [`AudioSystemState`] on every event and
//! suppresses consecutive structurally-equal states. Subscribing emits
//! one initial snapshot; the platform registration is released when the
//! subscription handle drops.
//!
//! [`ChangeReporter`] is the logging-only consumer of the same seam: it
//! writes per-descriptor detail and an own/external summary to the
//! rolling log on each delivery.

use crate::descriptor::{AudioMode, RawRecord, SessionDescriptor, MEMBER_LOG_FRIENDLY_STRING};
use crate::ledger::SessionLedger;
use crate::probe::Prober;
use crate::rolling::RollingLog;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How often the worker wakes to check for shutdown while idle.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Identifies one registered change listener.
pub type ListenerId = u64;

/// Platform seam for the recording-configuration event stream.
///
/// `register_listener` arranges for a `()` signal on every configuration
/// change; the payload is always re-pulled via `active_records`, which
/// returns the full current set (no diffing, no ordering guarantees).
pub trait AudioSystem: Send + Sync {
    fn audio_mode(&self) -> AudioMode;
    fn active_records(&self) -> Vec<RawRecord>;
    fn register_listener(&self, notify: Sender<()>) -> Result<ListenerId, String>;
    fn unregister_listener(&self, listener: ListenerId);
}

/// Aggregated audio-system snapshot published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioSystemState {
    pub audio_mode: String,
    pub client_silenced_status: String,
    pub owned_recordings_status: String,
}

fn silenced_status(records: &[RawRecord]) -> String {
    if records.is_empty() {
        return "No active recordings".to_string();
    }
    let total = records.len();
    let silenced = records.iter().filter(|record| record.silenced).count();
    if silenced == 0 {
        format!("All {total} clients not silenced")
    } else if silenced == total {
        format!("All {total} clients silenced")
    } else {
        format!("{silenced}/{total} clients silenced")
    }
}

fn owned_status(records: &[RawRecord], ledger: &SessionLedger, prober: &Prober) -> String {
    let total = records.len();
    if total == 0 {
        return "0/0 owned recordings".to_string();
    }
    let owned = records
        .iter()
        .filter(|record| {
            let descriptor = SessionDescriptor::extract(record, prober);
            ledger.classify(
                descriptor.session_id,
                descriptor.port_id.as_str(),
                descriptor.owner_id.as_str(),
            )
        })
        .count();
    format!("{owned}/{total} owned recordings")
}

fn derive_state(system: &dyn AudioSystem, ledger: &SessionLedger, prober: &Prober) -> AudioSystemState {
    let records = system.active_records();
    AudioSystemState {
        audio_mode: system.audio_mode().describe(),
        client_silenced_status: silenced_status(&records),
        owned_recordings_status: owned_status(&records, ledger, prober),
    }
}

/// Derives and publishes deduplicated [`AudioSystemState`] snapshots.
pub struct AudioStateMonitor {
    system: Arc<dyn AudioSystem>,
    ledger: SessionLedger,
    prober: Arc<Prober>,
    log: RollingLog,
}

impl AudioStateMonitor {
    pub fn new(
        system: Arc<dyn AudioSystem>,
        ledger: SessionLedger,
        prober: Arc<Prober>,
        log: RollingLog,
    ) -> Self {
        Self {
            system,
            ledger,
            prober,
            log,
        }
    }

    /// Snapshot of the current state, outside any subscription.
    pub fn current_state(&self) -> AudioSystemState {
        derive_state(self.system.as_ref(), &self.ledger, &self.prober)
    }

    /// Starts observing. The returned handle owns the platform
    /// registration and the worker thread; dropping it releases both.
    ///
    /// If the platform registration fails the failure is logged and the
    /// subscription still delivers the initial snapshot - the state
    /// simply never updates. No retry.
    pub fn subscribe(&self) -> StateSubscription {
        // Register before snapshotting so no change falls in the gap;
        // a notification for an identical state dedups away.
        let (notify_tx, notify_rx) = mpsc::channel();
        let registration = match self.system.register_listener(notify_tx) {
            Ok(listener) => Some(listener),
            Err(details) => {
                self.log
                    .error(format!("Failed to register recording callback: {details}"));
                None
            }
        };

        let (state_tx, state_rx) = mpsc::channel();
        let initial = self.current_state();
        let _ = state_tx.send(initial.clone());

        let stop = Arc::new(AtomicBool::new(false));
        let worker = registration.is_some().then(|| {
            let system = Arc::clone(&self.system);
            let ledger = self.ledger.clone();
            let prober = Arc::clone(&self.prober);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut last = initial;
                loop {
                    match notify_rx.recv_timeout(STOP_POLL_INTERVAL) {
                        Ok(()) => {
                            let state = derive_state(system.as_ref(), &ledger, &prober);
                            if state != last {
                                last = state.clone();
                                if state_tx.send(state).is_err() {
                                    break;
                                }
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if stop.load(Ordering::SeqCst) {
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
        });

        StateSubscription {
            states: state_rx,
            registration,
            system: Arc::clone(&self.system),
            stop,
            worker,
        }
    }
}

/// Live subscription to deduplicated audio-state snapshots.
pub struct StateSubscription {
    states: Receiver<AudioSystemState>,
    registration: Option<ListenerId>,
    system: Arc<dyn AudioSystem>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl StateSubscription {
    pub fn states(&self) -> &Receiver<AudioSystemState> {
        &self.states
    }

    /// Blocks up to `timeout` for the next published state.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<AudioSystemState> {
        self.states.recv_timeout(timeout).ok()
    }

    /// Drains pending states and returns the most recent one.
    pub fn latest_pending(&self) -> Option<AudioSystemState> {
        self.states.try_iter().last()
    }
}

impl Drop for StateSubscription {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(listener) = self.registration.take() {
            self.system.unregister_listener(listener);
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Logs per-descriptor detail and own/external counts on each delivery.
pub struct ChangeReporter {
    system: Arc<dyn AudioSystem>,
    ledger: SessionLedger,
    prober: Arc<Prober>,
    log: RollingLog,
}

impl ChangeReporter {
    pub fn new(
        system: Arc<dyn AudioSystem>,
        ledger: SessionLedger,
        prober: Arc<Prober>,
        log: RollingLog,
    ) -> Self {
        Self {
            system,
            ledger,
            prober,
            log,
        }
    }

    /// Reports the current configuration set. Callers invoke this once
    /// per change notification.
    pub fn report(&self) {
        let records = self.system.active_records();
        if records.is_empty() {
            self.log.info("All recordings stopped");
            return;
        }

        self.log
            .callback(format!("Recording configs changed: {} active", records.len()));

        let mut own_count = 0usize;
        let mut external_count = 0usize;
        for (index, record) in records.iter().enumerate() {
            let number = index + 1;
            let descriptor = SessionDescriptor::extract(record, &self.prober);
            let friendly = self
                .prober
                .static_string_member(&record.handle, MEMBER_LOG_FRIENDLY_STRING);
            tracing::debug!(config = number, detail = %friendly, "recording configuration");

            let own = self.ledger.classify(
                descriptor.session_id,
                descriptor.port_id.as_str(),
                descriptor.owner_id.as_str(),
            );
            if own {
                own_count += 1;
            } else {
                external_count += 1;
            }

            self.log.info(format!(
                "\nConfig #{number}:\n    Session ID: {}\n    Port ID: {}\n    Owner: {}\n    Audio Source: {}\n    Sample Rate: {} Hz\n    Silenced: {}\n    Is own: {own}",
                descriptor.session_id,
                descriptor.port_id,
                descriptor.owner_id,
                descriptor.source.name(),
                descriptor.sample_rate_hz,
                descriptor.silenced,
            ));
        }

        self.log
            .callback(format!("Summary: {own_count} own, {external_count} external"));
    }
}
