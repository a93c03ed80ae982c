//! Local audio capture drivers: the writers of the session ledger.
//!
//! Starting a probe recording is what puts identifiers into the ledger,
//! and stopping it must take them out again on every exit path - normal
//! stop, start failure, or teardown - or a future external session that
//! reuses the numeric id would classify as our own. Teardown safety
//! comes from `Drop`: both managers untrack and release their platform
//! recorder when they go out of scope.
//!
//! The two paths mirror the platform's recorders. The file-backed
//! recorder only reveals its routing port id, and only through the
//! introspection shim; the PCM recorder hands back its session id
//! directly.

use crate::ledger::SessionLedger;
use crate::probe::{DescriptorHandle, Prober};
use crate::rolling::RollingLog;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Member probed off the file-backed recorder's handle.
pub const MEMBER_PORT_ID: &str = "getPortId";

/// File-backed platform recorder (compressed container output).
pub trait AudioRecorder: Send {
    /// Begins recording to `output`. The returned handle is the live
    /// recorder instance; its port id is only reachable through the
    /// introspection shim.
    fn start(&mut self, output: &Path) -> Result<DescriptorHandle, String>;
    fn stop(&mut self);
}

/// Raw PCM platform recorder; exposes its session id directly.
pub trait PcmRecorder: Send {
    fn start(&mut self) -> Result<i32, String>;
    fn stop(&mut self);
}

/// Drives the file-backed recorder and tracks its port id.
pub struct MediaRecorderManager {
    recorder: Box<dyn AudioRecorder>,
    ledger: SessionLedger,
    prober: Arc<Prober>,
    log: RollingLog,
    output: Option<NamedTempFile>,
    current_port: Option<i32>,
}

impl MediaRecorderManager {
    pub fn new(
        recorder: Box<dyn AudioRecorder>,
        ledger: SessionLedger,
        prober: Arc<Prober>,
        log: RollingLog,
    ) -> Self {
        Self {
            recorder,
            ledger,
            prober,
            log,
            output: None,
            current_port: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.output.is_some()
    }

    /// Starts a probe recording into a temp file. Returns whether the
    /// recorder is now running.
    pub fn start_recording(&mut self) -> bool {
        if self.is_recording() {
            return false;
        }

        let output = match tempfile::Builder::new()
            .prefix("recwatch_probe_")
            .suffix(".3gp")
            .tempfile()
        {
            Ok(file) => file,
            Err(err) => {
                self.log
                    .error(format!("Failed to create temp file for recorder: {err}"));
                return false;
            }
        };

        match self.recorder.start(output.path()) {
            Ok(handle) => {
                let port = self.prober.int_member(&handle, MEMBER_PORT_ID);
                self.log.media_recorder(format!("Port ID: {port}"));
                if let Some(id) = port.parse_i32() {
                    self.current_port = Some(id);
                    self.ledger.add_port(id);
                }
                self.output = Some(output);
                self.log.media_recorder("Started recording");
                true
            }
            Err(err) => {
                self.log.error(format!("Failed to start recorder: {err}"));
                false
            }
        }
    }

    pub fn stop_recording(&mut self) {
        if !self.is_recording() {
            return;
        }
        self.recorder.stop();
        self.log.media_recorder("Stopped recording");
        self.untrack();
    }

    fn untrack(&mut self) {
        if let Some(port) = self.current_port.take() {
            self.ledger.remove_port(port);
        }
        // Dropping the temp file deletes the probe recording.
        self.output = None;
    }
}

impl Drop for MediaRecorderManager {
    fn drop(&mut self) {
        if self.is_recording() {
            self.recorder.stop();
        }
        self.untrack();
    }
}

/// Drives the PCM recorder and tracks its session id.
pub struct PcmCaptureManager {
    recorder: Box<dyn PcmRecorder>,
    ledger: SessionLedger,
    log: RollingLog,
    current_session: Option<i32>,
}

impl PcmCaptureManager {
    pub fn new(recorder: Box<dyn PcmRecorder>, ledger: SessionLedger, log: RollingLog) -> Self {
        Self {
            recorder,
            ledger,
            log,
            current_session: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.current_session.is_some()
    }

    pub fn start_recording(&mut self) -> bool {
        if self.is_recording() {
            return false;
        }
        match self.recorder.start() {
            Ok(session_id) => {
                self.current_session = Some(session_id);
                self.ledger.add_session(session_id);
                self.log
                    .audio_record(format!("Started recording, Session ID: {session_id}"));
                true
            }
            Err(err) => {
                self.log.error(format!("Failed to start PCM capture: {err}"));
                false
            }
        }
    }

    pub fn stop_recording(&mut self) {
        if !self.is_recording() {
            return;
        }
        self.recorder.stop();
        self.log.audio_record("Stopped recording");
        self.untrack();
    }

    fn untrack(&mut self) {
        if let Some(session_id) = self.current_session.take() {
            self.ledger.remove_session(session_id);
        }
    }
}

impl Drop for PcmCaptureManager {
    fn drop(&mut self) {
        if self.is_recording() {
            self.recorder.stop();
        }
        self.untrack();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{MemberHost, ProbeError};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct PortHost {
        port: i64,
    }

    impl MemberHost for PortHost {
        fn grant_exemption(&self, _type_signature: &str) -> bool {
            true
        }

        fn members(&self, _type_name: &str) -> Result<Vec<String>, ProbeError> {
            Ok(vec![MEMBER_PORT_ID.to_string()])
        }

        fn invoke(
            &self,
            _type_name: &str,
            _instance: Option<&DescriptorHandle>,
            member: &str,
            _args: &[Value],
        ) -> Result<Value, ProbeError> {
            if member == MEMBER_PORT_ID {
                Ok(json!(self.port))
            } else {
                Err(ProbeError::MemberNotFound(member.to_string()))
            }
        }
    }

    struct FakeRecorder {
        stopped: Arc<AtomicBool>,
        fail_start: bool,
    }

    impl AudioRecorder for FakeRecorder {
        fn start(&mut self, _output: &Path) -> Result<DescriptorHandle, String> {
            if self.fail_start {
                return Err("recorder busy".to_string());
            }
            Ok(DescriptorHandle::new("android.media.MediaRecorder", json!({})))
        }

        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    struct FakePcm {
        session_id: i32,
        stopped: Arc<AtomicBool>,
    }

    impl PcmRecorder for FakePcm {
        fn start(&mut self) -> Result<i32, String> {
            Ok(self.session_id)
        }

        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    fn media_manager(port: i64, fail_start: bool) -> (MediaRecorderManager, SessionLedger, Arc<AtomicBool>) {
        let log = RollingLog::new();
        let ledger = SessionLedger::new(log.clone());
        let prober = Arc::new(Prober::new(Box::new(PortHost { port }), log.clone()));
        let stopped = Arc::new(AtomicBool::new(false));
        let manager = MediaRecorderManager::new(
            Box::new(FakeRecorder {
                stopped: Arc::clone(&stopped),
                fail_start,
            }),
            ledger.clone(),
            prober,
            log,
        );
        (manager, ledger, stopped)
    }

    #[test]
    fn start_tracks_port_and_stop_untracks() {
        let (mut manager, ledger, stopped) = media_manager(940, false);

        assert!(manager.start_recording());
        assert!(manager.is_recording());
        assert!(ledger.classify(0, "940", ""));

        manager.stop_recording();
        assert!(!manager.is_recording());
        assert!(!ledger.classify(0, "940", ""));
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn not_applicable_port_still_records() {
        // Port id of -1 means "N/A": nothing to track, recording runs.
        let (mut manager, ledger, _) = media_manager(-1, false);

        assert!(manager.start_recording());
        assert!(ledger.view().port_ids.is_empty());
    }

    #[test]
    fn start_failure_tracks_nothing() {
        let (mut manager, ledger, _) = media_manager(940, true);

        assert!(!manager.start_recording());
        assert!(!manager.is_recording());
        assert!(ledger.view().port_ids.is_empty());
    }

    #[test]
    fn double_start_is_rejected() {
        let (mut manager, _, _) = media_manager(940, false);
        assert!(manager.start_recording());
        assert!(!manager.start_recording());
    }

    #[test]
    fn teardown_untracks_mid_recording() {
        let (mut manager, ledger, stopped) = media_manager(940, false);
        assert!(manager.start_recording());
        drop(manager);

        assert!(!ledger.classify(0, "940", ""));
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn pcm_capture_tracks_session_id_lifecycle() {
        let log = RollingLog::new();
        let ledger = SessionLedger::new(log.clone());
        let stopped = Arc::new(AtomicBool::new(false));
        let mut manager = PcmCaptureManager::new(
            Box::new(FakePcm {
                session_id: 42,
                stopped: Arc::clone(&stopped),
            }),
            ledger.clone(),
            log,
        );

        assert!(manager.start_recording());
        assert!(ledger.classify(42, "N/R", ""));

        manager.stop_recording();
        assert!(!ledger.classify(42, "N/R", ""));
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn pcm_teardown_untracks_session() {
        let log = RollingLog::new();
        let ledger = SessionLedger::new(log.clone());
        let mut manager = PcmCaptureManager::new(
            Box::new(FakePcm {
                session_id: 7,
                stopped: Arc::new(AtomicBool::new(false)),
            }),
            ledger.clone(),
            log,
        );
        assert!(manager.start_recording());
        drop(manager);

        assert!(!ledger.classify(7, "N/R", ""));
    }
}
