//! Log-pattern correlation for camera privacy-toggle detection.
//!
//! The platform writes no single authoritative line when the privacy
//! toggle withholds the camera. What it does write, observed empirically,
//! is a handler-teardown error block whose keywords co-occur only in that
//! failure mode. [`LogScanner`] is the pure state machine over the line
//! stream; [`LogWatcher`] runs it against a live [`LogSource`] on a
//! background thread and owns the stream's lifecycle, including forcible
//! release on cancellation.

use crate::error::{Result, WatchError};
use crate::rolling::RollingLog;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// An error block older than this is force-closed; stale lines must not
/// bleed into unrelated output.
pub const BLOCK_TIMEOUT: Duration = Duration::from_millis(1500);

/// Prefix the platform log prints at the start of each entry in long
/// format.
const LOG_ENTRY_START: &str = "[ ";

/// All of these must appear in one accumulated block.
const TARGET_KEYWORDS: [&str; 4] = ["MessageQueue", "Handler", "dead thread", "IllegalStateException"];

/// At least one of these ties the block to the camera stack.
const CAMERA_KEYWORDS: [&str; 4] = [
    "camera2",
    "CameraDevice",
    "CameraHandler",
    "android.hardware.camera",
];

static RE_TARGET: Lazy<Vec<Regex>> = Lazy::new(|| case_insensitive(&TARGET_KEYWORDS));
static RE_CAMERA: Lazy<Vec<Regex>> = Lazy::new(|| case_insensitive(&CAMERA_KEYWORDS));

fn case_insensitive(keywords: &[&str]) -> Vec<Regex> {
    keywords
        .iter()
        .map(|keyword| {
            Regex::new(&format!("(?i){}", regex::escape(keyword))).expect("static keyword regex")
        })
        .collect()
}

fn contains_any(text: &str, patterns: &[Regex]) -> bool {
    patterns.iter().any(|pattern| pattern.is_match(text))
}

fn contains_all(text: &str, patterns: &[Regex]) -> bool {
    patterns.iter().all(|pattern| pattern.is_match(text))
}

/// Signal that the camera is being withheld by the privacy toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraBlockSignal {
    pub detected_at: DateTime<Utc>,
}

/// Streaming state machine over raw log lines.
///
/// Pure apart from the injected clock: callers pass `now` so tests can
/// drive the timeout without sleeping.
pub struct LogScanner {
    buffer: String,
    in_block: bool,
    block_started: Option<Instant>,
    signaled: bool,
    timeout: Duration,
}

impl Default for LogScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl LogScanner {
    pub fn new() -> Self {
        Self::with_timeout(BLOCK_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            buffer: String::new(),
            in_block: false,
            block_started: None,
            signaled: false,
            timeout,
        }
    }

    /// Feeds one raw line; returns whether a detection fired.
    ///
    /// Emits at most once per block: replaying matching lines inside the
    /// same block stays silent until an entry-start marker or the block
    /// timeout opens a fresh block.
    pub fn feed(&mut self, line: &str, now: Instant) -> bool {
        if line.starts_with(LOG_ENTRY_START) {
            self.buffer.clear();
            self.in_block = false;
            self.signaled = false;
            self.block_started = Some(now);
        }

        self.buffer.push_str(line);
        self.buffer.push('\n');

        if !self.in_block && contains_any(line, &RE_TARGET) {
            self.in_block = true;
            self.signaled = false;
            if self.block_started.is_none() {
                self.block_started = Some(now);
            }
        }

        let mut fired = false;
        if self.in_block && !self.signaled && self.is_target_error() {
            fired = true;
            self.signaled = true;
        }

        // Bound how long a candidate block may keep matching.
        if self.in_block {
            if let Some(started) = self.block_started {
                if now.duration_since(started) > self.timeout {
                    self.in_block = false;
                }
            }
        }

        fired
    }

    /// All target keywords plus at least one camera keyword in the
    /// accumulated block.
    fn is_target_error(&self) -> bool {
        contains_all(&self.buffer, &RE_TARGET) && contains_any(&self.buffer, &RE_CAMERA)
    }
}

/// Line-oriented feed of live log output.
///
/// `next_line` may block; `canceller` returns a closure that forcibly
/// unblocks and releases the stream from another thread.
pub trait LogSource: Send {
    fn next_line(&mut self) -> io::Result<Option<String>>;
    fn canceller(&self) -> Box<dyn Fn() + Send + Sync>;
}

/// [`LogSource`] backed by a spawned platform log command.
///
/// The backlog is cleared before tailing so the monitor only correlates
/// lines produced after it started.
pub struct CommandLogSource {
    child: Arc<Mutex<Child>>,
    reader: BufReader<ChildStdout>,
}

impl CommandLogSource {
    /// Spawns `program follow_args...` with piped stdout, first running
    /// `program clear_args...` to completion when `clear_args` is given.
    pub fn spawn(program: &str, clear_args: &[&str], follow_args: &[&str]) -> Result<Self> {
        if !clear_args.is_empty() {
            let cleared = Command::new(program)
                .args(clear_args)
                .status()
                .map_err(|err| WatchError::LogFeedSpawn {
                    command: format!("{program} {}", clear_args.join(" ")),
                    details: err.to_string(),
                })?;
            if !cleared.success() {
                tracing::warn!(program, status = %cleared, "log backlog clear failed");
            }
        }

        let mut child = Command::new(program)
            .args(follow_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| WatchError::LogFeedSpawn {
                command: format!("{program} {}", follow_args.join(" ")),
                details: err.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| WatchError::LogFeedSpawn {
            command: program.to_string(),
            details: "child stdout not captured".to_string(),
        })?;

        Ok(Self {
            child: Arc::new(Mutex::new(child)),
            reader: BufReader::new(stdout),
        })
    }

    /// The platform's default log feed in long format.
    pub fn logcat() -> Result<Self> {
        Self::spawn("logcat", &["-c"], &["-v", "long"])
    }
}

fn kill_child(child: &Arc<Mutex<Child>>) {
    if let Ok(mut child) = child.lock() {
        // Kill on an already-dead child answers InvalidInput; ignore.
        let _ = child.kill();
        let _ = child.wait();
    }
}

impl LogSource for CommandLogSource {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => Ok(None),
            Ok(_) => {
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Ok(Some(line))
            }
            Err(err) => Err(err),
        }
    }

    fn canceller(&self) -> Box<dyn Fn() + Send + Sync> {
        let child = Arc::clone(&self.child);
        Box::new(move || kill_child(&child))
    }
}

impl Drop for CommandLogSource {
    fn drop(&mut self) {
        kill_child(&self.child);
    }
}

/// Background consumer of a [`LogSource`].
///
/// Signals arrive on a channel; dropping the handle cancels the stream
/// without waiting for further lines. Read failures are logged and end
/// the monitor for this session - no reconnect; the operator re-triggers
/// manually.
pub struct LogWatcher;

impl LogWatcher {
    pub fn start(source: Box<dyn LogSource>, log: RollingLog) -> LogWatcherHandle {
        Self::start_with_timeout(source, log, BLOCK_TIMEOUT)
    }

    pub fn start_with_timeout(
        mut source: Box<dyn LogSource>,
        log: RollingLog,
        block_timeout: Duration,
    ) -> LogWatcherHandle {
        let cancel = source.canceller();
        let (signal_tx, signal_rx) = mpsc::channel();

        let worker = std::thread::spawn(move || {
            let release = source.canceller();
            let mut scanner = LogScanner::with_timeout(block_timeout);
            loop {
                match source.next_line() {
                    Ok(Some(line)) => {
                        if scanner.feed(&line, Instant::now()) {
                            log.error("Camera disabled by privacy toggle detected in system log");
                            if signal_tx
                                .send(CameraBlockSignal {
                                    detected_at: Utc::now(),
                                })
                                .is_err()
                            {
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        log.system("Log feed ended");
                        break;
                    }
                    Err(err) => {
                        log.error(format!("Log monitoring error: {err}"));
                        break;
                    }
                }
            }
            release();
        });

        LogWatcherHandle {
            signals: signal_rx,
            cancel: Some(cancel),
            worker: Some(worker),
        }
    }
}

pub struct LogWatcherHandle {
    signals: Receiver<CameraBlockSignal>,
    cancel: Option<Box<dyn Fn() + Send + Sync>>,
    worker: Option<JoinHandle<()>>,
}

impl LogWatcherHandle {
    pub fn signals(&self) -> &Receiver<CameraBlockSignal> {
        &self.signals
    }

    /// Blocks up to `timeout` for the next detection.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<CameraBlockSignal> {
        self.signals.recv_timeout(timeout).ok()
    }

    /// Terminates the stream and joins the reader. In-flight buffered
    /// content is discarded.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for LogWatcherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn scripted_block() -> Vec<&'static str> {
        vec![
            "[ 06-12 11:32:16.404  1923: 2045 E/MessageQueue ]",
            "Handler (android.hardware.camera2.impl.CameraDeviceImpl$CameraHandler) {a1b2c3}",
            "sending message to a Handler on a dead thread",
            "java.lang.IllegalStateException: Handler (CameraHandler) sending to dead thread",
        ]
    }

    #[test]
    fn full_keyword_block_fires_exactly_once() {
        let mut scanner = LogScanner::new();
        let now = Instant::now();

        let mut fired = 0;
        for line in scripted_block() {
            if scanner.feed(line, now) {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);

        // Replaying matching lines inside the same block stays silent.
        for line in &scripted_block()[1..] {
            assert!(!scanner.feed(line, now));
        }
    }

    #[test]
    fn block_without_camera_keyword_stays_silent() {
        let mut scanner = LogScanner::new();
        let now = Instant::now();

        let lines = [
            "[ 06-12 11:32:16.404  1923: 2045 E/MessageQueue ]",
            "Handler {a1b2c3} sending message to a Handler on a dead thread",
            "java.lang.IllegalStateException: sending to dead thread",
        ];
        for line in lines {
            assert!(!scanner.feed(line, now));
        }
    }

    #[test]
    fn keywords_match_case_insensitively() {
        let mut scanner = LogScanner::new();
        let now = Instant::now();

        let lines = [
            "[ 06-12 11:32:16.404  1923: 2045 E/messagequeue ]",
            "HANDLER sending message to a handler on a DEAD THREAD",
            "java.lang.illegalstateexception via CAMERADEVICE teardown",
        ];
        let fired = lines.iter().filter(|line| scanner.feed(line, now)).count();
        assert_eq!(fired, 1);
    }

    #[test]
    fn timeout_closes_block_and_fresh_sequence_fires_again() {
        let mut scanner = LogScanner::new();
        let start = Instant::now();

        let mut fired = 0;
        for line in scripted_block() {
            if scanner.feed(line, start) {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);

        // Past the block timeout the candidate block force-closes...
        let late = start + Duration::from_millis(1600);
        assert!(!scanner.feed("unrelated output", late));

        // ...so a fresh matching sequence raises an independent signal.
        let fresh = scripted_block();
        let refired = fresh
            .iter()
            .filter(|line| scanner.feed(line, late))
            .count();
        assert_eq!(refired, 1);
    }

    #[test]
    fn entry_start_marker_resets_accumulation() {
        let mut scanner = LogScanner::new();
        let now = Instant::now();

        for line in &scripted_block()[..3] {
            assert!(!scanner.feed(line, now));
        }

        // New entry wipes the partial keyword accumulation.
        assert!(!scanner.feed("[ 06-12 11:32:17.000  1923: 2045 I/other ]", now));
        assert!(!scanner.feed(
            "java.lang.IllegalStateException from CameraDevice",
            now
        ));
    }

    #[test]
    fn malformed_lines_are_tolerated() {
        let mut scanner = LogScanner::new();
        let now = Instant::now();

        assert!(!scanner.feed("", now));
        assert!(!scanner.feed("\u{0}\u{1}garbage\u{fffd}", now));
        assert!(!scanner.feed("[ partial header", now));
    }

    // ========================================
    // Watcher over a scripted source
    // ========================================

    struct ScriptedSource {
        lines: VecDeque<String>,
    }

    impl ScriptedSource {
        fn new(lines: &[&str]) -> Self {
            Self {
                lines: lines.iter().map(|line| line.to_string()).collect(),
            }
        }
    }

    impl LogSource for ScriptedSource {
        fn next_line(&mut self) -> io::Result<Option<String>> {
            Ok(self.lines.pop_front())
        }

        fn canceller(&self) -> Box<dyn Fn() + Send + Sync> {
            Box::new(|| {})
        }
    }

    #[test]
    fn watcher_emits_signal_and_logs_detection() {
        let log = RollingLog::new();
        let source = ScriptedSource::new(&scripted_block());
        let handle = LogWatcher::start(Box::new(source), log.clone());

        let signal = handle.recv_timeout(Duration::from_secs(2));
        assert!(signal.is_some());

        handle.stop();
        let entries = log.entries();
        assert!(entries
            .iter()
            .any(|line| line.contains("Camera disabled by privacy toggle")));
        assert!(entries.iter().any(|line| line.contains("Log feed ended")));
    }

    struct FailingSource;

    impl LogSource for FailingSource {
        fn next_line(&mut self) -> io::Result<Option<String>> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream torn down"))
        }

        fn canceller(&self) -> Box<dyn Fn() + Send + Sync> {
            Box::new(|| {})
        }
    }

    #[test]
    fn read_error_terminates_monitor_and_is_logged() {
        let log = RollingLog::new();
        let handle = LogWatcher::start(Box::new(FailingSource), log.clone());

        assert_eq!(handle.recv_timeout(Duration::from_millis(500)), None);
        handle.stop();

        assert!(log
            .entries()
            .iter()
            .any(|line| line.contains("Log monitoring error")));
    }
}
