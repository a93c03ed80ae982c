//! # recwatch-core
//!
//! Core library for recwatch: recording attribution and privacy-toggle
//! detection for the platform's audio/camera subsystem.
//!
//! The platform exposes neither session ownership nor a "blocked by
//! privacy toggle" flag, so both are inferred. Ownership comes from
//! correlating locally-tracked identifiers against partially-opaque
//! session descriptors; privacy blocking comes from fusing independent
//! heuristic signals - pixel statistics of captured frames, log-pattern
//! correlation, and capture-failure semantics.
//!
//! ## Design Principles
//!
//! - **Synchronous**: no async runtime; subscriptions own plain worker
//!   threads and release them on drop.
//! - **Degrade, don't fail**: classification and detection entry points
//!   return definite sentinel or low-confidence results instead of
//!   errors. Missing platform members answer "N/R", ambiguous pixel
//!   statistics answer low-confidence "not disabled".
//! - **Narrow platform seams**: the event feed, the member host, the
//!   log stream and the camera pipeline are traits; tests drive the
//!   engine with fakes, the daemon plugs in real transports.
//! - **One diagnostic channel**: user-visible events go through the
//!   bounded [`rolling::RollingLog`]; `tracing` stays for developers.

// Public modules
pub mod audio;
pub mod capture;
pub mod descriptor;
pub mod error;
pub mod ledger;
pub mod logscan;
pub mod monitor;
pub mod pixel;
pub mod probe;
pub mod rolling;

// Re-export commonly used items at crate root
pub use audio::{AudioRecorder, MediaRecorderManager, PcmCaptureManager, PcmRecorder};
pub use capture::{
    assess_legacy, assess_modern, CameraPipeline, CaptureErrorCode, CaptureOutcome,
    LegacyCameraManager, ModernCameraManager, PhotoStore, PrivacySignal, SignalOrigin,
};
pub use descriptor::{AudioMode, AudioSource, RawRecord, SessionDescriptor};
pub use error::{Result, WatchError};
pub use ledger::{is_own, LedgerView, SessionLedger};
pub use logscan::{
    CameraBlockSignal, CommandLogSource, LogScanner, LogSource, LogWatcher, LogWatcherHandle,
};
pub use monitor::{
    AudioStateMonitor, AudioSystem, AudioSystemState, ChangeReporter, ListenerId,
    StateSubscription,
};
pub use pixel::{is_single_color, BlockVerdict, DetectorThresholds, PixelBlockDetector};
pub use probe::{DescriptorHandle, FieldValue, MemberHost, ProbeError, Prober};
pub use rolling::{LogTag, RollingLog, DEFAULT_LOG_CAPACITY};
