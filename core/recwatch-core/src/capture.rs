//! Capture outcome assessment and the camera pipeline drivers.
//!
//! A capture attempt has exactly three outcomes - a decoded frame, a
//! platform error code, or nothing at all - and the three carry different
//! certainty: an explicit "disabled" code is near-authoritative, an empty
//! payload is only suggestive, a frame needs pixel analysis. Collapsing
//! them to success/failure would lose that gradient, so [`CaptureOutcome`]
//! keeps all three and the assessors map each to a [`PrivacySignal`].

use crate::error::{Result, WatchError};
use crate::pixel::{is_single_color, PixelBlockDetector};
use crate::rolling::RollingLog;
use fs_err as fs;
use image::codecs::webp::WebPEncoder;
use image::RgbaImage;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Certainty attached to an explicit platform "disabled"/"denied" code.
const ERROR_CODE_CONFIDENCE: f32 = 0.9;
/// Certainty attached to an empty payload with no error.
const EMPTY_PAYLOAD_CONFIDENCE: f32 = 0.6;
/// Reported when the attempt carries no privacy evidence at all.
const NO_SIGNAL_CONFIDENCE: f32 = 0.1;

/// Platform failure codes a capture pipeline can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaptureErrorCode {
    CameraInUse,
    MaxCamerasInUse,
    /// Disabled by the system - the privacy toggle, device policy.
    CameraDisabled,
    CameraDeviceError,
    CameraServiceError,
    /// Legacy path: connecting to the camera service failed outright.
    ServiceConnectFailed,
    AccessDenied,
    Unknown(i32),
}

impl CaptureErrorCode {
    pub fn describe(&self) -> String {
        match self {
            CaptureErrorCode::CameraInUse => "Camera in use".to_string(),
            CaptureErrorCode::MaxCamerasInUse => "Max cameras in use".to_string(),
            CaptureErrorCode::CameraDisabled => {
                "Camera disabled by system (privacy toggle?)".to_string()
            }
            CaptureErrorCode::CameraDeviceError => "Camera device error".to_string(),
            CaptureErrorCode::CameraServiceError => "Camera service error".to_string(),
            CaptureErrorCode::ServiceConnectFailed => {
                "Failed to connect to camera service - possibly blocked".to_string()
            }
            CaptureErrorCode::AccessDenied => "Camera access denied".to_string(),
            CaptureErrorCode::Unknown(code) => format!("Unknown error ({code})"),
        }
    }

    /// Whether this code by itself implies the privacy toggle.
    pub fn implies_privacy_block(&self) -> bool {
        matches!(
            self,
            CaptureErrorCode::CameraDisabled
                | CaptureErrorCode::ServiceConnectFailed
                | CaptureErrorCode::AccessDenied
        )
    }
}

/// Three-way result of one capture attempt.
pub enum CaptureOutcome {
    /// Decoded frame; privacy status comes from pixel analysis.
    Frame(RgbaImage),
    /// Platform reported a failure code.
    Failed(CaptureErrorCode),
    /// No payload and no error.
    Empty,
}

/// Which signal source produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignalOrigin {
    PixelAnalysis,
    RepeatedPixel,
    ErrorCode,
    EmptyPayload,
}

/// One capture attempt's contribution to the privacy verdict.
///
/// `confidence` is absent on the repeated-pixel path, which is a plain
/// binary corroboration signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrivacySignal {
    pub disabled: bool,
    pub confidence: Option<f32>,
    pub origin: SignalOrigin,
}

/// Maps a legacy-path outcome to a privacy signal via the statistical
/// detector.
pub fn assess_legacy(outcome: &CaptureOutcome, detector: &PixelBlockDetector) -> PrivacySignal {
    match outcome {
        CaptureOutcome::Frame(frame) => {
            let verdict = detector.analyze(frame);
            PrivacySignal {
                disabled: verdict.disabled,
                confidence: Some(verdict.confidence),
                origin: SignalOrigin::PixelAnalysis,
            }
        }
        CaptureOutcome::Failed(code) => assess_error_code(*code),
        CaptureOutcome::Empty => PrivacySignal {
            disabled: true,
            confidence: Some(EMPTY_PAYLOAD_CONFIDENCE),
            origin: SignalOrigin::EmptyPayload,
        },
    }
}

/// Maps a modern-path outcome to a privacy signal via the repeated-pixel
/// test.
pub fn assess_modern(outcome: &CaptureOutcome) -> PrivacySignal {
    match outcome {
        CaptureOutcome::Frame(frame) => PrivacySignal {
            disabled: is_single_color(frame),
            confidence: None,
            origin: SignalOrigin::RepeatedPixel,
        },
        CaptureOutcome::Failed(code) => assess_error_code(*code),
        CaptureOutcome::Empty => PrivacySignal {
            disabled: true,
            confidence: Some(EMPTY_PAYLOAD_CONFIDENCE),
            origin: SignalOrigin::EmptyPayload,
        },
    }
}

fn assess_error_code(code: CaptureErrorCode) -> PrivacySignal {
    if code.implies_privacy_block() {
        PrivacySignal {
            disabled: true,
            confidence: Some(ERROR_CODE_CONFIDENCE),
            origin: SignalOrigin::ErrorCode,
        }
    } else {
        PrivacySignal {
            disabled: false,
            confidence: Some(NO_SIGNAL_CONFIDENCE),
            origin: SignalOrigin::ErrorCode,
        }
    }
}

/// Drives one camera path and reports the outcome of each attempt.
///
/// Implementations must release any pipeline-held resources before
/// returning, on success and failure alike.
pub trait CameraPipeline: Send {
    fn capture(&mut self) -> CaptureOutcome;
}

/// Keeps the most recent capture of one pipeline on disk, losslessly.
pub struct PhotoStore {
    path: PathBuf,
}

impl PhotoStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, frame: &RgbaImage) -> Result<()> {
        let file = fs::File::create(&self.path).map_err(|err| WatchError::Io {
            context: format!("Failed to create photo file {}", self.path.display()),
            source: err,
        })?;
        let encoder = WebPEncoder::new_lossless(file);
        frame
            .write_with_encoder(encoder)
            .map_err(|err| WatchError::Image {
                context: format!("Failed to encode photo {}", self.path.display()),
                source: err,
            })
    }

    pub fn has_photo(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<RgbaImage> {
        if !self.has_photo() {
            return Err(WatchError::FileNotFound(self.path.clone()));
        }
        let decoded = image::open(&self.path).map_err(|err| WatchError::Image {
            context: format!("Failed to load photo {}", self.path.display()),
            source: err,
        })?;
        Ok(decoded.to_rgba8())
    }

    pub fn delete(&self) -> Result<()> {
        if !self.has_photo() {
            return Ok(());
        }
        fs::remove_file(&self.path).map_err(|err| WatchError::Io {
            context: format!("Failed to delete photo {}", self.path.display()),
            source: err,
        })
    }
}

/// Legacy capture path: statistical pixel analysis on every frame.
pub struct LegacyCameraManager {
    pipeline: Box<dyn CameraPipeline>,
    detector: PixelBlockDetector,
    store: PhotoStore,
    log: RollingLog,
}

impl LegacyCameraManager {
    pub fn new(
        pipeline: Box<dyn CameraPipeline>,
        detector: PixelBlockDetector,
        store: PhotoStore,
        log: RollingLog,
    ) -> Self {
        Self {
            pipeline,
            detector,
            store,
            log,
        }
    }

    pub fn store(&self) -> &PhotoStore {
        &self.store
    }

    pub fn take_photo(&mut self) -> PrivacySignal {
        self.log.legacy_camera("Taking photo on legacy path");
        let outcome = self.pipeline.capture();
        let signal = assess_legacy(&outcome, &self.detector);

        match &outcome {
            CaptureOutcome::Frame(frame) => {
                if let Err(err) = self.store.save(frame) {
                    self.log.error(format!("Failed to save photo: {err}"));
                }
                if signal.disabled {
                    let confidence = signal.confidence.unwrap_or(0.0) * 100.0;
                    self.log.legacy_camera(format!(
                        "Camera appears to be blocked by privacy toggle: {confidence:.0}% confidence"
                    ));
                } else {
                    self.log.success(format!(
                        "Photo saved ({}x{})",
                        frame.width(),
                        frame.height()
                    ));
                }
            }
            CaptureOutcome::Failed(code) => {
                self.log.error(code.describe());
            }
            CaptureOutcome::Empty => {
                self.log
                    .error("Photo data is empty (privacy toggle may be enabled)");
            }
        }

        signal
    }
}

/// Modern capture path: exact repeated-pixel corroboration.
pub struct ModernCameraManager {
    pipeline: Box<dyn CameraPipeline>,
    store: PhotoStore,
    log: RollingLog,
}

impl ModernCameraManager {
    pub fn new(pipeline: Box<dyn CameraPipeline>, store: PhotoStore, log: RollingLog) -> Self {
        Self {
            pipeline,
            store,
            log,
        }
    }

    pub fn store(&self) -> &PhotoStore {
        &self.store
    }

    pub fn take_photo(&mut self) -> PrivacySignal {
        self.log.modern_camera("Taking photo on modern path");
        let outcome = self.pipeline.capture();
        let signal = assess_modern(&outcome);

        match &outcome {
            CaptureOutcome::Frame(frame) => {
                if signal.disabled {
                    self.log.modern_camera(
                        "Camera appears to be blocked by privacy toggle - repeated pixels detected",
                    );
                }
                if let Err(err) = self.store.save(frame) {
                    self.log.error(format!("Failed to save photo: {err}"));
                } else {
                    self.log.success(format!(
                        "Raw photo saved ({}x{})",
                        frame.width(),
                        frame.height()
                    ));
                }
            }
            CaptureOutcome::Failed(code) => {
                self.log.error(code.describe());
            }
            CaptureOutcome::Empty => {
                self.log
                    .error("Image is empty (privacy toggle may be enabled)");
            }
        }

        signal
    }
}
