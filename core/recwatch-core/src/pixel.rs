//! Pixel-statistics classifiers for privacy-blocked captures.
//!
//! A hardware-blocked sensor on this platform family does not fail the
//! capture; it emits a near-constant, very-low-brightness frame whose
//! pixels are dominated by a single color channel. The statistical
//! detector interprets that absence-of-error signature; the cheaper
//! repeated-pixel test corroborates it on the modern capture path.
//!
//! Both are heuristics, not ground truth. The thresholds were tuned
//! against one sensor generation and the legacy YUV conversion path is
//! known to distort colors, so verdicts carry a confidence and the
//! thresholds stay configurable.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Verdict of the statistical detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlockVerdict {
    pub disabled: bool,
    /// 0.0-1.0; capped at 0.95 even on the strongest signature.
    pub confidence: f32,
}

/// Tunable cut-offs for [`PixelBlockDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorThresholds {
    /// Distinct-color ratio below which a frame counts as uniform.
    pub max_unique_ratio: f32,
    /// Share of single-channel pixels above which a frame counts as
    /// channel-dominated.
    pub min_single_channel_ratio: f32,
    /// Highest channel value a blocked frame may contain.
    pub max_channel_value: u8,
    /// Stronger variants of the three cut-offs; each one met adds 0.1
    /// confidence.
    pub strong_unique_ratio: f32,
    pub strong_single_channel_ratio: f32,
    pub strong_max_channel_value: u8,
}

impl Default for DetectorThresholds {
    fn default() -> Self {
        Self {
            max_unique_ratio: 0.01,
            min_single_channel_ratio: 0.6,
            max_channel_value: 12,
            strong_unique_ratio: 0.005,
            strong_single_channel_ratio: 0.8,
            strong_max_channel_value: 8,
        }
    }
}

const BASE_CONFIDENCE: f32 = 0.7;
const CONFIDENCE_BOOST: f32 = 0.1;
const CONFIDENCE_CAP: f32 = 0.95;
const MIN_CONFIDENCE: f32 = 0.1;

/// Statistical classifier for the legacy capture path.
#[derive(Debug, Clone, Default)]
pub struct PixelBlockDetector {
    thresholds: DetectorThresholds,
}

impl PixelBlockDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: DetectorThresholds) -> Self {
        Self { thresholds }
    }

    /// Classifies a decoded frame.
    ///
    /// An empty frame carries no signal and reports a low-confidence
    /// "not disabled" rather than an error.
    pub fn analyze(&self, frame: &RgbaImage) -> BlockVerdict {
        let total = (frame.width() as usize) * (frame.height() as usize);
        if total == 0 {
            return BlockVerdict {
                disabled: false,
                confidence: MIN_CONFIDENCE,
            };
        }

        let mut unique_colors: HashSet<[u8; 3]> = HashSet::new();
        let mut single_channel_count = 0usize;
        let mut max_channel_value = 0u8;

        for pixel in frame.pixels() {
            let [r, g, b, _] = pixel.0;
            unique_colors.insert([r, g, b]);
            max_channel_value = max_channel_value.max(r).max(g).max(b);

            let active_channels = [r, g, b].iter().filter(|&&value| value > 0).count();
            if active_channels == 1 {
                single_channel_count += 1;
            }
        }

        let unique_ratio = unique_colors.len() as f32 / total as f32;
        let single_channel_ratio = single_channel_count as f32 / total as f32;

        let t = &self.thresholds;
        let disabled = unique_ratio < t.max_unique_ratio
            && single_channel_ratio > t.min_single_channel_ratio
            && max_channel_value <= t.max_channel_value;

        let confidence = if disabled {
            let mut confidence = BASE_CONFIDENCE;
            if unique_ratio < t.strong_unique_ratio {
                confidence += CONFIDENCE_BOOST;
            }
            if single_channel_ratio > t.strong_single_channel_ratio {
                confidence += CONFIDENCE_BOOST;
            }
            if max_channel_value <= t.strong_max_channel_value {
                confidence += CONFIDENCE_BOOST;
            }
            confidence.min(CONFIDENCE_CAP)
        } else {
            (0.9 - unique_ratio * 10.0).max(MIN_CONFIDENCE)
        };

        BlockVerdict {
            disabled,
            confidence,
        }
    }
}

/// Exact single-color test for the modern capture path.
///
/// True iff every pixel is bit-identical to the first. No confidence
/// score; an empty frame is not considered blocked. Tolerance-based
/// matching would catch dithered blank frames too, but the current
/// sensors emit exact repeats, so the comparison stays exact.
pub fn is_single_color(frame: &RgbaImage) -> bool {
    if frame.width() == 0 || frame.height() == 0 {
        return false;
    }
    let mut pixels = frame.pixels();
    let first = match pixels.next() {
        Some(pixel) => pixel,
        None => return false,
    };
    pixels.all(|pixel| pixel == first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn uniform_frame(width: u32, height: u32, pixel: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(pixel))
    }

    /// Frame with many distinct colors and multi-channel pixels.
    fn photographic_frame(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([
                (x % 256) as u8,
                (y % 256) as u8,
                ((x + y) % 256) as u8,
                255,
            ])
        })
    }

    #[test]
    fn blocked_signature_yields_disabled_with_high_confidence() {
        // Single red channel at value 4: the classic blocked-sensor frame.
        let frame = uniform_frame(64, 64, [4, 0, 0, 255]);
        let verdict = PixelBlockDetector::new().analyze(&frame);

        assert!(verdict.disabled);
        assert!(verdict.confidence >= 0.7);
    }

    #[test]
    fn strongest_signature_caps_at_ninety_five_percent() {
        let frame = uniform_frame(100, 100, [2, 0, 0, 255]);
        let verdict = PixelBlockDetector::new().analyze(&frame);

        assert!(verdict.disabled);
        // All three strong indicators met: 0.7 + 3 * 0.1, capped.
        assert!((verdict.confidence - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn photographic_frame_is_not_disabled() {
        let frame = photographic_frame(256, 64);
        let verdict = PixelBlockDetector::new().analyze(&frame);

        assert!(!verdict.disabled);
        assert!(verdict.confidence >= 0.1);
    }

    #[test]
    fn uniform_but_bright_frame_is_not_disabled() {
        // Uniform and single-channel, but far above the brightness cut-off.
        let frame = uniform_frame(64, 64, [200, 0, 0, 255]);
        let verdict = PixelBlockDetector::new().analyze(&frame);

        assert!(!verdict.disabled);
    }

    #[test]
    fn multi_channel_dark_frame_is_not_disabled() {
        // Dark but two channels active on every pixel.
        let frame = uniform_frame(64, 64, [4, 4, 0, 255]);
        let verdict = PixelBlockDetector::new().analyze(&frame);

        assert!(!verdict.disabled);
    }

    #[test]
    fn empty_frame_reports_low_confidence_not_disabled() {
        let frame = RgbaImage::new(0, 0);
        let verdict = PixelBlockDetector::new().analyze(&frame);

        assert!(!verdict.disabled);
        assert!((verdict.confidence - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn custom_thresholds_change_the_verdict() {
        let frame = uniform_frame(64, 64, [20, 0, 0, 255]);
        assert!(!PixelBlockDetector::new().analyze(&frame).disabled);

        let relaxed = DetectorThresholds {
            max_channel_value: 32,
            ..DetectorThresholds::default()
        };
        assert!(PixelBlockDetector::with_thresholds(relaxed)
            .analyze(&frame)
            .disabled);
    }

    #[test]
    fn single_color_frame_is_detected() {
        let frame = uniform_frame(32, 32, [17, 3, 99, 255]);
        assert!(is_single_color(&frame));
    }

    #[test]
    fn one_differing_pixel_defeats_single_color() {
        let mut frame = uniform_frame(32, 32, [17, 3, 99, 255]);
        frame.put_pixel(31, 31, Rgba([17, 3, 98, 255]));
        assert!(!is_single_color(&frame));
    }

    #[test]
    fn empty_frame_is_not_single_color() {
        assert!(!is_single_color(&RgbaImage::new(0, 0)));
    }
}
