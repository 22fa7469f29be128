//! Request parameters and the per-frame glitch intensity schedule.

use crate::error::RenderError;
use crate::glitch::{GLITCH_MAX, GLITCH_MIN};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::f64::consts::TAU;
use std::path::PathBuf;

/// Intensity ramp endpoints for the heavy tail, in glitch units.
const HEAVY_START: f64 = 3.0;
const HEAVY_END: f64 = 5.0;

/// Scalar knobs for one render, matching the web form / prediction payload.
///
/// `base` uses the form's 1-100 slider scale and maps to a tenth of that in
/// glitch units. `glitch2_secs` is the length of the heavy-glitch tail at the
/// end of the clip.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenderParams {
    pub duration: f64,
    pub fps: u32,
    pub base: f64,
    pub glitch2_secs: f64,
    pub wobble_main: f64,
    pub wobble_jitter: f64,
    pub wobble_f1: f64,
    pub wobble_f2: f64,
    pub sigma: f64,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            duration: 5.0,
            fps: 30,
            base: 20.0,
            glitch2_secs: 0.0,
            wobble_main: 0.0,
            wobble_jitter: 0.0,
            wobble_f1: 0.0,
            wobble_f2: 0.0,
            sigma: 0.0,
        }
    }
}

impl RenderParams {
    /// Total frames in the output sequence: round(duration * fps).
    pub fn frame_count(&self) -> u32 {
        (self.duration * self.fps as f64).round() as u32
    }

    /// Instant the heavy-glitch tail starts. Never negative; a tail longer
    /// than the clip just starts at zero.
    pub fn heavy_onset(&self) -> f64 {
        (self.duration - self.glitch2_secs).max(0.0)
    }

    /// Glitch intensity for the frame at time `t`.
    ///
    /// Base intensity (or the heavy-tail ramp once `t` passes the onset) plus
    /// two sinusoidal wobble terms, clamped to the transform's valid range.
    pub fn intensity_at(&self, t: f64) -> f64 {
        let base_term = if self.glitch2_secs > 0.0 && t >= self.heavy_onset() {
            let tail = (self.duration - self.heavy_onset()).max(f64::EPSILON);
            let frac = ((t - self.heavy_onset()) / tail).clamp(0.0, 1.0);
            HEAVY_START + (HEAVY_END - HEAVY_START) * frac
        } else {
            self.base / 10.0
        };

        let wobble = self.wobble_main * (TAU * self.wobble_f1 * t).sin()
            + self.wobble_jitter * (TAU * self.wobble_f2 * t).sin();

        (base_term + wobble).clamp(GLITCH_MIN, GLITCH_MAX)
    }

    /// Reject parameter sets before any work happens.
    pub fn validate(&self, max_frames: u32) -> Result<(), RenderError> {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(RenderError::Input(
                "duration must be > 0 seconds".to_string(),
            ));
        }
        if self.fps == 0 {
            return Err(RenderError::Input("fps must be >= 1".to_string()));
        }
        if !self.base.is_finite() || !(1.0..=100.0).contains(&self.base) {
            return Err(RenderError::Input(
                "base intensity must be within 1-100".to_string(),
            ));
        }
        if !self.glitch2_secs.is_finite() || self.glitch2_secs < 0.0 {
            return Err(RenderError::Input(
                "glitch2_secs must be >= 0".to_string(),
            ));
        }
        for (name, value) in [
            ("wobble_main", self.wobble_main),
            ("wobble_jitter", self.wobble_jitter),
            ("wobble_f1", self.wobble_f1),
            ("wobble_f2", self.wobble_f2),
        ] {
            if !value.is_finite() {
                return Err(RenderError::Input(format!("{} must be finite", name)));
            }
        }
        if self.wobble_f1 < 0.0 || self.wobble_f2 < 0.0 {
            return Err(RenderError::Input(
                "wobble frequencies must be >= 0".to_string(),
            ));
        }
        if !self.sigma.is_finite() || self.sigma < 0.0 {
            return Err(RenderError::Input("sigma must be >= 0".to_string()));
        }

        let frames = self.frame_count();
        if frames == 0 {
            return Err(RenderError::Input(
                "duration and fps produce no frames".to_string(),
            ));
        }
        if frames > max_frames {
            return Err(RenderError::Input(format!(
                "requested {} frames exceeds the limit of {} (lower duration or fps)",
                frames, max_frames
            )));
        }
        Ok(())
    }

    /// Parse the prediction endpoint's positional array:
    /// `[image_url, image_file, duration, fps, base, glitch2_secs,
    ///   wobble_main, wobble_jitter, wobble_f1, wobble_f2, sigma]`.
    /// Nulls and missing trailing elements fall back to defaults.
    pub fn from_data(
        data: &[Value],
    ) -> Result<(Option<String>, Option<PathBuf>, RenderParams), RenderError> {
        let image_url = opt_str(data, 0, "image_url")?;
        let image_file = opt_str(data, 1, "image_file")?.map(PathBuf::from);

        let mut params = RenderParams::default();
        if let Some(v) = opt_f64(data, 2, "duration")? {
            params.duration = v;
        }
        if let Some(v) = opt_f64(data, 3, "fps")? {
            params.fps = v.round() as u32;
        }
        if let Some(v) = opt_f64(data, 4, "base")? {
            params.base = v;
        }
        if let Some(v) = opt_f64(data, 5, "glitch2_secs")? {
            params.glitch2_secs = v;
        }
        if let Some(v) = opt_f64(data, 6, "wobble_main")? {
            params.wobble_main = v;
        }
        if let Some(v) = opt_f64(data, 7, "wobble_jitter")? {
            params.wobble_jitter = v;
        }
        if let Some(v) = opt_f64(data, 8, "wobble_f1")? {
            params.wobble_f1 = v;
        }
        if let Some(v) = opt_f64(data, 9, "wobble_f2")? {
            params.wobble_f2 = v;
        }
        if let Some(v) = opt_f64(data, 10, "sigma")? {
            params.sigma = v;
        }

        Ok((image_url, image_file, params))
    }
}

fn opt_str(data: &[Value], idx: usize, name: &str) -> Result<Option<String>, RenderError> {
    match data.get(idx) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(RenderError::Input(format!(
            "{} must be a string or null",
            name
        ))),
    }
}

fn opt_f64(data: &[Value], idx: usize, name: &str) -> Result<Option<f64>, RenderError> {
    match data.get(idx) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| RenderError::Input(format!("{} must be a number or null", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_count_is_rounded_duration_times_fps() {
        let mut params = RenderParams::default();
        params.duration = 2.0;
        params.fps = 10;
        assert_eq!(params.frame_count(), 20);

        params.duration = 1.04;
        assert_eq!(params.frame_count(), 10);

        params.duration = 0.05;
        assert_eq!(params.frame_count(), 1);
    }

    #[test]
    fn zero_duration_and_zero_fps_are_rejected() {
        let mut params = RenderParams::default();
        params.duration = 0.0;
        assert!(params.validate(3600).is_err());

        let mut params = RenderParams::default();
        params.fps = 0;
        assert!(params.validate(3600).is_err());
    }

    #[test]
    fn oversized_requests_are_rejected() {
        let mut params = RenderParams::default();
        params.duration = 120.0;
        params.fps = 60;
        let err = params.validate(3600).unwrap_err();
        assert!(err.to_string().contains("exceeds the limit"));
    }

    #[test]
    fn non_finite_parameters_are_rejected() {
        let mut params = RenderParams::default();
        params.duration = f64::INFINITY;
        assert!(params.validate(3600).is_err());

        let mut params = RenderParams::default();
        params.wobble_main = f64::NAN;
        assert!(params.validate(3600).is_err());
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(RenderParams::default().validate(3600).is_ok());
    }

    #[test]
    fn intensity_without_wobble_is_base_over_ten() {
        let params = RenderParams::default();
        assert!((params.intensity_at(0.0) - 2.0).abs() < 1e-9);
        assert!((params.intensity_at(3.7) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn heavy_tail_ramps_from_three_to_five() {
        let mut params = RenderParams::default();
        params.duration = 10.0;
        params.glitch2_secs = 2.0;

        assert!((params.intensity_at(7.9) - 2.0).abs() < 1e-9);
        assert!((params.intensity_at(8.0) - 3.0).abs() < 1e-9);
        assert!((params.intensity_at(9.0) - 4.0).abs() < 1e-9);
        assert!((params.intensity_at(10.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn intensity_is_clamped_to_the_valid_range() {
        let mut params = RenderParams::default();
        params.base = 100.0;
        params.wobble_main = 50.0;
        params.wobble_f1 = 0.25;
        // sin(2pi * 0.25 * 1.0) = 1.0 -> way above the max
        assert!((params.intensity_at(1.0) - GLITCH_MAX).abs() < 1e-9);
        // sin(2pi * 0.25 * 3.0) = -1.0 -> way below the min
        assert!((params.intensity_at(3.0) - GLITCH_MIN).abs() < 1e-9);
    }

    #[test]
    fn from_data_parses_the_full_positional_array() {
        let data = vec![
            json!("https://example.com/cat.png"),
            Value::Null,
            json!(8),
            json!(24),
            json!(35),
            json!(2.0),
            json!(0.03),
            json!(0.01),
            json!(5.0),
            json!(11.0),
            json!(6.0),
        ];
        let (url, file, params) = RenderParams::from_data(&data).unwrap();
        assert_eq!(url.as_deref(), Some("https://example.com/cat.png"));
        assert!(file.is_none());
        assert_eq!(params.duration, 8.0);
        assert_eq!(params.fps, 24);
        assert_eq!(params.base, 35.0);
        assert_eq!(params.glitch2_secs, 2.0);
        assert_eq!(params.wobble_f2, 11.0);
        assert_eq!(params.sigma, 6.0);
    }

    #[test]
    fn from_data_fills_defaults_for_nulls_and_missing_elements() {
        let data = vec![json!("https://example.com/cat.png"), Value::Null, json!(3)];
        let (url, _, params) = RenderParams::from_data(&data).unwrap();
        assert!(url.is_some());
        assert_eq!(params.duration, 3.0);
        assert_eq!(params.fps, 30);
        assert_eq!(params.base, 20.0);
    }

    #[test]
    fn from_data_rejects_non_numeric_scalars() {
        let data = vec![Value::Null, Value::Null, json!("five")];
        assert!(RenderParams::from_data(&data).is_err());
    }

    #[test]
    fn from_data_treats_blank_url_as_absent() {
        let data = vec![json!("   "), json!("/tmp/upload.png")];
        let (url, file, _) = RenderParams::from_data(&data).unwrap();
        assert!(url.is_none());
        assert_eq!(file, Some(PathBuf::from("/tmp/upload.png")));
    }
}
