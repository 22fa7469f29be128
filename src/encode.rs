//! ffmpeg/ffprobe subprocess seam: assemble the frame sequence into an MP4
//! and probe the result.

use crate::config::Config;
use crate::error::RenderError;
use crate::params::RenderParams;
use async_trait::async_trait;
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command as TokioCommand;
use tracing::warn;

/// printf-style frame naming inside a render's temp dir, shared between the
/// frame writer and the ffmpeg input pattern.
pub const FRAME_PATTERN: &str = "frame_%05d.png";

/// File name for the frame at `index`, matching [`FRAME_PATTERN`].
pub fn frame_file_name(index: u32) -> String {
    format!("frame_{:05}.png", index)
}

// Trait boundary around the external binaries so unit tests can mock them.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait EncoderRunner {
    async fn run_ffmpeg_concat(
        &self,
        frames_pattern: &Path,
        fps: u32,
        filter: Option<String>,
        output_path: &PathBuf,
    ) -> io::Result<Output>;
    async fn run_ffprobe_frames(&self, media_path: &PathBuf) -> io::Result<Output>;
}

pub struct RealEncoderRunner {
    ffmpeg_bin: String,
    ffprobe_bin: String,
}

impl RealEncoderRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            ffprobe_bin: config.ffprobe_bin.clone(),
        }
    }
}

#[async_trait]
impl EncoderRunner for RealEncoderRunner {
    async fn run_ffmpeg_concat(
        &self,
        frames_pattern: &Path,
        fps: u32,
        filter: Option<String>,
        output_path: &PathBuf,
    ) -> io::Result<Output> {
        let mut command = TokioCommand::new(&self.ffmpeg_bin);
        command
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-framerate")
            .arg(fps.to_string())
            .arg("-i")
            .arg(frames_pattern);
        if let Some(filter) = filter {
            command
                .arg("-filter_complex")
                .arg(format!("[0:v]{}[v]", filter))
                .arg("-map")
                .arg("[v]");
        }
        command
            .arg("-r")
            .arg(fps.to_string())
            .arg("-c:v")
            .arg("libx264")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg("-movflags")
            .arg("+faststart")
            .arg(output_path);
        command.output().await
    }

    async fn run_ffprobe_frames(&self, media_path: &PathBuf) -> io::Result<Output> {
        TokioCommand::new(&self.ffprobe_bin)
            .arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("v:0")
            .arg("-count_frames")
            .arg("-show_entries")
            .arg("stream=nb_read_frames,duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1")
            .arg(media_path)
            .output()
            .await
    }
}

/// Intro/outro transition filter: rotate sway plus gaussian blur, active only
/// during the first and last half second. None when all the knobs are zero.
pub fn transition_filter(params: &RenderParams, width: u32, height: u32) -> Option<String> {
    if params.wobble_main == 0.0 && params.wobble_jitter == 0.0 && params.sigma == 0.0 {
        return None;
    }

    let end_start = (params.duration - 0.5).max(0.0);
    let angle = format!(
        "( if(lte(t,0.5),1,0) + if(gte(t,{}),1,0) ) * ({}*sin(2*PI*t*{}) + {}*sin(2*PI*t*{}))",
        end_start, params.wobble_main, params.wobble_f1, params.wobble_jitter, params.wobble_f2
    );

    let mut filter = format!("rotate='{}':ow=rotw(iw):oh=roth(ih)", angle);
    if params.sigma > 0.0 {
        filter.push_str(&format!(
            ",gblur=sigma={}:steps=3:enable='between(t,0,0.5)+between(t,{},{})'",
            params.sigma,
            end_start,
            end_start + 0.5
        ));
    }
    // rotate grows the canvas; crop back to the frame size
    filter.push_str(&format!(",crop={}:{}", width, height));
    Some(filter)
}

/// Run the encoder once over the numbered frames in `frames_dir`. Non-zero
/// exit surfaces ffmpeg's stderr to the caller.
pub async fn assemble(
    runner: &impl EncoderRunner,
    frames_dir: &Path,
    params: &RenderParams,
    frame_size: (u32, u32),
    output_path: &PathBuf,
) -> Result<(), RenderError> {
    let pattern = frames_dir.join(FRAME_PATTERN);
    let filter = transition_filter(params, frame_size.0, frame_size.1);

    let output = runner
        .run_ffmpeg_concat(&pattern, params.fps, filter, output_path)
        .await
        .map_err(|e| RenderError::Encode(format!("ffmpeg command execution failed: {}", e)))?;

    if !output.status.success() {
        return Err(RenderError::Encode(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Read the container's frame count and duration back out of the artifact.
/// Best effort: on any failure the metadata is omitted, not the render.
pub async fn probe(runner: &impl EncoderRunner, media_path: &PathBuf) -> Option<(u64, f64)> {
    let output = match runner.run_ffprobe_frames(media_path).await {
        Ok(out) => out,
        Err(e) => {
            warn!("ffprobe execution failed: {}", e);
            return None;
        }
    };

    if !output.status.success() {
        warn!(
            "ffprobe failed with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let frames_re = Regex::new(r"nb_read_frames=(\d+)").unwrap();
    let duration_re = Regex::new(r"duration=([0-9.]+)").unwrap();

    let frames = frames_re
        .captures(&stdout)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())?;
    let duration = duration_re
        .captures(&stdout)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())?;

    Some((frames, duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn create_mock_output(stdout_str: &str, stderr_str: &str, success: bool) -> io::Result<Output> {
        Ok(Output {
            status: if success {
                ExitStatus::from_raw(0)
            } else {
                ExitStatus::from_raw(1)
            },
            stdout: stdout_str.as_bytes().to_vec(),
            stderr: stderr_str.as_bytes().to_vec(),
        })
    }

    fn base_params() -> RenderParams {
        let mut params = RenderParams::default();
        params.duration = 2.0;
        params.fps = 10;
        params
    }

    #[test]
    fn transition_filter_absent_when_knobs_are_zero() {
        assert!(transition_filter(&base_params(), 640, 480).is_none());
    }

    #[test]
    fn transition_filter_rotates_without_blur_when_sigma_is_zero() {
        let mut params = base_params();
        params.wobble_main = 0.028;
        params.wobble_f1 = 5.0;
        let filter = transition_filter(&params, 640, 480).unwrap();
        assert!(filter.starts_with("rotate="));
        assert!(!filter.contains("gblur"));
        assert!(filter.ends_with(",crop=640:480"));
    }

    #[test]
    fn transition_filter_blurs_when_sigma_is_set() {
        let mut params = base_params();
        params.sigma = 6.0;
        let filter = transition_filter(&params, 320, 240).unwrap();
        assert!(filter.contains("gblur=sigma=6"));
        assert!(filter.contains("between(t,1.5,2)"));
    }

    #[tokio::test]
    async fn assemble_invokes_ffmpeg_once_with_the_frame_pattern() {
        let mut mock_runner = MockEncoderRunner::new();
        let params = base_params();
        let out_path = PathBuf::from("/tmp/render/out.mp4");
        let expected_out = out_path.clone();

        mock_runner
            .expect_run_ffmpeg_concat()
            .withf(move |pattern, fps, filter, output_path| {
                pattern == Path::new("/tmp/render/frame_%05d.png")
                    && *fps == 10
                    && filter.is_none()
                    && output_path == &expected_out
            })
            .times(1)
            .returning(|_, _, _, _| {
                let output = create_mock_output("", "", true).unwrap();
                Box::pin(async move { Ok(output) })
            });

        let result = assemble(
            &mock_runner,
            Path::new("/tmp/render"),
            &params,
            (640, 480),
            &out_path,
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn assemble_passes_the_transition_filter_through() {
        let mut mock_runner = MockEncoderRunner::new();
        let mut params = base_params();
        params.sigma = 4.0;
        let out_path = PathBuf::from("/tmp/render/out.mp4");

        mock_runner
            .expect_run_ffmpeg_concat()
            .withf(|_, _, filter, _| {
                filter
                    .as_deref()
                    .is_some_and(|f| f.contains("gblur") && f.contains("crop=320:240"))
            })
            .times(1)
            .returning(|_, _, _, _| {
                let output = create_mock_output("", "", true).unwrap();
                Box::pin(async move { Ok(output) })
            });

        let result = assemble(
            &mock_runner,
            Path::new("/tmp/render"),
            &params,
            (320, 240),
            &out_path,
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn assemble_surfaces_ffmpeg_stderr_on_failure() {
        let mut mock_runner = MockEncoderRunner::new();
        mock_runner
            .expect_run_ffmpeg_concat()
            .times(1)
            .returning(|_, _, _, _| {
                let output = create_mock_output("", "unknown encoder 'libx264'", false).unwrap();
                Box::pin(async move { Ok(output) })
            });

        let result = assemble(
            &mock_runner,
            Path::new("/tmp/render"),
            &base_params(),
            (640, 480),
            &PathBuf::from("/tmp/render/out.mp4"),
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, RenderError::Encode(_)));
        assert!(err.to_string().contains("unknown encoder 'libx264'"));
    }

    #[tokio::test]
    async fn assemble_reports_spawn_failures() {
        let mut mock_runner = MockEncoderRunner::new();
        mock_runner
            .expect_run_ffmpeg_concat()
            .times(1)
            .returning(|_, _, _, _| {
                Box::pin(async move {
                    Err(io::Error::new(io::ErrorKind::NotFound, "ffmpeg not found"))
                })
            });

        let result = assemble(
            &mock_runner,
            Path::new("/tmp/render"),
            &base_params(),
            (640, 480),
            &PathBuf::from("/tmp/render/out.mp4"),
        )
        .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("ffmpeg not found"));
    }

    #[tokio::test]
    async fn probe_parses_frame_count_and_duration() {
        let mut mock_runner = MockEncoderRunner::new();
        mock_runner
            .expect_run_ffprobe_frames()
            .times(1)
            .returning(|_| {
                let output =
                    create_mock_output("nb_read_frames=20\nduration=2.000000\n", "", true).unwrap();
                Box::pin(async move { Ok(output) })
            });

        let probed = probe(&mock_runner, &PathBuf::from("/tmp/out.mp4")).await;
        assert_eq!(probed, Some((20, 2.0)));
    }

    #[tokio::test]
    async fn probe_returns_none_on_malformed_output() {
        let mut mock_runner = MockEncoderRunner::new();
        mock_runner
            .expect_run_ffprobe_frames()
            .times(1)
            .returning(|_| {
                let output = create_mock_output("nb_read_frames=N/A\n", "", true).unwrap();
                Box::pin(async move { Ok(output) })
            });

        assert!(probe(&mock_runner, &PathBuf::from("/tmp/out.mp4"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn probe_returns_none_when_ffprobe_fails() {
        let mut mock_runner = MockEncoderRunner::new();
        mock_runner
            .expect_run_ffprobe_frames()
            .times(1)
            .returning(|_| {
                let output = create_mock_output("", "no such file", false).unwrap();
                Box::pin(async move { Ok(output) })
            });

        assert!(probe(&mock_runner, &PathBuf::from("/tmp/out.mp4"))
            .await
            .is_none());
    }

    #[test]
    fn frame_file_names_match_the_ffmpeg_pattern() {
        assert_eq!(frame_file_name(0), "frame_00000.png");
        assert_eq!(frame_file_name(19), "frame_00019.png");
    }
}
