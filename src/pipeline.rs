//! Per-request render pipeline: glitched frames into a temp dir, one ffmpeg
//! pass, artifact published under the output directory.

use crate::config::Config;
use crate::encode::{self, frame_file_name, EncoderRunner};
use crate::error::RenderError;
use crate::glitch::Glitcher;
use crate::params::RenderParams;
use image::RgbaImage;
use tracing::info;
use uuid::Uuid;

/// What a finished render reports back to the serving layer.
#[derive(Clone, Debug)]
pub struct RenderOutcome {
    /// File name under the output directory (`<uuid>.mp4`)
    pub file_name: String,
    /// Frames generated: round(duration * fps)
    pub frames: u32,
    /// Requested duration in seconds
    pub duration: f64,
    /// Frame count ffprobe read back from the container, when available
    pub probed_frames: Option<u64>,
    /// Duration ffprobe read back from the container, when available
    pub probed_duration: Option<f64>,
}

/// Run the whole pipeline for one request. Frames and the staged encode live
/// in a per-request temp dir that is removed on success and failure alike;
/// only a fully encoded artifact ever reaches the output directory.
pub async fn render(
    img: RgbaImage,
    params: RenderParams,
    config: &Config,
    runner: &impl EncoderRunner,
) -> Result<RenderOutcome, RenderError> {
    params.validate(config.max_frames)?;

    let frame_count = params.frame_count();
    let frame_size = img.dimensions();
    let temp_dir = tempfile::tempdir()?;
    let frames_dir = temp_dir.path().to_path_buf();

    info!(
        frames = frame_count,
        fps = params.fps,
        width = frame_size.0,
        height = frame_size.1,
        "generating glitch frames"
    );

    let gen_dir = frames_dir.clone();
    let gen_params = params.clone();
    tokio::task::spawn_blocking(move || -> Result<(), RenderError> {
        let glitcher = Glitcher::default();
        for index in 0..frame_count {
            let t = index as f64 / gen_params.fps as f64;
            let intensity = gen_params.intensity_at(t);
            let frame = glitcher.glitch_frame(&img, intensity, u64::from(index));
            frame
                .save(gen_dir.join(frame_file_name(index)))
                .map_err(|e| {
                    RenderError::Encode(format!("failed to write frame {}: {}", index, e))
                })?;
        }
        Ok(())
    })
    .await
    .map_err(|e| RenderError::Encode(format!("frame generation task failed: {}", e)))??;

    let staged_output = frames_dir.join("out.mp4");
    encode::assemble(runner, &frames_dir, &params, frame_size, &staged_output).await?;

    tokio::fs::create_dir_all(&config.output_dir).await?;
    let file_name = format!("{}.mp4", Uuid::new_v4());
    let published = config.output_dir.join(&file_name);
    tokio::fs::copy(&staged_output, &published).await?;

    let probed = encode::probe(runner, &published).await;
    info!(file = %file_name, "render complete");

    Ok(RenderOutcome {
        file_name,
        frames: frame_count,
        duration: params.duration,
        probed_frames: probed.map(|(frames, _)| frames),
        probed_duration: probed.map(|(_, duration)| duration),
    })
}
