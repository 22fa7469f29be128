//! Environment configuration for the rendering service.

use std::env;
use std::path::PathBuf;

/// Service configuration, loaded once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Directory rendered videos are published to
    pub output_dir: PathBuf,
    /// ffmpeg binary (name on PATH or absolute path)
    pub ffmpeg_bin: String,
    /// ffprobe binary (name on PATH or absolute path)
    pub ffprobe_bin: String,
    /// Maximum renders running at once
    pub max_concurrent_renders: usize,
    /// Upper bound on round(duration * fps) per request
    pub max_frames: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("3000")),
            output_dir: PathBuf::from(
                env::var("OUTPUT_DIR").unwrap_or_else(|_| String::from("./output")),
            ),
            ffmpeg_bin: env::var("FFMPEG_BIN").unwrap_or_else(|_| String::from("ffmpeg")),
            ffprobe_bin: env::var("FFPROBE_BIN").unwrap_or_else(|_| String::from("ffprobe")),
            max_concurrent_renders: env::var("MAX_CONCURRENT_RENDERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            max_frames: env::var("MAX_FRAMES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
        }
    }
}
