//! Glitchvid - Glitch Video Rendering Service
//!
//! Turns a still image (URL or upload) into a short glitched video:
//! - params: request parameters, validation, per-frame intensity schedule
//! - fetch: image source resolution (URL download or local file) and decode
//! - glitch: the seeded pixel-corruption transform
//! - encode: ffmpeg/ffprobe subprocess seam
//! - pipeline: frames -> temp PNGs -> encoder -> output artifact
//! - server: axum router, web form and prediction endpoint

pub mod config;
pub mod encode;
pub mod error;
pub mod fetch;
pub mod glitch;
pub mod params;
pub mod pipeline;
pub mod server;


pub use config::Config;
pub use error::RenderError;
pub use params::RenderParams;
