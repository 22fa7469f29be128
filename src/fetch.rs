//! Input resolution: download from a URL or read an uploaded file, then
//! decode into an RGBA raster.

use crate::error::RenderError;
use image::RgbaImage;
use std::path::PathBuf;
use std::time::Duration;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Where the source image comes from. Exactly one per request.
#[derive(Clone, Debug)]
pub enum ImageSource {
    Url(String),
    File(PathBuf),
}

/// Fetch and decode the source image. No retries; failures surface directly
/// to the caller.
pub async fn resolve_image(
    client: &reqwest::Client,
    source: &ImageSource,
) -> Result<RgbaImage, RenderError> {
    let bytes = match source {
        ImageSource::Url(url) => {
            let response = client
                .get(url.as_str())
                .timeout(FETCH_TIMEOUT)
                .send()
                .await?
                .error_for_status()?;
            response.bytes().await?.to_vec()
        }
        ImageSource::File(path) => tokio::fs::read(path).await?,
    };

    let decoded = image::load_from_memory(&bytes)?;
    trim_even(decoded.to_rgba8())
}

/// The encoder targets yuv420p, which needs even dimensions; odd-sized
/// sources lose one row/column.
fn trim_even(img: RgbaImage) -> Result<RgbaImage, RenderError> {
    let (width, height) = img.dimensions();
    if width < 2 || height < 2 {
        return Err(RenderError::Input(format!(
            "image is too small to encode ({}x{})",
            width, height
        )));
    }
    if width % 2 == 0 && height % 2 == 0 {
        return Ok(img);
    }
    Ok(image::imageops::crop_imm(&img, 0, 0, width - width % 2, height - height % 2).to_image())
}
