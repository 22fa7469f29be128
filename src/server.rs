//! HTTP surface: web form, multipart generation endpoint, positional
//! prediction endpoint, and artifact downloads.

use crate::config::Config;
use crate::encode::RealEncoderRunner;
use crate::error::RenderError;
use crate::fetch::{self, ImageSource};
use crate::params::RenderParams;
use crate::pipeline::{self, RenderOutcome};
use axum::{
    body::Bytes,
    extract::{
        multipart::Field, DefaultBodyLimit, Multipart, Path as UrlPath, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    BoxError, Json, Router,
};
use futures::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::{fs::File, io::BufWriter};
use tokio_util::io::StreamReader;
use tracing::{error, info};
use uuid::Uuid;

/// Cap on uploaded request bodies (image part plus scalar fields).
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    semaphore: Arc<Semaphore>,
    http: reqwest::Client,
    runner: Arc<RealEncoderRunner>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_renders));
        let runner = Arc::new(RealEncoderRunner::new(&config));
        Self {
            config,
            semaphore,
            http: reqwest::Client::new(),
            runner,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/generate", post(generate))
        .route("/run/predict", post(predict))
        .route("/files/:name", get(download))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Prediction payload, positional like the UI inputs:
/// `[image_url, image_file, duration, fps, base, glitch2_secs, wobble_main,
///   wobble_jitter, wobble_f1, wobble_f2, sigma]`
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub data: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub data: Vec<String>,
    pub meta: RenderMeta,
}

#[derive(Debug, Serialize)]
pub struct RenderMeta {
    pub frames: u32,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probed_frames: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probed_duration: Option<f64>,
}

impl RenderMeta {
    fn from_outcome(outcome: &RenderOutcome) -> Self {
        Self {
            frames: outcome.frames,
            duration: outcome.duration,
            probed_frames: outcome.probed_frames,
            probed_duration: outcome.probed_duration,
        }
    }
}

// Handler that accepts the multipart form, saves an uploaded image if one was
// sent, and runs the render pipeline.
async fn generate(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Html<String>, (StatusCode, String)> {
    let mut image_url: Option<String> = None;
    let mut upload_path: Option<PathBuf> = None;
    let mut params = RenderParams::default();

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                // browsers send an empty part when no file was chosen
                let has_file = field.file_name().map(|n| !n.is_empty()).unwrap_or(false);
                if !has_file {
                    continue;
                }
                let path = std::env::temp_dir()
                    .join(format!("glitchvid_upload_{}", Uuid::new_v4()));
                info!("Saving upload to {:?}", path);
                stream_to_file(&path, field).await?;
                upload_path = Some(path);
            }
            "image_url" => {
                let value = read_text_field(field).await?;
                if !value.is_empty() {
                    image_url = Some(value);
                }
            }
            "duration" => {
                if let Some(v) = read_number_field(field, "duration").await? {
                    params.duration = v;
                }
            }
            "fps" => {
                if let Some(v) = read_number_field(field, "fps").await? {
                    params.fps = v.round() as u32;
                }
            }
            "base" => {
                if let Some(v) = read_number_field(field, "base").await? {
                    params.base = v;
                }
            }
            "glitch2_secs" => {
                if let Some(v) = read_number_field(field, "glitch2_secs").await? {
                    params.glitch2_secs = v;
                }
            }
            "wobble_main" => {
                if let Some(v) = read_number_field(field, "wobble_main").await? {
                    params.wobble_main = v;
                }
            }
            "wobble_jitter" => {
                if let Some(v) = read_number_field(field, "wobble_jitter").await? {
                    params.wobble_jitter = v;
                }
            }
            "wobble_f1" => {
                if let Some(v) = read_number_field(field, "wobble_f1").await? {
                    params.wobble_f1 = v;
                }
            }
            "wobble_f2" => {
                if let Some(v) = read_number_field(field, "wobble_f2").await? {
                    params.wobble_f2 = v;
                }
            }
            "sigma" => {
                if let Some(v) = read_number_field(field, "sigma").await? {
                    params.sigma = v;
                }
            }
            _ => {}
        }
    }

    let cleanup = upload_path.clone();
    let result = run_render(&state, image_url, upload_path, params).await;
    if let Some(path) = cleanup {
        let _ = tokio::fs::remove_file(&path).await;
    }

    let outcome = result.map_err(reject)?;
    Ok(Html(result_page(&outcome)))
}

async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, (StatusCode, String)> {
    let (image_url, image_file, params) =
        RenderParams::from_data(&request.data).map_err(reject)?;
    let outcome = run_render(&state, image_url, image_file, params)
        .await
        .map_err(reject)?;

    Ok(Json(PredictResponse {
        data: vec![format!("/files/{}", outcome.file_name)],
        meta: RenderMeta::from_outcome(&outcome),
    }))
}

/// The shared render path behind both endpoints. An uploaded file wins over a
/// URL when both are present.
async fn run_render(
    state: &AppState,
    image_url: Option<String>,
    image_file: Option<PathBuf>,
    params: RenderParams,
) -> Result<RenderOutcome, RenderError> {
    let source = match (image_file, image_url) {
        (Some(path), _) => ImageSource::File(path),
        (None, Some(url)) => ImageSource::Url(url),
        (None, None) => {
            return Err(RenderError::Input(
                "provide either an image URL or upload a file".to_string(),
            ))
        }
    };

    let _permit = state
        .semaphore
        .acquire()
        .await
        .map_err(|e| RenderError::Encode(format!("render queue unavailable: {}", e)))?;

    let img = fetch::resolve_image(&state.http, &source).await?;
    pipeline::render(img, params, &state.config, state.runner.as_ref()).await
}

fn reject(err: RenderError) -> (StatusCode, String) {
    error!("render failed: {}", err);
    err.into()
}

async fn download(
    State(state): State<AppState>,
    UrlPath(name): UrlPath<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let path = PathBuf::from(&name);
    if !path_is_valid(&path) {
        return Err((StatusCode::BAD_REQUEST, "Invalid path".to_owned()));
    }

    let full = state.config.output_dir.join(&path);
    if !full.exists() {
        return Err((StatusCode::NOT_FOUND, "No such file".to_owned()));
    }

    let data = tokio::fs::read(&full)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "video/mp4")], data))
}

async fn read_text_field(field: Field<'_>) -> Result<String, (StatusCode, String)> {
    field
        .text()
        .await
        .map(|text| text.trim().to_string())
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

/// Empty form inputs keep their defaults; anything non-empty must parse.
async fn read_number_field(
    field: Field<'_>,
    name: &str,
) -> Result<Option<f64>, (StatusCode, String)> {
    let text = read_text_field(field).await?;
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<f64>()
        .map(Some)
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("{} must be a number", name)))
}

// Save a `Stream` to a file
async fn stream_to_file<S, E>(path: &PathBuf, stream: S) -> Result<(), (StatusCode, String)>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    async {
        let body_with_io_error = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        let body_reader = StreamReader::new(body_with_io_error);
        futures::pin_mut!(body_reader);

        let mut file = BufWriter::new(File::create(path).await?);
        tokio::io::copy(&mut body_reader, &mut file).await?;

        Ok::<_, io::Error>(())
    }
    .await
    .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
}

/// Artifact names are a single path component; anything else smells like
/// traversal.
fn path_is_valid(path: &PathBuf) -> bool {
    let mut components = path.components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}

async fn root(State(state): State<AppState>) -> Html<String> {
    let files = match std::fs::read_dir(&state.config.output_dir) {
        Ok(entries) => entries
            .filter_map(|entry| {
                entry
                    .ok()
                    .and_then(|e| e.file_name().to_str().map(String::from))
            })
            .collect::<Vec<String>>(),
        Err(_) => Vec::new(),
    };

    let file_list = files
        .iter()
        .map(|file| format!(r#"<li><a href="/files/{0}">{0}</a></li>"#, file))
        .collect::<String>();

    let defaults = RenderParams::default();

    Html(format!(
        r#"
        <!doctype html>
        <html>
            <head>
                <title>Glitch Video Generator</title>
            </head>
            <body>
                <h1>Glitch Video Generator</h1>
                <form action="/generate" method="post" enctype="multipart/form-data">
                    <div><label>Image URL: <input type="text" name="image_url" size="60"></label></div>
                    <div><label>Upload image: <input type="file" name="image"></label></div>
                    <div><label>Duration (seconds): <input type="number" name="duration" value="{duration}" step="0.1" min="0.1"></label></div>
                    <fieldset>
                        <legend>Optional parameters</legend>
                        <div><label>fps: <input type="number" name="fps" value="{fps}" step="1" min="1" max="120"></label></div>
                        <div><label>base: <input type="number" name="base" value="{base}" step="1" min="1" max="100"></label></div>
                        <div><label>glitch2_secs: <input type="number" name="glitch2_secs" value="0" step="0.1" min="0"></label></div>
                        <div><label>wobble_main: <input type="number" name="wobble_main" value="0" step="0.001"></label></div>
                        <div><label>wobble_jitter: <input type="number" name="wobble_jitter" value="0" step="0.001"></label></div>
                        <div><label>wobble_f1: <input type="number" name="wobble_f1" value="0" step="0.1"></label></div>
                        <div><label>wobble_f2: <input type="number" name="wobble_f2" value="0" step="0.1"></label></div>
                        <div><label>sigma: <input type="number" name="sigma" value="0" step="0.5"></label></div>
                    </fieldset>
                    <div><input type="submit" value="Generate"></div>
                </form>
                <h2>Rendered videos:</h2>
                <ul>{file_list}</ul>
            </body>
        </html>
        "#,
        duration = defaults.duration,
        fps = defaults.fps,
        base = defaults.base,
        file_list = file_list,
    ))
}

fn result_page(outcome: &RenderOutcome) -> String {
    let meta_line = match (outcome.probed_frames, outcome.probed_duration) {
        (Some(frames), Some(duration)) => {
            format!("{} frames, {:.2}s (probed)", frames, duration)
        }
        _ => format!("{} frames, {:.2}s (requested)", outcome.frames, outcome.duration),
    };

    format!(
        r#"
        <!doctype html>
        <html>
            <head>
                <title>Glitch Video Generator</title>
            </head>
            <body>
                <h1>Done!</h1>
                <video controls width="480" src="/files/{file}"></video>
                <p>{meta}</p>
                <p><a href="/files/{file}">/files/{file}</a></p>
                <p><a href="/">Render another</a></p>
            </body>
        </html>
        "#,
        file = outcome.file_name,
        meta = meta_line,
    )
}
