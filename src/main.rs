//! HTTP surface for the GIF captioning pipeline.
//!
//! `POST /generate_caption` accepts a multipart form with either a
//! `gif_url` text field or a `file` upload and answers with the generated
//! description. Model service handles are built once at startup and passed
//! through axum state; nothing is process-global.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use gifcap::error::PipelineError;
use gifcap::fetch;
use gifcap::pipeline::{Aggregator, CaptionFailurePolicy};
use gifcap::sampler::SampleOptions;
use gifcap::services::inference::InferenceClient;
use gifcap::services::speech::SpeechClient;

const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024; // 50 MB limit for GIF uploads
const DEFAULT_CAPTION_CONCURRENCY: usize = 1;

struct AppState {
    download: reqwest::Client,
    aggregator: Aggregator<InferenceClient, InferenceClient>,
    speech: SpeechClient,
    sample_opts: SampleOptions,
}

#[derive(Serialize)]
struct CaptionResponse {
    generated_description: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

/// Download failures and missing input are client faults; everything else
/// is a processing failure.
fn error_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Download(_) | PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PipelineError::Decode(_)
        | PipelineError::Captioning(_)
        | PipelineError::Summarization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: PipelineError) -> (StatusCode, Json<ErrorResponse>) {
    eprintln!("[caption] {}", err);
    (
        error_status(&err),
        Json(ErrorResponse {
            detail: err.to_string(),
        }),
    )
}

async fn generate_caption(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<CaptionResponse>, (StatusCode, Json<ErrorResponse>)> {
    let mut gif_url: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(error_response(PipelineError::InvalidInput(format!(
                    "malformed multipart body: {}",
                    e
                ))));
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "gif_url" => {
                let text = field.text().await.map_err(|e| {
                    error_response(PipelineError::InvalidInput(e.to_string()))
                })?;
                gif_url = Some(text);
            }
            "file" => {
                let bytes = field.bytes().await.map_err(|e| {
                    error_response(PipelineError::InvalidInput(e.to_string()))
                })?;
                file_bytes = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    // URL wins when both are present, matching the reference form handling
    let raw = if let Some(url) = gif_url.filter(|u| !u.is_empty()) {
        fetch::fetch_gif(&state.download, &url)
            .await
            .map_err(error_response)?
    } else if let Some(bytes) = file_bytes {
        bytes
    } else {
        return Err(error_response(PipelineError::InvalidInput(
            "either 'gif_url' or 'file' must be provided".to_string(),
        )));
    };

    let description = state
        .aggregator
        .describe_gif(&raw, &state.sample_opts)
        .await
        .map_err(error_response)?;

    Ok(Json(CaptionResponse {
        generated_description: description,
    }))
}

async fn health() -> &'static str {
    "ok"
}

// ============== Downstream adapters (UI conveniences) ==============

#[derive(Deserialize)]
struct SpeakRequest {
    text: String,
    #[serde(default = "default_lang")]
    lang: String,
}

fn default_lang() -> String {
    "en".to_string()
}

/// POST /speak - Read a description aloud. Returns MP3 bytes.
async fn speak(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpeakRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let audio = state
        .speech
        .synthesize(&req.text, &req.lang)
        .await
        .map_err(|e| {
            eprintln!("[speech] Synthesis failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    detail: format!("Speech synthesis failed: {}", e),
                }),
            )
        })?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio))
}

#[derive(Deserialize)]
struct TranslateRequest {
    text: String,
    target_language: String,
}

#[derive(Serialize)]
struct TranslateResponse {
    translated_text: String,
}

/// POST /translate - Translate a description for the bilingual UI.
async fn translate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, (StatusCode, Json<ErrorResponse>)> {
    let translated = state
        .speech
        .translate(&req.text, &req.target_language)
        .await
        .map_err(|e| {
            eprintln!("[speech] Translation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    detail: format!("Translation failed: {}", e),
                }),
            )
        })?;

    Ok(Json(TranslateResponse {
        translated_text: translated,
    }))
}

fn caption_concurrency() -> usize {
    env::var("CAPTION_CONCURRENCY")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_CAPTION_CONCURRENCY)
}

fn num_frames() -> usize {
    env::var("NUM_FRAMES")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(gifcap::sampler::DEFAULT_FRAME_COUNT)
}

fn caption_failure_policy() -> CaptionFailurePolicy {
    match env::var("CAPTION_STRICT").as_deref() {
        Ok("1") | Ok("true") => CaptionFailurePolicy::Strict,
        _ => CaptionFailurePolicy::Degrade,
    }
}

#[tokio::main]
async fn main() {
    let inference = InferenceClient::from_env();
    let aggregator = Aggregator::new(inference.clone(), inference)
        .with_concurrency(caption_concurrency())
        .with_policy(caption_failure_policy());

    let download = fetch::download_client().expect("Failed to build download client");

    let sample_opts = SampleOptions {
        frame_count: num_frames(),
        ..Default::default()
    };

    let state = Arc::new(AppState {
        download,
        aggregator,
        speech: SpeechClient::new(),
        sample_opts,
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/generate_caption", post(generate_caption))
        .route("/speak", post(speak))
        .route("/translate", post(translate))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", addr, e));

    println!("Listening on http://{}", addr);
    axum::serve(listener, app).await.expect("Server failed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_faults_map_to_400() {
        assert_eq!(
            error_status(&PipelineError::Download("timeout".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&PipelineError::InvalidInput("nothing supplied".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_processing_faults_map_to_500() {
        assert_eq!(
            error_status(&PipelineError::Decode("bad bytes".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            error_status(&PipelineError::Summarization("503".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
