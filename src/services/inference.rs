//! Hosted-inference adapters.
//!
//! One reqwest client covers both model routes: an image-to-text model for
//! per-frame captions and a text-to-text model for the final summary. The
//! endpoint speaks the hosted inference API shape: raw image bytes in,
//! `[{"generated_text": ...}]` out for captioning; JSON `inputs` +
//! `parameters` in, `[{"summary_text": ...}]` out for summarization.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::io::Cursor;

use crate::pipeline::{CaptionService, ServiceResult, SummaryParams, SummaryService};
use crate::sampler::Frame;

const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";
const DEFAULT_CAPTION_MODEL: &str = "Salesforce/blip-image-captioning-base";
const DEFAULT_SUMMARY_MODEL: &str = "t5-base";

/// Error types for inference calls
#[derive(Debug)]
pub enum InferenceError {
    Encode(String),
    Http(reqwest::Error),
    Api(String),
}

impl std::fmt::Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceError::Encode(s) => write!(f, "Frame encode error: {}", s),
            InferenceError::Http(e) => write!(f, "HTTP error: {}", e),
            InferenceError::Api(s) => write!(f, "Inference API error: {}", s),
        }
    }
}

impl std::error::Error for InferenceError {}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        InferenceError::Http(e)
    }
}

#[derive(Clone)]
pub struct InferenceClient {
    base_url: String,
    api_token: Option<String>,
    caption_model: String,
    summary_model: String,
    http: Client,
}

impl InferenceClient {
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        caption_model: &str,
        summary_model: &str,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            caption_model: caption_model.to_string(),
            summary_model: summary_model.to_string(),
            http: Client::new(),
        }
    }

    /// Endpoint, models, and token come from env with hosted defaults.
    pub fn from_env() -> Self {
        let base_url = std::env::var("INFERENCE_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_token = std::env::var("INFERENCE_API_TOKEN").ok();
        let caption_model = std::env::var("CAPTION_MODEL")
            .unwrap_or_else(|_| DEFAULT_CAPTION_MODEL.to_string());
        let summary_model = std::env::var("SUMMARY_MODEL")
            .unwrap_or_else(|_| DEFAULT_SUMMARY_MODEL.to_string());
        Self::new(&base_url, api_token, &caption_model, &summary_model)
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/models/{}", self.base_url, model)
    }

    async fn caption_image(&self, frame: &Frame) -> Result<String, InferenceError> {
        let png = encode_png(frame)?;

        let mut req = self
            .http
            .post(self.model_url(&self.caption_model))
            .header("Content-Type", "image/png")
            .body(png);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Api(format!("HTTP {}: {}", status, text)));
        }

        let outputs: Vec<GeneratedText> = resp.json().await?;
        outputs
            .into_iter()
            .next()
            .map(GeneratedText::into_text)
            .ok_or_else(|| InferenceError::Api("empty captioning response".to_string()))
    }

    async fn summarize_text(
        &self,
        text: &str,
        params: &SummaryParams,
    ) -> Result<String, InferenceError> {
        let body = summary_request_body(text, params);

        let mut req = self
            .http
            .post(self.model_url(&self.summary_model))
            .json(&body);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Api(format!("HTTP {}: {}", status, detail)));
        }

        let outputs: Vec<GeneratedText> = resp.json().await?;
        outputs
            .into_iter()
            .next()
            .map(GeneratedText::into_text)
            .ok_or_else(|| InferenceError::Api("empty summarization response".to_string()))
    }
}

impl CaptionService for InferenceClient {
    async fn caption(&self, frame: &Frame) -> ServiceResult<String> {
        Ok(self.caption_image(frame).await?)
    }
}

impl SummaryService for InferenceClient {
    async fn summarize(&self, text: &str, params: &SummaryParams) -> ServiceResult<String> {
        Ok(self.summarize_text(text, params).await?)
    }
}

/// Beam-search configuration is forwarded opaquely; the model runs it.
fn summary_request_body(text: &str, params: &SummaryParams) -> serde_json::Value {
    json!({
        "inputs": text,
        "parameters": {
            "max_length": params.max_output_length,
            "num_beams": params.beam_width,
            "early_stopping": true,
        }
    })
}

/// One generation from the inference API. Captioning models answer with
/// `generated_text`, summarization pipelines with `summary_text`.
#[derive(Debug, Deserialize)]
struct GeneratedText {
    #[serde(default)]
    generated_text: Option<String>,
    #[serde(default)]
    summary_text: Option<String>,
}

impl GeneratedText {
    fn into_text(self) -> String {
        self.generated_text
            .or(self.summary_text)
            .unwrap_or_default()
    }
}

fn encode_png(frame: &Frame) -> Result<Vec<u8>, InferenceError> {
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(frame.clone())
        .write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| InferenceError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}
