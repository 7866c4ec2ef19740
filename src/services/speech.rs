//! Downstream adapters: text-to-speech and translation.
//!
//! Used by UI layers to read a generated description aloud, optionally in
//! another language. Failures here never fail a captioning request; the
//! caller decides whether to show the description without audio.

use reqwest::Client;

const TTS_URL: &str = "https://translate.google.com/translate_tts";
const TRANSLATE_URL: &str = "https://translate.googleapis.com/translate_a/single";

/// Error types for speech/translation calls
#[derive(Debug)]
pub enum SpeechError {
    Http(reqwest::Error),
    Api(String),
}

impl std::fmt::Display for SpeechError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeechError::Http(e) => write!(f, "HTTP error: {}", e),
            SpeechError::Api(s) => write!(f, "Speech API error: {}", s),
        }
    }
}

impl std::error::Error for SpeechError {}

impl From<reqwest::Error> for SpeechError {
    fn from(e: reqwest::Error) -> Self {
        SpeechError::Http(e)
    }
}

#[derive(Clone)]
pub struct SpeechClient {
    http: Client,
}

impl SpeechClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    /// Synthesize speech for a short text. Returns MP3 bytes.
    /// `lang` is a BCP-47 primary tag ("en", "fr").
    pub async fn synthesize(&self, text: &str, lang: &str) -> Result<Vec<u8>, SpeechError> {
        let resp = self
            .http
            .get(TTS_URL)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", lang),
                ("q", text),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(SpeechError::Api(format!("HTTP {}", resp.status())));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    /// Translate text into `target_lang`.
    pub async fn translate(&self, text: &str, target_lang: &str) -> Result<String, SpeechError> {
        let resp = self
            .http
            .get(TRANSLATE_URL)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", target_lang),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(SpeechError::Api(format!("HTTP {}", resp.status())));
        }

        let body: serde_json::Value = resp.json().await?;
        parse_translation(&body)
            .ok_or_else(|| SpeechError::Api("unexpected translation response shape".to_string()))
    }
}

impl Default for SpeechClient {
    fn default() -> Self {
        Self::new()
    }
}

/// The translate endpoint answers with nested arrays; segment `[0][i][0]`
/// holds the i-th translated sentence.
fn parse_translation(body: &serde_json::Value) -> Option<String> {
    let segments = body.get(0)?.as_array()?;
    let mut out = String::new();
    for segment in segments {
        if let Some(text) = segment.get(0).and_then(|v| v.as_str()) {
            out.push_str(text);
        }
    }
    if out.is_empty() { None } else { Some(out) }
}
