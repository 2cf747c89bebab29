//! Client for the generative image-editing API.
//!
//! One call is one HTTP round trip. There is no retry: any failure is
//! returned to the caller as a [`RemoteError`] and the user decides whether
//! to submit again.

use std::io::Cursor;
use std::time::Instant;

use base64::{engine::general_purpose, Engine as _};
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::RemoteError;

pub trait ImageEditor: Send + Sync {
    fn edit(&self, image: &RgbaImage, instruction: &str) -> Result<RgbaImage, RemoteError>;
}

// ── Wire format ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: [&'static str; 2],
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(alias = "inline_data")]
    inline_data: Option<InlineData>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ── Helpers ─────────────────────────────────────────────────────────────────

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, RemoteError> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(RemoteError::Encode)?;
    Ok(bytes)
}

fn build_request<'a>(encoded_png: &[u8], instruction: &'a str) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![RequestContent {
            parts: vec![
                RequestPart::Text { text: instruction },
                RequestPart::Image {
                    inline_data: InlineData {
                        mime_type: "image/png".to_owned(),
                        data: general_purpose::STANDARD.encode(encoded_png),
                    },
                },
            ],
        }],
        generation_config: GenerationConfig {
            response_modalities: ["TEXT", "IMAGE"],
        },
    }
}

/// First inline image of the first candidate that has one.
fn extract_image(response: GenerateResponse) -> Result<RgbaImage, RemoteError> {
    let parts = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts);

    let mut commentary = Vec::new();
    for part in parts {
        if let Some(inline) = part.inline_data {
            let bytes = general_purpose::STANDARD
                .decode(inline.data.as_bytes())
                .map_err(|e| RemoteError::InvalidImage(e.to_string()))?;
            let img = image::load_from_memory(&bytes)
                .map_err(|e| RemoteError::InvalidImage(e.to_string()))?;
            return Ok(img.to_rgba8());
        }
        if let Some(text) = part.text {
            commentary.push(text);
        }
    }

    if !commentary.is_empty() {
        log::warn!("edit service replied without an image: {}", commentary.join(" "));
    }
    Err(RemoteError::EmptyResponse)
}

fn service_error(status: u16, body: &str) -> RemoteError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().chars().take(300).collect());
    RemoteError::Service { status, message }
}

// ── Gemini ──────────────────────────────────────────────────────────────────

pub struct GeminiEditor {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiEditor {
    pub fn new(config: &Config) -> Result<Self, RemoteError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("redline-edit/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

impl ImageEditor for GeminiEditor {
    fn edit(&self, image: &RgbaImage, instruction: &str) -> Result<RgbaImage, RemoteError> {
        let api_key = self.api_key.as_deref().ok_or(RemoteError::MissingCredential)?;

        let png = encode_png(image)?;
        log::info!(
            "requesting edit from {} ({}x{}, {} bytes)",
            self.model,
            image.width(),
            image.height(),
            png.len()
        );
        let started = Instant::now();

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&build_request(&png, instruction))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let err = service_error(status.as_u16(), &body);
            log::warn!("{err}");
            return Err(err);
        }

        let parsed: GenerateResponse = response.json()?;
        let result = extract_image(parsed);
        log::info!(
            "edit finished in {:.1}s ({})",
            started.elapsed().as_secs_f32(),
            if result.is_ok() { "ok" } else { "failed" }
        );
        result
    }
}
