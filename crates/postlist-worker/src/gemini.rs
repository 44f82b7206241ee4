//! Gemini client for listing generation.
//!
//! Sends the caption, transcript and the top-ranked images (downscaled JPEG,
//! inline base64) in one request and asks for a JSON listing. Models are
//! tried in order until one answers with something parseable.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use postlist_media::jpeg::{DEFAULT_MAX_EDGE, DEFAULT_QUALITY};
use postlist_media::encode_bounded_jpeg;
use postlist_models::Listing;

use crate::collaborators::{ContentGenerator, GenerationInput};
use crate::content::{parse_sectioned_listing, strip_code_fences};
use crate::error::{WorkerError, WorkerResult};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Models tried when `GEMINI_MODEL` is not set.
const DEFAULT_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-flash-lite", "gemini-2.5-pro"];

/// Gemini generator settings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Models in fallback order
    pub models: Vec<String>,
    pub base_url: String,
    /// Images attached to the request, best first
    pub max_inline_images: usize,
}

impl GeminiConfig {
    pub fn from_env() -> WorkerResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| WorkerError::config_error("GEMINI_API_KEY not set"))?;

        let models = match std::env::var("GEMINI_MODEL") {
            Ok(model) if !model.trim().is_empty() => vec![model.trim().to_string()],
            _ => DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
        };

        Ok(Self {
            api_key,
            models,
            base_url: std::env::var("GEMINI_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            max_inline_images: std::env::var("GEMINI_MAX_IMAGES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8),
        })
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Listing generator backed by the Gemini API.
pub struct GeminiGenerator {
    config: GeminiConfig,
    client: Client,
}

impl GeminiGenerator {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn from_env() -> WorkerResult<Self> {
        Ok(Self::new(GeminiConfig::from_env()?))
    }

    /// Build the prompt text.
    fn build_prompt(&self, input: &GenerationInput<'_>) -> String {
        let caption = if input.caption.trim().is_empty() {
            "No caption found."
        } else {
            input.caption.trim()
        };
        let transcript = if input.transcript.trim().is_empty() {
            "No transcribed text found."
        } else {
            input.transcript.trim()
        };

        format!(
            r#"You write product listings for online marketplaces from social media posts.
The attached images are the most relevant frames or photos of the post, best first.

Return ONLY a single JSON object with this schema:
{{
  "name": "Short product title",
  "description": "Persuasive description, 2-4 paragraphs",
  "features": ["Key feature", "..."],
  "audience": "Who the product is for",
  "keywords": ["search term", "..."],
  "category": "Marketplace category",
  "details": {{"Attribute": "Value"}}
}}

Post caption:
{caption}

Transcribed speech:
{transcript}

Additional instructions:
- Only state facts supported by the caption, the speech or the images.
- Leave out hashtags, emojis and calls to action.
- Return ONLY the JSON object and nothing else.
"#
        )
    }

    /// Downscale and base64-encode the leading images. Unreadable images
    /// are skipped.
    async fn inline_images(&self, images: &[PathBuf]) -> Vec<Part> {
        let mut parts = Vec::new();
        for path in images.iter().take(self.config.max_inline_images) {
            let owned = path.clone();
            let encoded = tokio::task::spawn_blocking(move || {
                encode_bounded_jpeg(&owned, DEFAULT_MAX_EDGE, DEFAULT_QUALITY)
            })
            .await;

            match encoded {
                Ok(Ok(bytes)) => parts.push(Part::Image {
                    inline_data: InlineData {
                        mime_type: "image/jpeg".to_string(),
                        data: BASE64.encode(bytes),
                    },
                }),
                Ok(Err(e)) => warn!(image = %path.display(), error = %e, "Skipping image"),
                Err(e) => warn!(image = %path.display(), error = %e, "Image encoding task failed"),
            }
        }
        parts
    }

    /// Call the Gemini API with one model.
    async fn call_gemini_api(&self, model: &str, request: &GeminiRequest) -> WorkerResult<Listing> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.base_url, model, self.config.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| WorkerError::generation_failed(format!("Gemini API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WorkerError::generation_failed(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            WorkerError::generation_failed(format!("Failed to parse Gemini response: {}", e))
        })?;

        let text = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| WorkerError::generation_failed("No content in Gemini response"))?;

        parse_listing_text(text)
    }
}

/// Parse a model answer as a JSON listing, falling back to the sectioned
/// text format.
pub fn parse_listing_text(text: &str) -> WorkerResult<Listing> {
    let text = strip_code_fences(text);
    match serde_json::from_str::<Listing>(text) {
        Ok(listing) if !listing.is_empty() => Ok(listing),
        Ok(_) => Err(WorkerError::generation_failed("Model returned an empty listing")),
        Err(json_err) => {
            debug!(error = %json_err, "Answer is not JSON, trying sectioned format");
            parse_sectioned_listing(text).ok_or_else(|| {
                WorkerError::generation_failed(format!("Failed to parse listing: {}", json_err))
            })
        }
    }
}

#[async_trait]
impl ContentGenerator for GeminiGenerator {
    async fn generate(&self, input: GenerationInput<'_>) -> WorkerResult<Listing> {
        let mut parts = vec![Part::Text {
            text: self.build_prompt(&input),
        }];
        parts.extend(self.inline_images(input.images).await);

        let request = GeminiRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let mut last_error = None;
        for model in &self.config.models {
            info!(source = %input.source, "Attempting Gemini API with model: {}", model);
            match self.call_gemini_api(model, &request).await {
                Ok(listing) => {
                    info!("Generated listing with {}", model);
                    return Ok(listing);
                }
                Err(e) => {
                    warn!("Failed with model {}: {}", model, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| WorkerError::generation_failed("No Gemini model configured")))
    }
}
