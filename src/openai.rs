//! OpenAI chat-completion and image-generation clients.
//!
//! Both calls report rate limiting and the statuses the pipeline records
//! as values; only transport and response-shape problems are errors.

use base64::Engine;
use base64::engine::general_purpose;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::constants::{
    DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL, IMAGE_QUALITY, IMAGE_SIZE, TOOL_ARGUMENT, TOOL_NAME,
};
use crate::error::BatchError;
use crate::pipeline::{ImageModel, PromptModel};

const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";
const IMAGES_GENERATIONS_PATH: &str = "v1/images/generations";

/// What the chat endpoint gave back.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Completion {
    /// Raw arguments string of the forced tool call
    Arguments(String),
    /// HTTP 429
    RateLimited,
}

/// What the images endpoint gave back.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImageGeneration {
    /// HTTP 200 with a decoded image
    Generated {
        /// PNG bytes
        bytes: Vec<u8>,
        /// The prompt the model says it actually used
        revised_prompt: String,
    },
    /// HTTP 400, the prompt tripped the safety system
    ContentPolicyRejected {
        /// `error.message` from the body, empty if there wasn't one
        message: String,
    },
    /// HTTP 429
    RateLimited,
    /// Any other status
    NetworkError {
        /// HTTP status code
        status: u16,
    },
}

// -----------------------------
// Chat completions (text)
// -----------------------------

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ImagePromptArgs {
    #[serde(rename = "imagePrompt", default)]
    image_prompt: Option<String>,
}

/// Pulls `imagePrompt` out of the tool-call arguments.
///
/// Models occasionally wrap the arguments in prose, so only the text from
/// the first `{` up to the next `}` is parsed. A missing `imagePrompt`
/// gives an empty prompt; anything that isn't a JSON object is an error.
pub fn extract_image_prompt(raw: &str) -> Result<String, BatchError> {
    let trimmed = raw.trim();
    let parse_error = |reason: String| BatchError::PromptParse {
        raw: trimmed.to_string(),
        reason,
    };
    let start = trimmed
        .find('{')
        .ok_or_else(|| parse_error("no JSON object".to_string()))?;
    let end = trimmed[start..]
        .find('}')
        .map(|offset| start + offset)
        .ok_or_else(|| parse_error("unterminated JSON object".to_string()))?;
    let args: ImagePromptArgs =
        serde_json::from_str(&trimmed[start..=end]).map_err(|err| parse_error(err.to_string()))?;
    Ok(args.image_prompt.unwrap_or_default())
}

fn tool_definition() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": TOOL_NAME,
            "description": "Generates an image",
            "parameters": {
                "type": "object",
                "properties": {
                    TOOL_ARGUMENT: {
                        "type": "string",
                        "description": "A prompt used to generate the image."
                    }
                },
                "required": [TOOL_ARGUMENT]
            }
        }
    })
}

fn chat_request_body(model: &str, temperature: f32, user_prompt: &str) -> Value {
    json!({
        "model": model,
        "messages": [
            {"role": "user", "content": user_prompt}
        ],
        "temperature": temperature,
        "tools": [tool_definition()],
        "tool_choice": {
            "type": "function",
            "function": {"name": TOOL_NAME}
        }
    })
}

// -----------------------------
// Images API
// -----------------------------

/// Request body for POST /v1/images/generations
/// Docs: https://platform.openai.com/docs/api-reference/images
#[derive(Serialize, Debug)]
struct ImagesGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    quality: &'a str,
    response_format: &'a str,
}

impl<'a> ImagesGenerateRequest<'a> {
    /// One portrait image at the highest quality, returned as base64.
    fn portrait(model: &'a str, prompt: &'a str) -> Self {
        Self {
            model,
            prompt,
            n: 1,
            size: IMAGE_SIZE,
            quality: IMAGE_QUALITY,
            response_format: "b64_json",
        }
    }
}

#[derive(Deserialize, Debug)]
struct ImagesGenerateResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize, Debug)]
struct ImageData {
    b64_json: Option<String>,
    revised_prompt: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct ApiErrorBody {
    #[serde(default)]
    error: ApiErrorDetail,
}

#[derive(Deserialize, Debug, Default)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

// -----------------------------
// Client
// -----------------------------

/// Thin client over the two OpenAI endpoints the pipeline uses.
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    organization: Option<String>,
    base: Url,
    text_model: String,
    image_model: String,
    temperature: f32,
}

impl OpenAiClient {
    /// A client using the default models against `base` (e.g. `https://api.openai.com/`).
    pub fn new(http: reqwest::Client, api_key: impl Into<String>, base: Url) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            organization: None,
            base,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            temperature: 1.0,
        }
    }

    /// Sends `OpenAI-Organization` on every request.
    pub fn with_organization(mut self, organization: Option<String>) -> Self {
        self.organization = organization;
        self
    }

    /// Chat model used to write image prompts.
    pub fn with_text_model(mut self, model: impl Into<String>) -> Self {
        self.text_model = model.into();
        self
    }

    /// Image model.
    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    /// Sampling temperature for the chat model.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn post(&self, path: &str) -> Result<reqwest::RequestBuilder, BatchError> {
        let url = self.base.join(path)?;
        let mut request = self.http.post(url).bearer_auth(&self.api_key);
        if let Some(org) = &self.organization {
            request = request.header("OpenAI-Organization", org);
        }
        Ok(request)
    }

    /// Asks the chat model for an image prompt via the forced tool call.
    pub async fn create_completion(&self, user_prompt: &str) -> Result<Completion, BatchError> {
        let body = chat_request_body(&self.text_model, self.temperature, user_prompt);
        let resp = self.post(CHAT_COMPLETIONS_PATH)?.json(&body).send().await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Completion::RateLimited);
        }
        let bytes = resp.bytes().await?;
        debug!(
            "/v1/chat/completions {status}: {}",
            String::from_utf8_lossy(&bytes)
        );

        let parsed: ChatCompletionResponse = serde_json::from_slice(&bytes).map_err(|err| {
            BatchError::Response(format!(
                "failed to parse /v1/chat/completions JSON ({status}): {err}"
            ))
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.tool_calls.into_iter().next())
            .map(|call| Completion::Arguments(call.function.arguments))
            .ok_or_else(|| {
                BatchError::Response(format!(
                    "/v1/chat/completions ({status}) returned no tool call: {}",
                    String::from_utf8_lossy(&bytes)
                ))
            })
    }

    /// Renders `prompt` and decodes the result.
    pub async fn generate_image(&self, prompt: &str) -> Result<ImageGeneration, BatchError> {
        let body = ImagesGenerateRequest::portrait(&self.image_model, prompt);
        let resp = self
            .post(IMAGES_GENERATIONS_PATH)?
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        match status {
            StatusCode::OK => {}
            StatusCode::TOO_MANY_REQUESTS => return Ok(ImageGeneration::RateLimited),
            StatusCode::BAD_REQUEST => {
                let bytes = resp.bytes().await?;
                let message = serde_json::from_slice::<ApiErrorBody>(&bytes)
                    .unwrap_or_default()
                    .error
                    .message;
                return Ok(ImageGeneration::ContentPolicyRejected { message });
            }
            other => {
                warn!("/v1/images/generations returned {other}");
                return Ok(ImageGeneration::NetworkError {
                    status: other.as_u16(),
                });
            }
        }

        let parsed: ImagesGenerateResponse = resp.json().await.map_err(|err| {
            BatchError::Response(format!(
                "failed to parse /v1/images/generations JSON: {err}"
            ))
        })?;
        let first = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| BatchError::Response("No image data returned".to_string()))?;
        let b64_json = first
            .b64_json
            .ok_or_else(|| BatchError::Response("Image response missing b64_json".to_string()))?;
        let bytes = general_purpose::STANDARD.decode(b64_json)?;
        Ok(ImageGeneration::Generated {
            bytes,
            revised_prompt: first.revised_prompt.unwrap_or_default(),
        })
    }
}

impl PromptModel for OpenAiClient {
    async fn image_prompt(&self, user_prompt: &str) -> Result<Completion, BatchError> {
        self.create_completion(user_prompt).await
    }
}

impl ImageModel for OpenAiClient {
    async fn generate(&self, image_prompt: &str) -> Result<ImageGeneration, BatchError> {
        self.generate_image(image_prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_arguments() {
        let prompt = extract_image_prompt(r#"{"imagePrompt": "a red fox"}"#).expect("parse");
        assert_eq!(prompt, "a red fox");
    }

    #[test]
    fn extracts_object_wrapped_in_prose() {
        let raw = "  Sure! {\"imagePrompt\": \"owl at dusk\"} hope that helps\n";
        assert_eq!(extract_image_prompt(raw).expect("parse"), "owl at dusk");
    }

    #[test]
    fn missing_field_is_empty_prompt() {
        assert_eq!(extract_image_prompt(r#"{"other": 1}"#).expect("parse"), "");
        assert_eq!(
            extract_image_prompt(r#"{"imagePrompt": null}"#).expect("parse"),
            ""
        );
    }

    #[test]
    fn malformed_arguments_are_parse_errors() {
        for raw in ["", "no json here", r#"{"imagePrompt": "#, r#"{"imagePrompt": 'x'}"#] {
            let err = extract_image_prompt(raw).expect_err(raw);
            assert!(matches!(err, BatchError::PromptParse { .. }), "{raw}");
        }
    }

    #[test]
    fn chat_body_forces_the_tool() {
        let body = chat_request_body("gpt-4-0613", 1.0, "red fox");
        assert_eq!(body["model"], "gpt-4-0613");
        assert_eq!(body["messages"][0]["content"], "red fox");
        assert_eq!(body["tool_choice"]["function"]["name"], "generate_image");
        assert_eq!(
            body["tools"][0]["function"]["parameters"]["required"][0],
            "imagePrompt"
        );
    }

    #[test]
    fn image_request_is_portrait_hd_b64() {
        let body =
            serde_json::to_value(ImagesGenerateRequest::portrait("dall-e-3", "a fox")).expect("json");
        assert_eq!(body["model"], "dall-e-3");
        assert_eq!(body["n"], 1);
        assert_eq!(body["size"], "1024x1792");
        assert_eq!(body["quality"], "hd");
        assert_eq!(body["response_format"], "b64_json");
        assert!(body.get("output_format").is_none());
    }
}
