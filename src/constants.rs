//! Shared constants/defaults for things
//!

use std::time::Duration;

/// Default OpenAI API base
pub const OPENAI_API_BASE: &str = "https://api.openai.com/";

/// Default Google upload API base
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/";

/// OAuth scope needed to create files in Drive
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Token endpoint used when the service account key doesn't name one
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Default chat model for writing image prompts
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4-0613";

/// Default image model
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

/// Image quality requested from the image model
pub const IMAGE_QUALITY: &str = "hd";

/// Portrait output size
pub const IMAGE_SIZE: &str = "1024x1792";

/// Name of the forced tool call
pub const TOOL_NAME: &str = "generate_image";

/// Argument the tool call must fill in
pub const TOOL_ARGUMENT: &str = "imagePrompt";

/// Default number of items in flight at once
pub const DEFAULT_MAX_PARALLEL_CALLS: usize = 10;

/// Default per-request timeout, in seconds
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// How long the rate-limit gate stays closed after a 429
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);

/// Shortest backoff between attempts
pub const RETRY_MIN_WAIT: Duration = Duration::from_secs(60);

/// Longest backoff between attempts
pub const RETRY_MAX_WAIT: Duration = Duration::from_secs(125);

/// Attempts per item, including the first one
pub const RETRY_MAX_ATTEMPTS: u32 = 5;

/// Extra pause once an item has used up all its attempts
pub const RETRY_EXHAUSTED_COOLDOWN: Duration = Duration::from_secs(65);

/// Header row of the CSV report
pub const REPORT_HEADER: [&str; 6] = [
    "index",
    "gpt_prompt",
    "image_prompt",
    "image_gen_status",
    "revised_prompt",
    "drive_link",
];

/// Status recorded when the image API refuses the prompt
pub const STATUS_CONTENT_POLICY: &str = "content policy violation error";

/// Status recorded when the model didn't give us an image prompt
pub const STATUS_PROMPT_NOT_GENERATED: &str = "NA: Image prompt not generated";

/// Prefix of the status recorded for unexpected image API responses
pub const STATUS_NETWORK_ERROR: &str = "Network error while generating image";
