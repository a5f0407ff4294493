//! CLI parser
use clap::Parser;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL, DEFAULT_TIMEOUT_SECONDS, DRIVE_UPLOAD_BASE,
    OPENAI_API_BASE,
};

#[derive(Parser, Debug)]
#[command(name = "keyterm-imagegen")]
#[command(
    about = "Turn a sheet of keyword prompts into images: LLM-written prompt -> Images API -> Google Drive"
)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "IMAGEGEN_DEBUG")]
    /// Enable debug logging. Env: IMAGEGEN_DEBUG
    pub debug: bool,

    #[clap(long, short, env = "IMAGEGEN_INPUT")]
    /// Spreadsheet (xlsx/xls/ods) or CSV of prompts; first row is a header.
    /// Rows with a blank prompt are skipped and get no report row.
    /// Env: IMAGEGEN_INPUT
    pub input: PathBuf,

    #[clap(long, default_value = "0")]
    /// Zero-based column holding the prompt text
    pub prompt_column: usize,

    #[clap(long)]
    /// Zero-based column holding the item index. Row position is used when unset.
    pub index_column: Option<usize>,

    #[clap(long, default_value = "./images", env = "IMAGEGEN_IMAGE_DIR")]
    /// Where generated images are saved. Env: IMAGEGEN_IMAGE_DIR
    pub image_dir: PathBuf,

    #[clap(long, default_value = ".", env = "IMAGEGEN_REPORT_DIR")]
    /// Where the imagePrompts_<run>.csv report is written. Env: IMAGEGEN_REPORT_DIR
    pub report_dir: PathBuf,

    #[clap(long, required = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    /// OpenAI API key. Env: OPENAI_API_KEY
    pub openai_api_key: String,

    #[clap(long, env = "OPENAI_ORG_ID")]
    /// OpenAI organization id, sent as OpenAI-Organization. Env: OPENAI_ORG_ID
    pub openai_org_id: Option<String>,

    #[clap(long, default_value = OPENAI_API_BASE, env = "OPENAI_API_BASE")]
    /// OpenAI API base URL
    pub openai_api_base: String,

    #[clap(long, default_value = DEFAULT_TEXT_MODEL)]
    /// Chat model that writes the image prompt
    pub text_model: String,

    #[clap(long, default_value = DEFAULT_IMAGE_MODEL)]
    /// Image model
    pub image_model: String,

    #[clap(long, default_value = "1.0")]
    /// Sampling temperature for the chat model
    pub temperature: f32,

    #[clap(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    /// Path to a Google service account JSON key. Env: GOOGLE_APPLICATION_CREDENTIALS
    pub drive_credentials: Option<PathBuf>,

    #[clap(long, env = "GOOGLE_DRIVE_ACCESS_TOKEN", hide_env_values = true)]
    /// Pre-issued OAuth access token, used instead of a service account key.
    /// Env: GOOGLE_DRIVE_ACCESS_TOKEN
    pub drive_access_token: Option<String>,

    #[clap(long, required = true, env = "IMAGEGEN_DRIVE_FOLDER_ID")]
    /// Drive folder id uploads go into. Env: IMAGEGEN_DRIVE_FOLDER_ID
    pub drive_folder_id: String,

    #[clap(long, default_value = DRIVE_UPLOAD_BASE)]
    /// Google upload API base URL
    pub drive_upload_base: String,

    #[clap(long, default_value = "10")]
    /// How many items may be in flight at once, defaults to `10`
    pub max_parallel_calls: NonZeroUsize,

    #[clap(
        long,
        default_value_t = DEFAULT_TIMEOUT_SECONDS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    /// Per-request timeout in seconds, defaults to `60`
    pub timeout: u64,
}
