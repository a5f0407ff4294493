use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use keyterm_imagegen::batch::run_batch;
use keyterm_imagegen::cli::CliOptions;
use keyterm_imagegen::config::{BatchSettings, setup_logging};
use keyterm_imagegen::drive::{DriveCredentials, DriveUploader};
use keyterm_imagegen::input::{Columns, load_work_items};
use keyterm_imagegen::openai::OpenAiClient;
use tracing::{info, warn};
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliOptions::parse();

    setup_logging(cli.debug).map_err(|err| anyhow!("{err}"))?;

    let columns = Columns {
        prompt: cli.prompt_column,
        index: cli.index_column,
    };
    let work = load_work_items(&cli.input, columns)
        .with_context(|| format!("Failed to load prompts from {}", cli.input.display()))?;
    info!(
        "Loaded {} prompts from {}, {} rows without a prompt skipped",
        work.items.len(),
        cli.input.display(),
        work.skipped_rows.len()
    );

    // One client so every request shares the connection pool.
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout))
        .build()
        .context("Failed to build HTTP client")?;

    let openai_base = Url::parse(&cli.openai_api_base)
        .with_context(|| format!("Invalid OpenAI base URL {}", cli.openai_api_base))?;
    let openai = OpenAiClient::new(http.clone(), cli.openai_api_key.as_str(), openai_base)
        .with_organization(cli.openai_org_id.clone())
        .with_text_model(cli.text_model.as_str())
        .with_image_model(cli.image_model.as_str())
        .with_temperature(cli.temperature);

    let credentials = match (&cli.drive_access_token, &cli.drive_credentials) {
        (Some(token), _) => DriveCredentials::access_token(token.as_str()),
        (None, Some(path)) => DriveCredentials::service_account(path)
            .with_context(|| format!("Failed to load Drive credentials from {}", path.display()))?,
        (None, None) => {
            bail!("Drive credentials missing: set --drive-credentials or --drive-access-token")
        }
    };
    let upload_base = Url::parse(&cli.drive_upload_base)
        .with_context(|| format!("Invalid Drive upload base URL {}", cli.drive_upload_base))?;
    let drive = DriveUploader::new(http, cli.drive_folder_id.as_str(), upload_base, credentials);

    let settings = BatchSettings::from(&cli);
    let summary = run_batch(&work.items, openai.clone(), openai, drive, &settings).await?;

    info!(
        "Finished {} items: done runs {}, parse errors {}, gave up on {}. Report: {}",
        summary.total,
        summary.done,
        summary.errors,
        summary.exhausted,
        summary.report_path.display()
    );
    if !work.skipped_rows.is_empty() {
        warn!(
            "{} input rows had no prompt and are not in the report: {:?}",
            work.skipped_rows.len(),
            work.skipped_rows
        );
    }
    Ok(())
}
