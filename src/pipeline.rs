//! The per-item pipeline: completion → image prompt → image → local file →
//! Drive → report row, wrapped in the retry policy.

use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::BatchSettings;
use crate::error::BatchError;
use crate::gate::RateLimitGate;
use crate::input::WorkItem;
use crate::openai::{Completion, ImageGeneration, extract_image_prompt};
use crate::progress::Progress;
use crate::report::{ImageOutcome, ReportWriter, ResultRow};
use crate::retry::{RetryOutcome, RetryPolicy};

/// Writes an image prompt for a keyword prompt.
pub trait PromptModel {
    /// Returns the raw tool-call arguments, or that the endpoint rate limited us.
    fn image_prompt(
        &self,
        user_prompt: &str,
    ) -> impl Future<Output = Result<Completion, BatchError>> + Send;
}

/// Renders an image prompt.
pub trait ImageModel {
    /// Returns the decoded image or the status the pipeline should act on.
    fn generate(
        &self,
        image_prompt: &str,
    ) -> impl Future<Output = Result<ImageGeneration, BatchError>> + Send;
}

/// Remote storage for finished images.
pub trait ImageStore {
    /// Uploads the local file at `path` as `name` and returns a viewable link.
    fn upload(
        &self,
        name: &str,
        path: &Path,
    ) -> impl Future<Output = Result<String, BatchError>> + Send;
}

/// How an item ended up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ItemStatus {
    /// A full row was written
    Completed,
    /// Retries ran out and the blank row was written
    Exhausted,
}

/// Shared state and services for every item of a batch.
pub struct Pipeline<P, I, S> {
    prompts: P,
    images: I,
    store: S,
    gate: RateLimitGate,
    limiter: Semaphore,
    progress: Progress,
    report: ReportWriter,
    image_dir: PathBuf,
    run_id: i64,
    retry: RetryPolicy,
}

impl<P, I, S> Pipeline<P, I, S>
where
    P: PromptModel,
    I: ImageModel,
    S: ImageStore,
{
    /// Builds a pipeline for `total` items, writing rows to `report`.
    pub fn new(
        prompts: P,
        images: I,
        store: S,
        settings: &BatchSettings,
        report: ReportWriter,
        total: usize,
        run_id: i64,
    ) -> Self {
        Self {
            prompts,
            images,
            store,
            gate: RateLimitGate::new(settings.rate_limit_cooldown),
            limiter: Semaphore::new(settings.max_parallel_calls.max(1)),
            progress: Progress::new(total),
            report,
            image_dir: settings.image_dir.clone(),
            run_id,
            retry: settings.retry.clone(),
        }
    }

    /// Counters for this batch
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Local file name for an item's image, `{index}_{run_id}.png`.
    pub fn image_name(&self, item: &WorkItem) -> String {
        format!("{}_{}.png", item.index, self.run_id)
    }

    /// Runs an item to completion, retrying as needed. Never fails: once
    /// retries run out a blank row is written instead.
    pub async fn process(&self, item: &WorkItem) -> ItemStatus {
        let label = format!("item {}", item.index);
        match self.retry.run(&label, |_| self.attempt(item)).await {
            RetryOutcome::Completed(()) => ItemStatus::Completed,
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                error!(
                    "All retries failed for item {} after {attempts} attempts: {last_error}",
                    item.index
                );
                tokio::time::sleep(self.retry.exhausted_cooldown).await;
                if let Err(err) = self.report.append(&ResultRow::exhausted(item)) {
                    error!("Failed to record item {}: {err}", item.index);
                }
                ItemStatus::Exhausted
            }
        }
    }

    /// One pass through the pipeline. Any error means the whole pass is retried.
    pub async fn attempt(&self, item: &WorkItem) -> Result<(), BatchError> {
        self.gate.wait_open().await;
        let _permit = self.limiter.acquire().await?;

        let raw = match self.prompts.image_prompt(&item.prompt).await? {
            Completion::Arguments(raw) => raw,
            Completion::RateLimited => {
                self.gate.cool_down().await;
                return Err(BatchError::RateLimited("chat completions"));
            }
        };

        let image_prompt = match extract_image_prompt(&raw) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(
                    "\tParsing Error for imagePrompt: {} | Completion object: {}",
                    item.index,
                    raw.trim()
                );
                self.progress.record_error();
                warn!("{}", self.progress.error_line());
                info!("\tRetrying...");
                return Err(err);
            }
        };

        self.progress.record_done();
        info!("{}", self.progress.done_line());

        let outcome = if image_prompt.is_empty() {
            ImageOutcome::Skipped
        } else {
            self.render(item, &image_prompt).await?
        };

        self.report
            .append(&ResultRow::from_outcome(item, &image_prompt, &outcome))
    }

    async fn render(&self, item: &WorkItem, image_prompt: &str) -> Result<ImageOutcome, BatchError> {
        match self.images.generate(image_prompt).await? {
            ImageGeneration::Generated {
                bytes,
                revised_prompt,
            } => {
                let name = self.image_name(item);
                let path = self.image_dir.join(&name);
                std::fs::write(&path, &bytes).map_err(|err| {
                    warn!("\t{err}: Error saving b64 content to {}", path.display());
                    BatchError::from(err)
                })?;
                let link = self
                    .store
                    .upload(&name, &path)
                    .await
                    .inspect_err(|err| warn!("\t{err}: Error uploading image to Drive"))?;
                Ok(ImageOutcome::Stored {
                    revised_prompt,
                    link,
                })
            }
            ImageGeneration::ContentPolicyRejected { message } => {
                warn!("Item {} rejected by content policy: {message}", item.index);
                Ok(ImageOutcome::ContentPolicyRejected)
            }
            ImageGeneration::RateLimited => {
                self.gate.cool_down().await;
                Err(BatchError::RateLimited("image generations"))
            }
            ImageGeneration::NetworkError { status } => {
                warn!("Item {}: image generation returned HTTP {status}", item.index);
                Ok(ImageOutcome::NetworkError { status })
            }
        }
    }
}
