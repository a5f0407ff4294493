//! Batch driver: sets up the output locations and runs every item.

use std::path::{Path, PathBuf};

use futures::future::join_all;
use tracing::info;

use crate::config::BatchSettings;
use crate::error::BatchError;
use crate::input::WorkItem;
use crate::pipeline::{ImageModel, ImageStore, ItemStatus, Pipeline, PromptModel};
use crate::report::ReportWriter;

/// What a finished batch looked like.
#[derive(Clone, Debug)]
pub struct BatchSummary {
    /// Items in the batch
    pub total: usize,
    /// Successful prompt extractions (retried items can count more than once)
    pub done: usize,
    /// Prompt-parse errors
    pub errors: usize,
    /// Items that ran out of retries
    pub exhausted: usize,
    /// Batch-wide suffix used for the report and image names
    pub run_id: i64,
    /// The CSV report
    pub report_path: PathBuf,
}

fn ensure_dir(dir: &Path) -> Result<(), BatchError> {
    if dir.is_dir() {
        info!("Output directory {} already exists.", dir.display());
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;
    info!("Created output directory {}", dir.display());
    Ok(())
}

/// Runs every item through the pipeline with a run id taken from the clock.
pub async fn run_batch<P, I, S>(
    items: &[WorkItem],
    prompts: P,
    images: I,
    store: S,
    settings: &BatchSettings,
) -> Result<BatchSummary, BatchError>
where
    P: PromptModel,
    I: ImageModel,
    S: ImageStore,
{
    let run_id = chrono::Utc::now().timestamp();
    run_batch_with_id(items, prompts, images, store, settings, run_id).await
}

/// Runs every item through the pipeline, naming outputs after `run_id`.
///
/// Only setup problems are returned as errors; individual items always end
/// with a row in the report.
pub async fn run_batch_with_id<P, I, S>(
    items: &[WorkItem],
    prompts: P,
    images: I,
    store: S,
    settings: &BatchSettings,
    run_id: i64,
) -> Result<BatchSummary, BatchError>
where
    P: PromptModel,
    I: ImageModel,
    S: ImageStore,
{
    ensure_dir(&settings.image_dir)?;
    std::fs::create_dir_all(&settings.report_dir)?;
    let report = ReportWriter::create(&settings.report_dir, run_id)?;
    let report_path = report.path().to_path_buf();
    info!(
        "Processing {} items, {} at a time, report at {}",
        items.len(),
        settings.max_parallel_calls,
        report_path.display()
    );

    let pipeline = Pipeline::new(prompts, images, store, settings, report, items.len(), run_id);
    let statuses = join_all(items.iter().map(|item| pipeline.process(item))).await;

    let progress = pipeline.progress();
    Ok(BatchSummary {
        total: items.len(),
        done: progress.done(),
        errors: progress.errors(),
        exhausted: statuses
            .iter()
            .filter(|status| **status == ItemStatus::Exhausted)
            .count(),
        run_id,
        report_path,
    })
}
