//! The CSV report: one append-only row per processed item.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;

use crate::constants::{
    REPORT_HEADER, STATUS_CONTENT_POLICY, STATUS_NETWORK_ERROR, STATUS_PROMPT_NOT_GENERATED,
};
use crate::error::BatchError;
use crate::input::WorkItem;

/// What happened on the image side of an item.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImageOutcome {
    /// No image prompt came back, so no image was requested
    Skipped,
    /// The image API refused the prompt (HTTP 400). The API's reason is
    /// logged, the row only carries the fixed status.
    ContentPolicyRejected,
    /// Image saved and uploaded
    Stored {
        /// The prompt the image model actually used
        revised_prompt: String,
        /// Viewable link to the uploaded file
        link: String,
    },
    /// Any other non-success status from the image API
    NetworkError {
        /// HTTP status code
        status: u16,
    },
}

/// A row of the report.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ResultRow {
    /// Item index
    pub index: usize,
    /// The input prompt sent to the chat model
    pub gpt_prompt: String,
    /// Image prompt written by the chat model
    pub image_prompt: String,
    /// Status of the image request
    pub image_gen_status: String,
    /// Revised prompt reported by the image model
    pub revised_prompt: String,
    /// Drive link of the uploaded image
    pub drive_link: String,
}

impl ResultRow {
    /// Builds the row for an item that made it through the pipeline.
    pub fn from_outcome(item: &WorkItem, image_prompt: &str, outcome: &ImageOutcome) -> Self {
        let mut row = Self {
            index: item.index,
            gpt_prompt: item.prompt.clone(),
            image_prompt: image_prompt.to_string(),
            ..Default::default()
        };
        match outcome {
            ImageOutcome::Skipped => {
                row.image_gen_status = STATUS_PROMPT_NOT_GENERATED.to_string();
            }
            ImageOutcome::ContentPolicyRejected => {
                row.image_gen_status = STATUS_CONTENT_POLICY.to_string();
            }
            ImageOutcome::Stored {
                revised_prompt,
                link,
            } => {
                row.image_gen_status = "200".to_string();
                row.revised_prompt = revised_prompt.clone();
                row.drive_link = link.clone();
            }
            ImageOutcome::NetworkError { status } => {
                row.image_gen_status = format!("{STATUS_NETWORK_ERROR} (HTTP {status})");
            }
        }
        row
    }

    /// The row written once an item has used up its retries.
    pub fn exhausted(item: &WorkItem) -> Self {
        Self {
            index: item.index,
            gpt_prompt: item.prompt.clone(),
            ..Default::default()
        }
    }
}

/// Appends rows to the report file.
///
/// Every append opens, writes and closes the file under a lock, so rows
/// from concurrent items never interleave.
#[derive(Debug)]
pub struct ReportWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ReportWriter {
    /// (Re)creates `imagePrompts_{run_id}.csv` in `dir` with just the header.
    pub fn create(dir: &Path, run_id: i64) -> Result<Self, BatchError> {
        let path = dir.join(format!("imagePrompts_{run_id}.csv"));
        let mut writer = csv::Writer::from_writer(File::create(&path)?);
        writer.write_record(REPORT_HEADER)?;
        writer.flush()?;
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Where the report lives
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a single row.
    pub fn append(&self, row: &ResultRow) -> Result<(), BatchError> {
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(row)?;
        writer.flush()?;
        Ok(())
    }
}
