//! Batch image generation from keyword prompts.
//!
//! Each prompt goes through an LLM tool call that writes an image prompt,
//! the image API renders it, and the PNG is saved locally, uploaded to
//! Google Drive and recorded in a CSV report.

#![allow(clippy::multiple_crate_versions)]
#![deny(clippy::all)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::complexity)]
#![deny(clippy::correctness)]
#![deny(clippy::disallowed_methods)]
#![deny(clippy::expect_used)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::panic)]
#![deny(clippy::perf)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::unreachable)]
#![deny(clippy::unwrap_used)]
#![deny(warnings)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod batch;
pub mod cli;
pub mod config;
pub mod constants;
pub mod drive;
pub mod error;
pub mod gate;
pub mod input;
pub mod openai;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod retry;
