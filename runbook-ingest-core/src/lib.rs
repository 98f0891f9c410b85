#![doc = "runbook-ingest-core: orchestration pipeline for commit-level runbook ingestion."]

//! This crate holds the whole run pipeline: policy resolution, trigger
//! normalisation, runbook discovery, bounded-concurrency ingestion,
//! aggregation and reporting. Network clients for the collaborators live in
//! the `runbook-ingest` binary crate; this crate only sees them through the
//! traits in [`contract`].
//!
//! # Usage
//! Build a [`pipeline::Collaborators`] bundle and call
//! [`pipeline::run_ingestion_pipeline`] once per trigger event.

pub mod config;
pub mod contract;
pub mod error;
#[cfg(any(test, feature = "test-export-mocks"))]
pub mod fakes;
pub mod gather;
pub mod pipeline;
pub mod processor;
pub mod report;
pub mod source;
pub mod summarise;
pub mod system_code;
pub mod trigger;

pub use error::{BailReason, Halt};
pub use pipeline::{run_ingestion_pipeline, Collaborators, IngestionRun, PipelineSettings};
