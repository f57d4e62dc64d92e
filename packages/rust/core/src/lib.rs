//! Job execution and report aggregation for SEO Compass.
//!
//! A submitted URL becomes a job; the [`dispatch`] pool runs it through the
//! three-stage [`pipeline`], and [`report`] assembles whatever results exist
//! into a report or a downloadable archive. [`service`] is the entry point
//! the CLI and any HTTP layer call.

pub mod dispatch;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod service;

#[cfg(test)]
mod testing;

pub use dispatch::{DispatchHandle, Dispatcher, JobMessage};
pub use pipeline::{JobOutcome, Pipeline, ProgressReporter, SilentProgress};
pub use report::{Report, ReportAssembler, parse_sections};
pub use retry::RetryPolicy;
pub use service::{AnalysisService, HistoryPage, HistoryQuery, ReportDownload, SubmitResponse};
