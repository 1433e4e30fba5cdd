//! Transcode worker pool
//!
//! Workers pull video jobs from the shared work queue, run them through a
//! [`Transcoder`](imgnow_processing::Transcoder) and publish the result to the
//! reply queue named by each job. The pool runs standalone in the `imgnow-worker`
//! binary or embedded in the API process when the in-memory broker is used.

pub mod pool;

pub use pool::{handle_delivery, JobOutcome, TranscodeWorkerPool};
